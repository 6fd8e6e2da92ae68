use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::context::CancelSignal;
use crate::discovery::{Discovery, RunSummary};
use crate::error::DiscoveryError;

/// Fallback pause between runs when the settings cannot be read
const DEFAULT_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Run state of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run in flight
    Idle,
    /// A run is in flight
    Running,
    /// A run is in flight and has been asked to stop
    Cancelling,
}

/// Snapshot returned by [`Scheduler::status`]
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Current run state
    pub state: RunState,
    /// Whether the periodic loop is active
    pub periodic: bool,
    /// Summary of the last successful run
    pub last_run: Option<RunSummary>,
    /// Error of the last failed run, cleared by the next success
    pub last_error: Option<String>,
}

struct Inner {
    state: RunState,
    run_cancel: Option<CancelSignal>,
    loop_stop: Option<CancelSignal>,
    last_run: Option<RunSummary>,
    last_error: Option<String>,
}

/// Owns run scheduling: one run at a time, an optional periodic loop and
/// cooperative stop.
#[derive(Clone)]
pub struct Scheduler {
    discovery: Arc<Discovery>,
    inner: Arc<Mutex<Inner>>,
}

impl Scheduler {
    /// Idle scheduler driving `discovery`
    pub fn new(discovery: Arc<Discovery>) -> Self {
        Self {
            discovery,
            inner: Arc::new(Mutex::new(Inner {
                state: RunState::Idle,
                run_cancel: None,
                loop_stop: None,
                last_run: None,
                last_error: None,
            })),
        }
    }

    /// Engine driven by this scheduler
    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.discovery
    }

    /// Run one cycle now; `RunInProgress` when another run holds the state
    pub async fn run_now(&self) -> Result<RunSummary, DiscoveryError> {
        let cancel = {
            let mut inner = self.inner.lock().await;
            if inner.state != RunState::Idle {
                return Err(DiscoveryError::RunInProgress);
            }
            let cancel = CancelSignal::new();
            inner.state = RunState::Running;
            inner.run_cancel = Some(cancel.clone());
            cancel
        };

        let outcome = self.discovery.run_cycle(cancel).await;

        let mut inner = self.inner.lock().await;
        inner.state = RunState::Idle;
        inner.run_cancel = None;
        match &outcome {
            Ok(summary) => {
                inner.last_run = Some(summary.clone());
                inner.last_error = None;
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
            }
        }

        outcome
    }

    /// Start the periodic loop, replacing any loop already running.
    ///
    /// The loop runs a cycle, then waits the configured interval or until stopped.
    pub async fn start(&self) {
        let stop = CancelSignal::new();
        {
            let mut inner = self.inner.lock().await;
            if let Some(previous) = inner.loop_stop.replace(stop.clone()) {
                debug!("Replacing running discovery loop");
                previous.cancel();
            }
        }

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.periodic(stop).await });
        info!("Discovery loop started");
    }

    /// Stop the periodic loop and ask an in-flight run to wind down
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;

        if let Some(stop) = inner.loop_stop.take() {
            stop.cancel();
        }
        if inner.state == RunState::Running {
            inner.state = RunState::Cancelling;
            if let Some(cancel) = &inner.run_cancel {
                cancel.cancel();
            }
        }

        info!("Discovery stopped ({:?})", inner.state);
    }

    /// Current state and last outcome
    pub async fn status(&self) -> SchedulerStatus {
        let inner = self.inner.lock().await;
        SchedulerStatus {
            state: inner.state,
            periodic: inner.loop_stop.is_some(),
            last_run: inner.last_run.clone(),
            last_error: inner.last_error.clone(),
        }
    }

    async fn periodic(&self, stop: CancelSignal) {
        while !stop.is_cancelled() {
            match self.run_now().await {
                Ok(_) => {}
                Err(DiscoveryError::RunInProgress) => {
                    debug!("Scheduled run skipped, another run is in flight")
                }
                Err(DiscoveryError::Cancelled) => info!("Discovery run cancelled"),
                Err(DiscoveryError::Configuration(reason)) => {
                    warn!("Discovery run not started: {}", reason)
                }
                Err(e) => error!("Discovery run failed: {}", e),
            }

            let interval = match self.discovery.catalog().settings().await {
                Ok(settings) => Duration::from_secs(settings.interval_minutes.max(1) * 60),
                Err(e) => {
                    warn!("Could not read run interval: {}", e);
                    DEFAULT_INTERVAL
                }
            };

            tokio::select! {
                _ = sleep(interval) => {}
                _ = stop.cancelled() => break,
            }
        }
        debug!("Discovery loop exited");
    }
}
