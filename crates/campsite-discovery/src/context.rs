use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use tokio::sync::Notify;

use crate::error::DiscoveryError;
use crate::types::Settings;

/// Cooperative cancellation shared between the scheduler and a run
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    /// A signal that has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal and wake every waiter
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the signal has fired
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the signal fires
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything a single run needs, captured once when the run starts.
///
/// `today` is frozen for the whole run so offsets never drift across midnight.
#[derive(Debug)]
pub struct RunContext {
    /// Reference date for all day offsets
    pub today: NaiveDate,
    /// Local time at which the run started
    pub started_at: NaiveDateTime,
    /// Settings snapshot
    pub settings: Settings,
    cancel: CancelSignal,
    probes: AtomicU64,
}

impl RunContext {
    /// Context anchored at an explicit date and time
    pub fn new(
        today: NaiveDate,
        started_at: NaiveDateTime,
        settings: Settings,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            today,
            started_at,
            settings,
            cancel,
            probes: AtomicU64::new(0),
        }
    }

    /// Context anchored at the current local date
    pub fn starting_now(settings: Settings, cancel: CancelSignal) -> Self {
        let now = Local::now().naive_local();
        Self::new(now.date(), now, settings, cancel)
    }

    /// Calendar date `offset` days after the reference date
    pub fn date(&self, offset: i64) -> NaiveDate {
        let days = Days::new(offset.unsigned_abs());
        let shifted = if offset >= 0 {
            self.today.checked_add_days(days)
        } else {
            self.today.checked_sub_days(days)
        };
        shifted.unwrap_or(self.today)
    }

    /// `YYYY-MM-DD` rendering of [`RunContext::date`]
    pub fn date_str(&self, offset: i64) -> String {
        self.date(offset).format("%Y-%m-%d").to_string()
    }

    /// Number of days searched
    pub fn horizon(&self) -> i64 {
        self.settings.horizon_days
    }

    /// Whether the run has been asked to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once the run has been asked to stop
    pub fn check_cancelled(&self) -> Result<(), DiscoveryError> {
        if self.is_cancelled() {
            Err(DiscoveryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Count one probe issued on behalf of this run
    pub fn record_probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    /// Probes issued so far
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context() -> RunContext {
        let today = NaiveDate::from_ymd_opt(2025, 6, 28).unwrap();
        RunContext::new(
            today,
            today.and_hms_opt(23, 59, 0).unwrap(),
            Settings::default(),
            CancelSignal::new(),
        )
    }

    #[test]
    fn test_offsets_cross_month_boundary() {
        let ctx = context();
        assert_eq!(ctx.date_str(0), "2025-06-28");
        assert_eq!(ctx.date_str(3), "2025-07-01");
        assert_eq!(ctx.date_str(-28), "2025-05-31");
    }

    #[test]
    fn test_probe_counter() {
        let ctx = context();
        ctx.record_probe();
        ctx.record_probe();
        assert_eq!(ctx.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_context_observes_cancel() {
        let signal = CancelSignal::new();
        let ctx = RunContext::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            Settings::default(),
            signal.clone(),
        );

        assert!(ctx.check_cancelled().is_ok());
        signal.cancel();
        assert!(matches!(
            ctx.check_cancelled(),
            Err(DiscoveryError::Cancelled)
        ));
    }
}
