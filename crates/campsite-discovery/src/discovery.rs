use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use futures_util::{StreamExt, TryStreamExt, stream};
use notification_services::PushSender;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::DiscoveryConfig;
use crate::context::{CancelSignal, RunContext};
use crate::error::DiscoveryError;
use crate::probe_client::ProbeClient;
use crate::reconciler::reconcile;
use crate::results::ResultStore;
use crate::types::*;
use crate::walker::{Candidate, DetailCache, HierarchyWalker, WalkReport};
use crate::window::WindowFinder;

/// Counters of one completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Local time the run started
    pub started_at: Option<NaiveDateTime>,
    /// Probes issued
    pub probes: u64,
    /// Resources newly catalogued
    pub inserted: usize,
    /// Open resources found by the walk
    pub candidates: usize,
    /// Entries published
    pub entries: usize,
    /// Published entries absent from the previous result
    pub new_entries: usize,
    /// Whether a push notification was delivered
    pub notified: bool,
    /// Wall time in milliseconds
    pub elapsed_ms: u64,
}

/// Runs complete discovery cycles: walk, window finding, reconciliation,
/// publication and notification.
pub struct Discovery {
    catalog: Catalog,
    client: ProbeClient,
    config: DiscoveryConfig,
    store: Arc<ResultStore>,
    push: Option<Arc<dyn PushSender>>,
}

impl Discovery {
    /// Assemble an engine; `push` may be `None` to disable notifications
    pub fn new(
        catalog: Catalog,
        client: ProbeClient,
        config: DiscoveryConfig,
        store: Arc<ResultStore>,
        push: Option<Arc<dyn PushSender>>,
    ) -> Self {
        Self {
            catalog,
            client,
            config,
            store,
            push,
        }
    }

    /// Catalog the engine writes to
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Shared probe client
    pub fn client(&self) -> &ProbeClient {
        &self.client
    }

    /// Process configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Published result and cart
    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Run one discovery cycle.
    ///
    /// Nothing is published unless the whole cycle completes; on error or
    /// cancellation the previous result stays in place.
    pub async fn run_cycle(&self, cancel: CancelSignal) -> Result<RunSummary, DiscoveryError> {
        let started = Instant::now();

        let settings = self.catalog.settings().await?;
        check_settings(&settings)?;

        let ctx = RunContext::starting_now(settings, cancel);
        info!(
            "Discovery run started at {} for {} parks, {} day horizon, {} night minimum",
            ctx.started_at.format("%Y-%m-%d %H:%M:%S"),
            ctx.settings.locations.len(),
            ctx.horizon(),
            ctx.settings.min_nights
        );

        let workers = self.config.walk_workers.max(1);
        let details = DetailCache::new();
        let parks: Vec<(WalkReport, Vec<(Candidate, AvailabilityWindow)>)> =
            stream::iter(ctx.settings.locations.clone())
                .map(|park| self.discover_park(&ctx, &details, park, workers > 1))
                .buffered(workers)
                .try_collect()
                .await?;

        let mut summary = RunSummary {
            started_at: Some(ctx.started_at),
            ..RunSummary::default()
        };
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for (report, windows) in parks {
            summary.inserted += report.inserted;
            summary.candidates += report.candidates.len();
            found.extend(windows.into_iter().filter(|(c, _)| seen.insert(c.resource_id)));
        }

        let cart_ids = self.store.cart_ids().await;
        let result = reconcile(&self.catalog, &ctx, &self.config.base_url, &found, &cart_ids).await?;

        ctx.check_cancelled()?;
        let previous = self.store.publish(result).await?;

        let current = self.store.current().await;
        let known: HashSet<ResourceId> = previous.resource_ids().collect();
        summary.entries = current.data.len();
        summary.new_entries = current.resource_ids().filter(|id| !known.contains(id)).count();

        if summary.new_entries > 0 {
            summary.notified = self.notify(&ctx, summary.entries).await;
        }

        summary.probes = ctx.probe_count();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Discovery run finished in {} ms: {} probes, {} new resources, {} candidates, {} entries ({} new)",
            summary.elapsed_ms,
            summary.probes,
            summary.inserted,
            summary.candidates,
            summary.entries,
            summary.new_entries
        );

        Ok(summary)
    }

    async fn discover_park(
        &self,
        ctx: &RunContext,
        details: &DetailCache,
        park_id: MapId,
        own_client: bool,
    ) -> Result<(WalkReport, Vec<(Candidate, AvailabilityWindow)>), DiscoveryError> {
        let worker_client;
        let client = if own_client {
            worker_client = self.client.for_worker();
            &worker_client
        } else {
            &self.client
        };

        let report = HierarchyWalker::new(client, &self.catalog, &self.config, details)
            .walk(ctx, park_id)
            .await?;

        let finder = WindowFinder::new(&self.config);
        let mut windows = Vec::new();
        for candidate in &report.candidates {
            ctx.check_cancelled()?;
            match finder.find(client, ctx, candidate).await {
                Some(window) => windows.push((candidate.clone(), window)),
                None => debug!("Resource {} has no qualifying window", candidate.resource_id),
            }
        }

        Ok((report, windows))
    }

    // Best effort: failures are logged and reported as not notified.
    async fn notify(&self, ctx: &RunContext, found: usize) -> bool {
        let Some(push) = &self.push else {
            return false;
        };
        let Some(token) = ctx.settings.push_token.as_deref() else {
            debug!("No push token registered, skipping notification");
            return false;
        };

        let title = format!("PARKS CANADA ALERT ({})", ctx.started_at.format("%Y-%m-%d %H:%M:%S"));
        let body = format!("Available Sites Found : {}", found);

        match push.send(token, &title, &body).await {
            Ok(id) => {
                info!("Push notification sent: {}", id);
                true
            }
            Err(e) => {
                warn!("Push notification failed: {}", e);
                false
            }
        }
    }
}

fn check_settings(settings: &Settings) -> Result<(), DiscoveryError> {
    if settings.locations.is_empty() {
        return Err(DiscoveryError::Configuration("no locations configured".to_string()));
    }
    if settings.horizon_days < 1 {
        return Err(DiscoveryError::Configuration(format!(
            "horizon must be positive, got {}",
            settings.horizon_days
        )));
    }
    if settings.min_nights < 1 {
        return Err(DiscoveryError::Configuration(format!(
            "minimum stay must be positive, got {}",
            settings.min_nights
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::tests::memory_catalog;
    use crate::testing::*;
    use notification_services::LogPushSender;
    use serde_json::json;
    use std::time::Duration;

    pub(crate) const PARK_A: MapId = -100;
    pub(crate) const LOOP_A1: MapId = -101;
    pub(crate) const LOCATION_A: LocationId = 1;

    /// Park A -> A1 (open) -> {101 open, 102 unavailable}
    pub(crate) fn scenario() -> ScriptedTransport {
        ScriptedTransport::new()
            .map(PARK_A, internal_node(&[(LOOP_A1, 0)]))
            .map(LOOP_A1, leaf_node(&[(101, 0), (102, 1)]))
            .details(
                LOCATION_A,
                json!({
                    "101": resource_detail("101", -2147483648, 6),
                    "102": resource_detail("102", -2147483648, 4)
                }),
            )
            .daily(101, daily_codes(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]))
            .daily(102, daily_codes(&[0; 12]))
    }

    pub(crate) async fn seeded_catalog(locations: Vec<MapId>) -> Catalog {
        let catalog = memory_catalog().await;
        catalog
            .upsert_location(&Location {
                id: LOCATION_A,
                root_map_id: Some(PARK_A),
                name: "A".to_string(),
                full_name: "Park A".to_string(),
            })
            .await
            .unwrap();
        catalog
            .upsert_category(&Category {
                id: -2147483648,
                name: "Campsite".to_string(),
                description: None,
            })
            .await
            .unwrap();
        catalog
            .save_settings(&Settings {
                locations,
                horizon_days: 12,
                min_nights: 5,
                push_token: Some("device".to_string()),
                ..Settings::default()
            })
            .await
            .unwrap();
        catalog
    }

    pub(crate) fn test_config() -> DiscoveryConfig {
        DiscoveryConfig {
            base_url: "https://example.test".to_string(),
            probe_delay: Duration::ZERO,
            probe_timeout: Duration::from_secs(2),
            ..DiscoveryConfig::default()
        }
    }

    pub(crate) async fn engine(
        catalog: Catalog,
        transport: Arc<ScriptedTransport>,
        push: Option<Arc<dyn PushSender>>,
    ) -> Discovery {
        let config = test_config();
        let client = ProbeClient::new(transport, &config);
        let store = Arc::new(ResultStore::load(catalog.clone()).await.unwrap());
        Discovery::new(catalog, client, config, store, push)
    }

    #[tokio::test]
    async fn test_end_to_end_single_open_site() {
        let catalog = seeded_catalog(vec![PARK_A]).await;
        let transport = Arc::new(scenario());
        let push = Arc::new(LogPushSender::new());
        let discovery = engine(catalog.clone(), transport.clone(), Some(push.clone())).await;

        let summary = discovery.run_cycle(CancelSignal::new()).await.unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.new_entries, 1);
        assert!(summary.notified);

        let result = discovery.store().current().await;
        assert_eq!(result.data.len(), 1);
        let entry = &result.data[0];
        assert_eq!(entry.id, 101);
        assert_eq!(entry.full_name, "Park A");
        assert_eq!(entry.nights, 5);
        assert!(entry.nights >= 5);

        assert_eq!(catalog.resource_count().await.unwrap(), 1);
        assert!(catalog.resource(102).await.unwrap().is_none());
        assert_eq!(
            transport.calls_to("/api/availability/resourcedailyavailability"),
            1
        );

        let sent = push.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, "Available Sites Found : 1");
        assert!(sent[0].1.starts_with("PARKS CANADA ALERT ("));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_idempotent() {
        let catalog = seeded_catalog(vec![PARK_A]).await;
        let push = Arc::new(LogPushSender::new());
        let discovery = engine(catalog.clone(), Arc::new(scenario()), Some(push.clone())).await;

        discovery.run_cycle(CancelSignal::new()).await.unwrap();
        let second = discovery.run_cycle(CancelSignal::new()).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.new_entries, 0);
        assert!(!second.notified);
        assert_eq!(catalog.resource_count().await.unwrap(), 1);
        assert_eq!(push.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_parks_sharing_a_location_fetch_details_once() {
        let catalog = seeded_catalog(vec![PARK_A, -200]).await;
        catalog.upsert_map_link(-200, Some(LOCATION_A)).await.unwrap();
        let transport = Arc::new(
            scenario()
                .map(-200, internal_node(&[(-201, 0)]))
                .map(-201, leaf_node(&[(201, 0)]))
                .details(
                    LOCATION_A,
                    json!({
                        "101": resource_detail("101", -2147483648, 6),
                        "201": resource_detail("201", -2147483648, 2)
                    }),
                )
                .daily(201, daily_codes(&[0; 12])),
        );
        let discovery = engine(catalog.clone(), transport.clone(), None).await;

        let summary = discovery.run_cycle(CancelSignal::new()).await.unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(transport.calls_to("/api/resourcelocation/resources"), 1);
    }

    #[tokio::test]
    async fn test_missing_locations_issue_no_probe() {
        let catalog = seeded_catalog(Vec::new()).await;
        let transport = Arc::new(scenario());
        let discovery = engine(catalog, transport.clone(), None).await;

        let result = discovery.run_cycle(CancelSignal::new()).await;

        assert!(matches!(result, Err(DiscoveryError::Configuration(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_probe_keeps_previous_entries_out() {
        let catalog = seeded_catalog(vec![PARK_A]).await;
        let transport = Arc::new(scenario());
        let discovery = engine(catalog, transport.clone(), None).await;
        discovery.run_cycle(CancelSignal::new()).await.unwrap();

        transport.set_map(LOOP_A1, json!("<html>maintenance</html>"));
        let summary = discovery.run_cycle(CancelSignal::new()).await.unwrap();

        assert_eq!(summary.entries, 0);
        assert!(discovery.store().current().await.data.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_publishes_nothing() {
        let catalog = seeded_catalog(vec![PARK_A]).await;
        let discovery = engine(catalog, Arc::new(scenario()), None).await;
        let cancel = CancelSignal::new();
        cancel.cancel();

        let result = discovery.run_cycle(cancel).await;

        assert!(matches!(result, Err(DiscoveryError::Cancelled)));
        assert_eq!(discovery.store().current().await.time, None);
    }

    #[tokio::test]
    async fn test_cart_flag_is_kept_without_re_adding() {
        let catalog = seeded_catalog(vec![PARK_A]).await;
        let discovery = engine(catalog, Arc::new(scenario()), None).await;
        discovery.run_cycle(CancelSignal::new()).await.unwrap();
        discovery.store().add_to_cart(101).await.unwrap();

        discovery.run_cycle(CancelSignal::new()).await.unwrap();

        let result = discovery.store().current().await;
        assert!(result.data[0].added_to_cart);
        assert_eq!(discovery.store().cart().await.len(), 1);
    }

    #[tokio::test]
    async fn test_parallel_workers_cover_every_park() {
        let catalog = seeded_catalog(vec![PARK_A, -200]).await;
        catalog
            .upsert_location(&Location {
                id: 2,
                root_map_id: Some(-200),
                name: "B".to_string(),
                full_name: "Park B".to_string(),
            })
            .await
            .unwrap();
        let transport = Arc::new(
            scenario()
                .map(-200, leaf_node(&[(201, 0)]))
                .details(2, json!({"201": resource_detail("201", -2147483648, 2)}))
                .daily(201, daily_codes(&[0; 12])),
        );

        let mut config = test_config();
        config.walk_workers = 2;
        let store = Arc::new(ResultStore::load(catalog.clone()).await.unwrap());
        let discovery = Discovery::new(
            catalog,
            ProbeClient::new(transport, &config),
            config,
            store,
            None,
        );

        let summary = discovery.run_cycle(CancelSignal::new()).await.unwrap();
        assert_eq!(summary.entries, 2);
        let ids: Vec<_> = discovery.store().current().await.resource_ids().collect();
        assert_eq!(ids, vec![101, 201]);
    }
}
