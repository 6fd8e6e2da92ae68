use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reservation_api::{QueryParams, Transport};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::context::RunContext;
use crate::probe::*;
use crate::types::{AttributeDefinition, LocationId, MapId, ResourceId};

/// Half-open span of day offsets `[start, end)` relative to the run's reference date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    /// First day offset
    pub start: i64,
    /// Day offset sent as the end date
    pub end: i64,
}

impl DayRange {
    /// Range from `start` to `end`
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// Enforces a fixed minimum delay between consecutive calls.
///
/// Callers queue on the lock, so a throttle also serializes its owner's probes.
#[derive(Debug)]
struct Throttle {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }

        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let since = previous.elapsed();
            if since < self.delay {
                sleep(self.delay - since).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// Issues availability and catalog queries against the booking platform.
///
/// Every failure is normalized: map probes yield [`ProbeOutcome::Unknown`] and
/// the other queries yield `None`. Each instance carries its own inter-call
/// delay; use [`ProbeClient::for_worker`] to give a parallel worker its own.
pub struct ProbeClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    probe_timeout: Duration,
    throttle: Throttle,
}

impl ProbeClient {
    /// Create a client over `transport`
    pub fn new(transport: Arc<dyn Transport>, config: &DiscoveryConfig) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            probe_timeout: config.probe_timeout,
            throttle: Throttle::new(config.probe_delay),
        }
    }

    /// A client sharing the transport session with an independent delay schedule
    pub fn for_worker(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            base_url: self.base_url.clone(),
            probe_timeout: self.probe_timeout,
            throttle: Throttle::new(self.throttle.delay),
        }
    }

    /// Base URL of the booking platform
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Coarse availability of a map node over `range`
    pub async fn probe_map(&self, ctx: &RunContext, map_id: MapId, range: DayRange) -> ProbeOutcome {
        let url = format!("{}/api/availability/map", self.base_url);
        let params = map_params(ctx, map_id, range);

        let outcome = ProbeOutcome::decode(self.get(Some(ctx), &url, &params).await);
        debug!(
            "Map {} [{} .. {}] -> {}",
            map_id,
            range.start,
            range.end,
            match &outcome {
                ProbeOutcome::Map(m) => format!("{} child links", m.children.len()),
                ProbeOutcome::Resources(r) => format!("{} resources", r.resources.len()),
                ProbeOutcome::Unknown => "unknown".to_string(),
            }
        );
        outcome
    }

    /// Per-day availability codes of one resource over `range`
    pub async fn probe_resource_days(
        &self,
        ctx: &RunContext,
        resource_id: ResourceId,
        range: DayRange,
    ) -> Option<Vec<AvailabilityCode>> {
        let url = format!("{}/api/availability/resourcedailyavailability", self.base_url);
        let params = daily_params(ctx, resource_id, range);

        let days = decode_daily(self.get(Some(ctx), &url, &params).await);
        if days.is_none() {
            warn!("Resource #{} could not resolve daily availability", resource_id);
        }
        days
    }

    /// Detail list of every resource at a location
    pub async fn resource_details(
        &self,
        ctx: Option<&RunContext>,
        location_id: LocationId,
    ) -> Option<BTreeMap<ResourceId, ResourceDetail>> {
        let url = format!("{}/api/resourcelocation/resources", self.base_url);
        let params = [("resourceLocationId", location_id.to_string())];

        decode_resource_details(self.get(ctx, &url, &params).await)
    }

    /// All resource locations known to the platform
    pub async fn resource_locations(&self) -> Option<Vec<RemoteLocation>> {
        let url = format!("{}/api/resourcelocation", self.base_url);
        decode_list(self.get(None, &url, &[]).await)
    }

    /// All resource categories known to the platform
    pub async fn resource_categories(&self) -> Option<Vec<RemoteCategory>> {
        let url = format!("{}/api/resourcecategory", self.base_url);
        decode_list(self.get(None, &url, &[]).await)
    }

    /// Attribute definitions, accepted either as a list or as an object keyed by id
    pub async fn attribute_definitions(&self) -> Option<Vec<AttributeDefinition>> {
        let url = format!("{}/api/attribute/filterable", self.base_url);
        match self.get(None, &url, &[]).await? {
            Value::Object(by_id) => Some(
                by_id
                    .into_iter()
                    .filter_map(|(_, v)| serde_json::from_value(v).ok())
                    .collect(),
            ),
            list => decode_list(Some(list)),
        }
    }

    async fn get(&self, ctx: Option<&RunContext>, url: &str, params: &QueryParams) -> Option<Value> {
        if let Some(ctx) = ctx {
            if ctx.is_cancelled() {
                return None;
            }
            ctx.record_probe();
        }

        self.throttle.wait().await;

        match timeout(self.probe_timeout, self.transport.get(url, params)).await {
            Ok(payload) => payload,
            Err(_) => {
                warn!("Probe {} timed out after {:?}", url, self.probe_timeout);
                None
            }
        }
    }
}

fn seed() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

const FILTER_DATA: &str = r#"[{"attributeDefinitionId":-32756,"enumValues":[1],"attributeDefinitionDecimalValue":0,"filterStrategy":0,"attributeType":0}]"#;
const PEOPLE_COUNTS: &str =
    r#"[{"capacityCategoryId":-32767,"subCapacityCategoryId":null,"count":1,"isAdult":null}]"#;

fn map_params(ctx: &RunContext, map_id: MapId, range: DayRange) -> Vec<(&'static str, String)> {
    vec![
        ("mapId", map_id.to_string()),
        ("bookingCategoryId", "0".to_string()),
        ("equipmentCategoryId", "-32768".to_string()),
        ("subEquipmentCategoryId", ctx.settings.equipment.to_string()),
        ("groupHoldUid", String::new()),
        ("startDate", ctx.date_str(range.start)),
        ("endDate", ctx.date_str(range.end)),
        ("getDailyAvailability", "false".to_string()),
        ("isReserving", "true".to_string()),
        ("filterData", FILTER_DATA.to_string()),
        ("boatLength", "0".to_string()),
        ("boatDraft", "0".to_string()),
        ("boatWidth", "0".to_string()),
        ("peopleCapacityCategoryCounts", PEOPLE_COUNTS.to_string()),
        ("numEquipment", "0".to_string()),
        ("seed", seed()),
    ]
}

fn daily_params(
    ctx: &RunContext,
    resource_id: ResourceId,
    range: DayRange,
) -> Vec<(&'static str, String)> {
    vec![
        ("resourceId", resource_id.to_string()),
        ("bookingCategoryId", "0".to_string()),
        ("startDate", ctx.date_str(range.start)),
        ("endDate", ctx.date_str(range.end)),
        ("isReserving", "true".to_string()),
        ("equipmentCategoryId", "-32768".to_string()),
        ("subEquipmentCategoryId", ctx.settings.equipment.to_string()),
        ("boatLength", "0".to_string()),
        ("boatDraft", "0".to_string()),
        ("boatWidth", "0".to_string()),
        ("peopleCapacityCategoryCounts", PEOPLE_COUNTS.to_string()),
        ("numEquipment", "0".to_string()),
        ("filterData", FILTER_DATA.to_string()),
        ("groupHoldUid", String::new()),
    ]
}
