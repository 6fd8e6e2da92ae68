//! In-memory [`Transport`] replaying canned platform payloads.
//!
//! Replies are keyed by endpoint and id so the real decoding path runs in
//! tests. Every call is logged, including calls that had no scripted reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reservation_api::{QueryParams, Transport};
use serde_json::{Value, json};

use crate::types::{LocationId, MapId, ResourceId};

/// One request seen by the transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// `GET` or `POST`
    pub method: &'static str,
    /// Full request URL without the query string
    pub url: String,
    /// Query parameters in the order they were sent
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    /// Value of a query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Reply = Arc<dyn Fn(&RecordedCall) -> Option<Value> + Send + Sync>;

#[derive(Default)]
struct Script {
    maps: HashMap<MapId, Reply>,
    daily: HashMap<ResourceId, Value>,
    details: HashMap<LocationId, Value>,
    paths: Vec<(String, Value)>,
}

/// Scripted transport; unscripted requests answer `None`
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    /// Transport with nothing scripted
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed reply for map availability probes of `map_id`
    pub fn map(self, map_id: MapId, reply: Value) -> Self {
        self.set_map(map_id, reply);
        self
    }

    /// Computed reply for map availability probes of `map_id`
    pub fn map_with<F>(self, map_id: MapId, reply: F) -> Self
    where
        F: Fn(&RecordedCall) -> Option<Value> + Send + Sync + 'static,
    {
        locked(&self.script).maps.insert(map_id, Arc::new(reply));
        self
    }

    /// Per-day availability of a resource
    pub fn daily(self, resource_id: ResourceId, reply: Value) -> Self {
        locked(&self.script).daily.insert(resource_id, reply);
        self
    }

    /// Resource detail list of a location
    pub fn details(self, location_id: LocationId, reply: Value) -> Self {
        locked(&self.script).details.insert(location_id, reply);
        self
    }

    /// Reply for any other request whose URL ends with `suffix`
    pub fn path(self, suffix: &str, reply: Value) -> Self {
        locked(&self.script).paths.push((suffix.to_string(), reply));
        self
    }

    /// Delay every reply by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace the reply for `map_id` after construction
    pub fn set_map(&self, map_id: MapId, reply: Value) {
        locked(&self.script)
            .maps
            .insert(map_id, Arc::new(move |_| Some(reply.clone())));
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        locked(&self.calls).clone()
    }

    /// Number of map probes issued for `map_id`
    pub fn calls_for_map(&self, map_id: MapId) -> usize {
        let id = map_id.to_string();
        locked(&self.calls)
            .iter()
            .filter(|c| c.url.ends_with("/api/availability/map") && c.param("mapId") == Some(&id))
            .count()
    }

    /// Number of calls whose URL ends with `suffix`
    pub fn calls_to(&self, suffix: &str) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|c| c.url.ends_with(suffix))
            .count()
    }

    fn reply(&self, call: &RecordedCall) -> Option<Value> {
        let script = locked(&self.script);
        let id = |key: &str| call.param(key).and_then(|v| v.parse::<i64>().ok());

        if call.url.ends_with("/api/availability/map") {
            let reply = script.maps.get(&id("mapId")?)?.clone();
            drop(script);
            reply(call)
        } else if call.url.ends_with("/api/availability/resourcedailyavailability") {
            script.daily.get(&id("resourceId")?).cloned()
        } else if call.url.ends_with("/api/resourcelocation/resources") {
            script.details.get(&id("resourceLocationId")?).cloned()
        } else {
            script
                .paths
                .iter()
                .find(|(suffix, _)| call.url.ends_with(suffix.as_str()))
                .map(|(_, reply)| reply.clone())
        }
    }

    async fn answer(&self, method: &'static str, url: &str, params: &QueryParams) -> Option<Value> {
        let call = RecordedCall {
            method,
            url: url.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        locked(&self.calls).push(call.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.reply(&call)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, params: &QueryParams) -> Option<Value> {
        self.answer("GET", url, params).await
    }

    async fn post(&self, url: &str, params: &QueryParams, _body: &Value) -> Option<Value> {
        self.answer("POST", url, params).await
    }
}

/// Map payload of an internal node with the given child codes
pub fn internal_node(children: &[(MapId, i32)]) -> Value {
    let links: serde_json::Map<String, Value> = children
        .iter()
        .map(|(id, code)| (id.to_string(), json!([code])))
        .collect();
    json!({"resourceAvailabilities": {}, "mapLinkAvailabilities": links})
}

/// Map payload of a leaf listing the given resource codes
pub fn leaf_node(resources: &[(ResourceId, i32)]) -> Value {
    let codes: serde_json::Map<String, Value> = resources
        .iter()
        .map(|(id, code)| (id.to_string(), json!([{"availability": code, "remainingQuota": null}])))
        .collect();
    json!({"resourceAvailabilities": codes, "mapLinkAvailabilities": {}})
}

/// Per-day availability payload
pub fn daily_codes(codes: &[i32]) -> Value {
    Value::Array(
        codes
            .iter()
            .map(|code| json!({"availability": code, "remainingQuota": null}))
            .collect(),
    )
}

/// Detail entry of one resource
pub fn resource_detail(name: &str, category_id: i64, capacity: i64) -> Value {
    json!({
        "resourceCategoryId": category_id,
        "localizedValues": [{"cultureName": "en-CA", "name": name, "description": format!("{} description", name)}],
        "maxCapacity": capacity,
        "maxStay": 14,
        "photos": [],
        "definedAttributes": []
    })
}
