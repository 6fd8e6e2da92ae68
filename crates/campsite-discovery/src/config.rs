use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::MapId;

/// Known overflow node that lists no real resources
pub const JASPER_OVERFLOW_MAP_ID: MapId = -2147483403;

/// Which qualifying run the day scan keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Longest qualifying run; ties keep the earliest
    Longest,
    /// Earliest qualifying run
    FirstQualifying,
}

/// How a partially available code (`7`) is treated inside a stay window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialDayPolicy {
    /// Partial days break a window
    Gap,
    /// Partial days count as open
    Available,
}

/// How windows are localized for a candidate resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// One per-day probe per resource, scanned left to right
    DayScan,
    /// Binary-search expansion over coarse leaf map probes
    Coarse,
}

impl FromStr for WindowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "longest" => Ok(Self::Longest),
            "first" | "first_qualifying" => Ok(Self::FirstQualifying),
            other => Err(format!("unknown window policy '{}'", other)),
        }
    }
}

impl FromStr for PartialDayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gap" => Ok(Self::Gap),
            "available" => Ok(Self::Available),
            other => Err(format!("unknown partial day policy '{}'", other)),
        }
    }
}

impl FromStr for WindowStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day-scan" | "day_scan" | "daily" => Ok(Self::DayScan),
            "coarse" => Ok(Self::Coarse),
            other => Err(format!("unknown window strategy '{}'", other)),
        }
    }
}

/// Process configuration for the discovery engine
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Base URL of the booking platform
    pub base_url: String,

    /// Fixed delay between two probes of the same worker (default: 1 second)
    pub probe_delay: Duration,

    /// Upper bound for a single probe (default: 30 seconds)
    pub probe_timeout: Duration,

    /// Parks walked concurrently, each worker keeping its own probe delay (default: 1)
    pub walk_workers: usize,

    /// Window selection policy
    pub window_policy: WindowPolicy,

    /// Treatment of partially available days inside a window
    pub partial_day_policy: PartialDayPolicy,

    /// Window localization strategy
    pub window_strategy: WindowStrategy,

    /// Culture used to pick localized names
    pub locale: String,

    /// Map nodes that are never probed
    pub ignored_map_ids: Vec<MapId>,

    /// Application id a client must present when registering a push token
    pub push_app_id: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://reservation.pc.gc.ca".to_string(),
            probe_delay: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(30),
            walk_workers: 1,
            window_policy: WindowPolicy::Longest,
            partial_day_policy: PartialDayPolicy::Gap,
            window_strategy: WindowStrategy::DayScan,
            locale: "en-CA".to_string(),
            ignored_map_ids: vec![JASPER_OVERFLOW_MAP_ID],
            push_app_id: "com.dennis.parkiesoft".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Defaults overridden by environment variables; unparsable values are logged and ignored
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("RESERVATION_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = env_parse::<u64>("PROBE_DELAY_MS") {
            config.probe_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("PROBE_TIMEOUT_SECS") {
            config.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = env_parse::<usize>("WALK_WORKERS") {
            config.walk_workers = workers.max(1);
        }
        if let Some(policy) = env_parse::<WindowPolicy>("WINDOW_POLICY") {
            config.window_policy = policy;
        }
        if let Some(policy) = env_parse::<PartialDayPolicy>("PARTIAL_DAY_POLICY") {
            config.partial_day_policy = policy;
        }
        if let Some(strategy) = env_parse::<WindowStrategy>("WINDOW_STRATEGY") {
            config.window_strategy = strategy;
        }
        if let Ok(locale) = std::env::var("APP_LOCALE") {
            config.locale = locale;
        }
        if let Ok(ids) = std::env::var("IGNORED_MAP_IDS") {
            config.ignored_map_ids = parse_id_list(&ids);
        }
        if let Ok(app_id) = std::env::var("PUSH_APP_ID") {
            config.push_app_id = app_id;
        }

        config
    }
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={}: {}", key, raw, e);
            None
        }
    }
}

/// Parse a comma separated list of map ids, skipping blanks and garbage
pub fn parse_id_list(raw: &str) -> Vec<MapId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<MapId>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring invalid map id '{}'", s);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("longest".parse::<WindowPolicy>(), Ok(WindowPolicy::Longest));
        assert_eq!(
            "First".parse::<WindowPolicy>(),
            Ok(WindowPolicy::FirstQualifying)
        );
        assert!("widest".parse::<WindowPolicy>().is_err());

        assert_eq!("gap".parse::<PartialDayPolicy>(), Ok(PartialDayPolicy::Gap));
        assert_eq!(
            "available".parse::<PartialDayPolicy>(),
            Ok(PartialDayPolicy::Available)
        );

        assert_eq!(
            "day-scan".parse::<WindowStrategy>(),
            Ok(WindowStrategy::DayScan)
        );
        assert_eq!("coarse".parse::<WindowStrategy>(), Ok(WindowStrategy::Coarse));
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(
            parse_id_list("-2147483403, 12,,abc, -7"),
            vec![-2147483403, 12, -7]
        );
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_defaults_ignore_overflow_node() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.ignored_map_ids, vec![JASPER_OVERFLOW_MAP_ID]);
        assert_eq!(config.window_policy, WindowPolicy::Longest);
        assert_eq!(config.partial_day_policy, PartialDayPolicy::Gap);
        assert_eq!(config.walk_workers, 1);
    }
}
