use std::future::Future;

use tracing::debug;

use crate::config::{DiscoveryConfig, PartialDayPolicy, WindowPolicy, WindowStrategy};
use crate::context::RunContext;
use crate::probe::{AvailabilityCode, ProbeOutcome};
use crate::probe_client::{DayRange, ProbeClient};
use crate::types::{AvailabilityWindow, ResourceId};
use crate::walker::Candidate;

/// Localizes the stay window reported for a candidate resource.
///
/// A run of consecutive open days `a..=b` becomes the window `[a, b)`: nights
/// `a` through `b - 1`, checking out on `b`. Windows shorter than the minimum
/// stay are never reported, including at the end of the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFinder {
    /// Which qualifying window wins
    pub policy: WindowPolicy,
    /// Whether partial days keep a day-scan window open; coarse ranges need code `0`
    pub partial: PartialDayPolicy,
    /// Day scan or coarse expansion
    pub strategy: WindowStrategy,
}

impl WindowFinder {
    /// Finder configured from the process configuration
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            policy: config.window_policy,
            partial: config.partial_day_policy,
            strategy: config.window_strategy,
        }
    }

    /// Best qualifying window for `candidate`, probing with `client`
    pub async fn find(
        &self,
        client: &ProbeClient,
        ctx: &RunContext,
        candidate: &Candidate,
    ) -> Option<AvailabilityWindow> {
        let min_nights = ctx.settings.min_nights;
        let horizon = ctx.horizon();

        let window = match self.strategy {
            WindowStrategy::DayScan => {
                let days = client
                    .probe_resource_days(ctx, candidate.resource_id, DayRange::new(0, horizon))
                    .await?;
                self.scan_days(candidate.resource_id, &days, min_nights)
            }
            WindowStrategy::Coarse => {
                self.expand_coarse(candidate.resource_id, horizon, min_nights, |start, nights| {
                    self.coarse_open(client, ctx, candidate, start, nights)
                })
                .await
            }
        };

        debug!("Resource {} window: {:?}", candidate.resource_id, window);
        window
    }

    /// Scan a per-day code array left to right
    pub fn scan_days(
        &self,
        resource_id: ResourceId,
        days: &[AvailabilityCode],
        min_nights: i64,
    ) -> Option<AvailabilityWindow> {
        let mut best: Option<AvailabilityWindow> = None;
        let mut run_start: Option<i64> = None;

        // A trailing sentinel closes a run still open at the end of the array.
        let codes = days
            .iter()
            .map(|code| code.is_open(self.partial))
            .chain(std::iter::once(false));

        for (offset, open) in (0_i64..).zip(codes) {
            match (open, run_start) {
                (true, None) => run_start = Some(offset),
                (true, Some(_)) => {}
                (false, None) => {}
                (false, Some(start)) => {
                    run_start = None;
                    let window = AvailabilityWindow {
                        resource_id,
                        start,
                        end: offset - 1,
                    };
                    if window.nights() < min_nights {
                        continue;
                    }
                    match self.policy {
                        WindowPolicy::FirstQualifying => return Some(window),
                        WindowPolicy::Longest => {
                            if best.is_none_or(|b| window.nights() > b.nights()) {
                                best = Some(window);
                            }
                        }
                    }
                }
            }
        }

        best
    }

    /// Greedy scan over start days with binary-search expansion.
    ///
    /// `open(start, nights)` answers whether the whole range `[start, start + nights)`
    /// is available; an unknown answer must be `false`.
    pub async fn expand_coarse<F, Fut>(
        &self,
        resource_id: ResourceId,
        horizon: i64,
        min_nights: i64,
        mut open: F,
    ) -> Option<AvailabilityWindow>
    where
        F: FnMut(i64, i64) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut best: Option<AvailabilityWindow> = None;
        let mut day = 0;

        while day + min_nights <= horizon {
            if !open(day, min_nights).await {
                day += 1;
                continue;
            }

            let (mut lo, mut hi) = (min_nights, horizon - day);
            while lo < hi {
                let mid = (lo + hi + 1) / 2;
                if open(day, mid).await {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }

            let window = AvailabilityWindow {
                resource_id,
                start: day,
                end: day + lo,
            };
            match self.policy {
                WindowPolicy::FirstQualifying => return Some(window),
                WindowPolicy::Longest => {
                    if best.is_none_or(|b| window.nights() > b.nights()) {
                        best = Some(window);
                    }
                }
            }

            day += lo + 1;
        }

        best
    }

    // A coarse code covers the whole range, so a partial `7` cannot vouch for every night.
    async fn coarse_open(
        &self,
        client: &ProbeClient,
        ctx: &RunContext,
        candidate: &Candidate,
        start: i64,
        nights: i64,
    ) -> bool {
        match client
            .probe_map(ctx, candidate.map_id, DayRange::new(start, start + nights))
            .await
        {
            ProbeOutcome::Resources(leaf) => leaf.code_for(candidate.resource_id).is_available(),
            ProbeOutcome::Map(_) | ProbeOutcome::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn finder(policy: WindowPolicy, partial: PartialDayPolicy) -> WindowFinder {
        WindowFinder {
            policy,
            partial,
            strategy: WindowStrategy::DayScan,
        }
    }

    fn codes(raw: &[i32]) -> Vec<AvailabilityCode> {
        raw.iter().copied().map(AvailabilityCode).collect()
    }

    fn window(start: i64, end: i64) -> Option<AvailabilityWindow> {
        Some(AvailabilityWindow {
            resource_id: 101,
            start,
            end,
        })
    }

    #[test]
    fn test_gap_after_short_run() {
        let days = codes(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);

        for policy in [WindowPolicy::Longest, WindowPolicy::FirstQualifying] {
            let found = finder(policy, PartialDayPolicy::Gap).scan_days(101, &days, 5);
            assert_eq!(found, window(6, 11), "policy {:?}", policy);
            assert_eq!(found.unwrap().nights(), 5);
        }
    }

    #[test]
    fn test_policies_disagree() {
        let days = codes(&[0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        let first = finder(WindowPolicy::FirstQualifying, PartialDayPolicy::Gap).scan_days(101, &days, 5);
        assert_eq!(first, window(0, 5));

        let longest = finder(WindowPolicy::Longest, PartialDayPolicy::Gap).scan_days(101, &days, 5);
        assert_eq!(longest, window(7, 15));
    }

    #[test]
    fn test_longest_tie_keeps_earliest() {
        let days = codes(&[0, 0, 0, 1, 0, 0, 0]);
        let found = finder(WindowPolicy::Longest, PartialDayPolicy::Gap).scan_days(101, &days, 2);
        assert_eq!(found, window(0, 2));
    }

    #[test]
    fn test_short_tail_never_reported() {
        let days = codes(&[1, 1, 0, 0, 0]);
        let found = finder(WindowPolicy::Longest, PartialDayPolicy::Gap).scan_days(101, &days, 5);
        assert_eq!(found, None);
        assert_eq!(
            finder(WindowPolicy::Longest, PartialDayPolicy::Gap).scan_days(101, &[], 1),
            None
        );
    }

    #[test]
    fn test_partial_day_policy() {
        let days = codes(&[0, 0, 0, 7, 0, 0, 0, 0]);

        let gap = finder(WindowPolicy::Longest, PartialDayPolicy::Gap).scan_days(101, &days, 4);
        assert_eq!(gap, None);

        let open = finder(WindowPolicy::Longest, PartialDayPolicy::Available).scan_days(101, &days, 4);
        assert_eq!(open, window(0, 7));
    }

    // Coarse oracle: a range is open when every night in it is open in `nights`.
    fn oracle(nights: &[bool]) -> impl Fn(i64, i64) -> bool + '_ {
        move |start, len| {
            (start..start + len).all(|d| nights.get(d as usize).copied().unwrap_or(false))
        }
    }

    #[tokio::test]
    async fn test_coarse_expansion_finds_longest() {
        // nights 2..=4 open, 7..=13 open
        let mut nights = vec![false; 20];
        for d in (2..=4).chain(7..=13) {
            nights[d] = true;
        }
        let check = oracle(&nights);
        let probes = RefCell::new(0);

        let finder = WindowFinder {
            policy: WindowPolicy::Longest,
            partial: PartialDayPolicy::Gap,
            strategy: WindowStrategy::Coarse,
        };
        let found = finder
            .expand_coarse(101, 20, 3, |start, len| {
                *probes.borrow_mut() += 1;
                let open = check(start, len);
                async move { open }
            })
            .await;

        assert_eq!(found, window(7, 14));
        assert!(*probes.borrow() < 20 * 20);
    }

    #[tokio::test]
    async fn test_coarse_first_qualifying_and_none() {
        let mut nights = vec![false; 12];
        for d in (1..=3).chain(6..=11) {
            nights[d] = true;
        }
        let check = oracle(&nights);

        let first = WindowFinder {
            policy: WindowPolicy::FirstQualifying,
            partial: PartialDayPolicy::Gap,
            strategy: WindowStrategy::Coarse,
        };
        let found = first
            .expand_coarse(101, 12, 3, |s, n| {
                let open = check(s, n);
                async move { open }
            })
            .await;
        assert_eq!(found, window(1, 4));

        let nothing = first.expand_coarse(101, 12, 3, |_, _| async { false }).await;
        assert_eq!(nothing, None);
    }

    mod coarse {
        use super::*;
        use crate::context::CancelSignal;
        use crate::testing::*;
        use crate::types::Settings;
        use chrono::NaiveDate;
        use serde_json::Value;
        use std::sync::Arc;
        use std::time::Duration;

        const LEAF: i64 = -101;

        fn today() -> NaiveDate {
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
        }

        fn context() -> RunContext {
            RunContext::new(
                today(),
                today().and_hms_opt(6, 0, 0).unwrap(),
                Settings {
                    horizon_days: 12,
                    min_nights: 5,
                    ..Settings::default()
                },
                CancelSignal::new(),
            )
        }

        fn offset(call: &RecordedCall, key: &str) -> i64 {
            let date = NaiveDate::parse_from_str(call.param(key).unwrap(), "%Y-%m-%d").unwrap();
            (date - today()).num_days()
        }

        fn candidate() -> Candidate {
            Candidate {
                resource_id: 101,
                park_id: -100,
                map_id: LEAF,
                location_id: Some(1),
            }
        }

        async fn find(
            transport: ScriptedTransport,
            partial: PartialDayPolicy,
        ) -> (Option<AvailabilityWindow>, Arc<ScriptedTransport>) {
            let transport = Arc::new(transport);
            let config = DiscoveryConfig {
                base_url: "https://example.test".to_string(),
                probe_delay: Duration::ZERO,
                ..DiscoveryConfig::default()
            };
            let client = ProbeClient::new(transport.clone(), &config);
            let finder = WindowFinder {
                policy: WindowPolicy::Longest,
                partial,
                strategy: WindowStrategy::Coarse,
            };
            let found = finder.find(&client, &context(), &candidate()).await;
            (found, transport)
        }

        // Leaf answering 0 when every night of the requested range is in `open`.
        fn leaf_over(open: std::ops::RangeInclusive<i64>) -> ScriptedTransport {
            ScriptedTransport::new().map_with(LEAF, move |call| {
                let (start, end) = (offset(call, "startDate"), offset(call, "endDate"));
                let code = if (start..end).all(|d| open.contains(&d)) { 0 } else { 1 };
                Some(leaf_node(&[(101, code)]))
            })
        }

        #[tokio::test]
        async fn test_window_from_leaf_ranges() {
            let (found, transport) = find(leaf_over(3..=9), PartialDayPolicy::Gap).await;

            assert_eq!(found, window(3, 10));

            let calls = transport.calls();
            assert_eq!((offset(&calls[0], "startDate"), offset(&calls[0], "endDate")), (0, 5));
            assert_eq!((offset(&calls[3], "startDate"), offset(&calls[3], "endDate")), (3, 8));
            assert!(calls.iter().all(|c| c.param("mapId") == Some("-101")));
        }

        #[tokio::test]
        async fn test_unknown_or_map_reply_is_closed() {
            let unknown = ScriptedTransport::new().map_with(LEAF, |_| None);
            let (found, transport) = find(unknown, PartialDayPolicy::Available).await;
            assert_eq!(found, None);
            assert_eq!(transport.calls_for_map(LEAF), 8);

            let internal = ScriptedTransport::new().map(LEAF, internal_node(&[(-102, 0)]));
            let (found, _) = find(internal, PartialDayPolicy::Available).await;
            assert_eq!(found, None);
        }

        #[tokio::test]
        async fn test_partial_range_is_not_open() {
            // Only night 0 is free: a range starting at day 0 reports 7.
            let transport = ScriptedTransport::new().map_with(LEAF, |call| {
                let code = match (offset(call, "startDate"), offset(call, "endDate")) {
                    (0, 1) => 0,
                    (0, _) => 7,
                    _ => 1,
                };
                Some::<Value>(leaf_node(&[(101, code)]))
            });

            let (found, _) = find(transport, PartialDayPolicy::Available).await;
            assert_eq!(found, None);
        }
    }
}
