use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::attributes::resolve_attributes;
use crate::catalog::Catalog;
use crate::config::DiscoveryConfig;
use crate::context::RunContext;
use crate::error::DiscoveryError;
use crate::probe::{AvailabilityCode, ProbeOutcome, ResourceDetail, ResourceProbe};
use crate::probe_client::{DayRange, ProbeClient};
use crate::types::*;

/// A resource found open at a leaf during a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Resource to localize a window for
    pub resource_id: ResourceId,
    /// Park root the walk started from
    pub park_id: MapId,
    /// Leaf map node listing the resource
    pub map_id: MapId,
    /// Location owning the leaf, when known
    pub location_id: Option<LocationId>,
}

/// Counters and candidates produced by one park walk
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Open resources in discovery order, unique by id
    pub candidates: Vec<Candidate>,
    /// Resources newly written to the catalog
    pub inserted: usize,
    /// Map nodes probed
    pub nodes_probed: usize,
    /// Children and resources skipped because they were reported unavailable
    pub pruned: usize,
    /// Probes that came back unknown
    pub unknown: usize,
}

type DetailList = Option<BTreeMap<ResourceId, ResourceDetail>>;

/// Resource detail lists fetched during one run.
///
/// Shared by every walker of the run; each location is fetched at most once,
/// including a failed fetch.
#[derive(Default)]
pub struct DetailCache {
    lists: Mutex<HashMap<LocationId, Arc<OnceCell<DetailList>>>>,
}

impl DetailCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Detail entry of `resource_id` in the list of `location_id`
    pub async fn detail(
        &self,
        client: &ProbeClient,
        ctx: &RunContext,
        location_id: LocationId,
        resource_id: ResourceId,
    ) -> Option<ResourceDetail> {
        let cell = self.lists.lock().await.entry(location_id).or_default().clone();
        let list = cell
            .get_or_init(|| async {
                let fetched = client.resource_details(Some(ctx), location_id).await;
                if fetched.is_none() {
                    warn!("Resource list of location {} could not be fetched", location_id);
                }
                fetched
            })
            .await;

        list.as_ref()?.get(&resource_id).cloned()
    }
}

/// Explores the map tree below a park.
///
/// Probes go through the walker's own client; detail lists come from the
/// run's [`DetailCache`].
pub struct HierarchyWalker<'a> {
    client: &'a ProbeClient,
    catalog: &'a Catalog,
    config: &'a DiscoveryConfig,
    details: &'a DetailCache,
    definitions: Option<BTreeMap<i64, AttributeDefinition>>,
}

impl<'a> HierarchyWalker<'a> {
    /// Walker probing through `client` and cataloguing into `catalog`
    pub fn new(
        client: &'a ProbeClient,
        catalog: &'a Catalog,
        config: &'a DiscoveryConfig,
        details: &'a DetailCache,
    ) -> Self {
        Self {
            client,
            catalog,
            config,
            details,
            definitions: None,
        }
    }

    /// Walk the tree rooted at `park_id` over the run's horizon.
    ///
    /// Fails only on storage errors or cancellation; unknown probes and
    /// missing catalog rows are logged and contained at their node.
    pub async fn walk(&mut self, ctx: &RunContext, park_id: MapId) -> Result<WalkReport, DiscoveryError> {
        let mut report = WalkReport::default();
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut stack = vec![MapNode {
            id: park_id,
            location_id: self.catalog.find_location_id(park_id).await?,
        }];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id) {
                debug!("Map {} already visited, skipping", node.id);
                continue;
            }
            if self.config.ignored_map_ids.contains(&node.id) {
                debug!("Map {} is ignored", node.id);
                continue;
            }

            ctx.check_cancelled()?;
            report.nodes_probed += 1;

            match self
                .client
                .probe_map(ctx, node.id, DayRange::new(0, ctx.horizon()))
                .await
            {
                ProbeOutcome::Unknown => {
                    report.unknown += 1;
                    warn!("Map {} probe failed, treating subtree as unavailable", node.id);
                }
                ProbeOutcome::Map(map) => {
                    // Reversed so children are visited in ascending id order.
                    for (&child, code) in map.children.iter().rev() {
                        if !code.worth_descending() {
                            report.pruned += 1;
                            continue;
                        }
                        let location_id = self
                            .catalog
                            .find_location_id(child)
                            .await?
                            .or(node.location_id);
                        stack.push(MapNode {
                            id: child,
                            location_id,
                        });
                    }
                }
                ProbeOutcome::Resources(leaf) => {
                    self.enumerate_leaf(ctx, park_id, &node, &leaf, &mut seen, &mut report)
                        .await?;
                }
            }
        }

        info!(
            "Park {}: {} nodes probed, {} pruned, {} unknown, {} candidates, {} new resources",
            park_id,
            report.nodes_probed,
            report.pruned,
            report.unknown,
            report.candidates.len(),
            report.inserted
        );
        Ok(report)
    }

    async fn enumerate_leaf(
        &mut self,
        ctx: &RunContext,
        park_id: MapId,
        node: &MapNode,
        leaf: &ResourceProbe,
        seen: &mut HashSet<ResourceId>,
        report: &mut WalkReport,
    ) -> Result<(), DiscoveryError> {
        for (&resource_id, codes) in &leaf.resources {
            if !AvailabilityCode::summarize(codes).worth_descending() {
                report.pruned += 1;
                continue;
            }
            if !seen.insert(resource_id) {
                continue;
            }

            ctx.check_cancelled()?;

            if !self.catalog.resource_exists(resource_id).await? {
                let Some(resource) = self.describe(ctx, park_id, node, resource_id).await? else {
                    continue;
                };
                if self.catalog.insert_resource(&resource).await? {
                    report.inserted += 1;
                    info!("Catalogued resource {} ({}) under park {}", resource.id, resource.name, park_id);
                }
            }

            report.candidates.push(Candidate {
                resource_id,
                park_id,
                map_id: node.id,
                location_id: node.location_id,
            });
        }

        Ok(())
    }

    // Builds the catalog row for a resource not seen before; `None` when the
    // location or its detail entry is missing.
    async fn describe(
        &mut self,
        ctx: &RunContext,
        park_id: MapId,
        node: &MapNode,
        resource_id: ResourceId,
    ) -> Result<Option<Resource>, DiscoveryError> {
        let Some(location_id) = node.location_id else {
            warn!("Leaf {} has no known location; resource {} skipped", node.id, resource_id);
            return Ok(None);
        };

        let Some(detail) = self
            .details
            .detail(self.client, ctx, location_id, resource_id)
            .await
        else {
            warn!("Resource {} not found in location {}", resource_id, location_id);
            return Ok(None);
        };

        let category = match detail.resource_category_id {
            Some(category_id) => {
                let name = self.catalog.category_name(category_id).await?;
                if name.is_none() {
                    warn!("Unknown category {} for resource {}", category_id, resource_id);
                }
                name
            }
            None => None,
        };

        if self.definitions.is_none() {
            self.definitions = Some(self.catalog.attribute_definitions().await?);
        }
        let attributes = resolve_attributes(
            &detail.defined_attributes,
            self.definitions.as_ref().unwrap_or(&BTreeMap::new()),
            &self.config.locale,
        );

        let text = detail.text(&self.config.locale);
        let photos = if detail.photos.is_null() {
            "[]".to_string()
        } else {
            detail.photos.to_string()
        };

        Ok(Some(Resource {
            id: resource_id,
            park_id,
            map_id: node.id,
            location_id: Some(location_id),
            name: text.name,
            description: text.description,
            category,
            capacity: detail.max_capacity.unwrap_or(0),
            max_stay: detail.max_stay.unwrap_or(0),
            photos,
            attr: serde_json::to_string(&attributes)?,
        }))
    }
}
