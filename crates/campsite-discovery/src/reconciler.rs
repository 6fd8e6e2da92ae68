use std::collections::HashSet;

use tracing::warn;

use crate::booking::{BookingLink, booking_url};
use crate::catalog::Catalog;
use crate::context::RunContext;
use crate::error::DiscoveryError;
use crate::types::*;
use crate::walker::Candidate;

/// Join discovered windows with catalog metadata into a fresh [`SearchResult`].
///
/// Pairs whose resource or location is missing from the catalog are skipped
/// with a warning. Entries whose id is in `cart_ids` are flagged as added.
pub async fn reconcile(
    catalog: &Catalog,
    ctx: &RunContext,
    base_url: &str,
    found: &[(Candidate, AvailabilityWindow)],
    cart_ids: &HashSet<ResourceId>,
) -> Result<SearchResult, DiscoveryError> {
    let mut data = Vec::with_capacity(found.len());

    for (candidate, window) in found {
        let Some(resource) = catalog.resource(window.resource_id).await? else {
            warn!("Resource {} is not catalogued; entry skipped", window.resource_id);
            continue;
        };
        let Some(location_id) = resource.location_id.or(candidate.location_id) else {
            warn!("Resource {} has no location; entry skipped", resource.id);
            continue;
        };
        let Some(location) = catalog.location(location_id).await? else {
            warn!("Location {} of resource {} is not catalogued; entry skipped", location_id, resource.id);
            continue;
        };

        let attributes: Vec<Attribute> = serde_json::from_str(&resource.attr).unwrap_or_else(|e| {
            warn!("Attributes of resource {} do not decode: {}", resource.id, e);
            Vec::new()
        });

        let link = BookingLink {
            map_id: resource.map_id,
            start_date: ctx.date(window.start),
            end_date: ctx.date(window.end),
            equipment: ctx.settings.equipment,
            location_id: Some(location.id),
        };

        data.push(SearchEntry {
            id: resource.id,
            site: resource.name,
            full_name: location.full_name,
            attributes,
            category: resource.category,
            description: resource.description,
            start_date: link.start_date,
            end_date: link.end_date,
            nights: window.nights(),
            capacity: resource.capacity,
            booking_url: booking_url(base_url, &link, ctx.started_at),
            added_to_cart: cart_ids.contains(&resource.id),
        });
    }

    Ok(SearchResult {
        time: Some(ctx.started_at),
        data,
    })
}
