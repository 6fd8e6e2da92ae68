use serde::Serialize;
use tracing::{info, warn};

use crate::attributes::resolve_attributes;
use crate::discovery::Discovery;
use crate::error::DiscoveryError;
use crate::probe::{RemoteLocation, ResourceText};
use crate::types::{Category, Location};

/// Rows written by [`Discovery::refresh_reference_data`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceSummary {
    /// Categories upserted
    pub categories: usize,
    /// Locations upserted
    pub locations: usize,
    /// Attribute definitions cached
    pub attribute_definitions: usize,
}

impl Discovery {
    /// Refresh categories, locations and attribute definitions from the platform.
    ///
    /// A list that cannot be fetched is logged and leaves its table as it was.
    pub async fn refresh_reference_data(&self) -> Result<ReferenceSummary, DiscoveryError> {
        let catalog = self.catalog();
        let locale = &self.config().locale;
        let mut summary = ReferenceSummary::default();

        match self.client().resource_categories().await {
            Some(categories) => {
                for remote in categories {
                    let text = pick_text(&remote.localized_values, locale);
                    catalog
                        .upsert_category(&Category {
                            id: remote.id,
                            name: text.name,
                            description: Some(text.description).filter(|d| !d.is_empty()),
                        })
                        .await?;
                    summary.categories += 1;
                }
            }
            None => warn!("Resource categories could not be fetched"),
        }

        match self.client().resource_locations().await {
            Some(locations) => {
                for remote in locations {
                    catalog.upsert_location(&to_location(&remote, locale)).await?;
                    summary.locations += 1;
                }
            }
            None => warn!("Resource locations could not be fetched"),
        }

        match self.client().attribute_definitions().await {
            Some(definitions) => {
                catalog.replace_attribute_definitions(&definitions).await?;
                summary.attribute_definitions = definitions.len();
            }
            None => warn!("Attribute definitions could not be fetched"),
        }

        info!(
            "Reference data refreshed: {} categories, {} locations, {} attribute definitions",
            summary.categories, summary.locations, summary.attribute_definitions
        );
        Ok(summary)
    }

    /// Rewrite the attribute blob of every catalogued resource from the
    /// platform's resource lists. Returns the number of rows changed.
    pub async fn refresh_resource_attributes(&self) -> Result<usize, DiscoveryError> {
        let catalog = self.catalog();
        let definitions = catalog.attribute_definitions().await?;
        let mut changed = 0;

        for location in catalog.locations().await? {
            let Some(details) = self.client().resource_details(None, location.id).await else {
                warn!("Resource location {} could not be resolved", location.id);
                continue;
            };

            for (resource_id, detail) in details {
                let attributes =
                    resolve_attributes(&detail.defined_attributes, &definitions, &self.config().locale);
                if catalog.update_resource_attributes(resource_id, &attributes).await? {
                    changed += 1;
                }
            }
        }

        info!("Resource attributes refreshed, {} rows changed", changed);
        Ok(changed)
    }
}

fn pick_text(texts: &[ResourceText], locale: &str) -> ResourceText {
    texts
        .iter()
        .find(|t| t.culture_name.as_deref() == Some(locale))
        .or_else(|| texts.first())
        .cloned()
        .unwrap_or_default()
}

fn to_location(remote: &RemoteLocation, locale: &str) -> Location {
    let names = remote
        .localized_values
        .iter()
        .find(|n| n.culture_name.as_deref() == Some(locale))
        .or_else(|| remote.localized_values.first())
        .cloned()
        .unwrap_or_default();

    Location {
        id: remote.resource_location_id,
        root_map_id: remote.root_map_id,
        name: names.short_name,
        full_name: names.full_name,
    }
}
