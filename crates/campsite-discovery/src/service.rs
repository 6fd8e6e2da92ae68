use std::sync::Arc;

use tracing::info;
use validator::Validate;

use crate::discovery::{Discovery, RunSummary};
use crate::error::DiscoveryError;
use crate::maintenance::ReferenceSummary;
use crate::results::CartTarget;
use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::types::*;

/// Operations offered to the HTTP façade
#[derive(Clone)]
pub struct TrackerService {
    scheduler: Scheduler,
}

impl TrackerService {
    /// Service over a scheduler and the engine it drives
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    fn discovery(&self) -> &Arc<Discovery> {
        self.scheduler.discovery()
    }

    /// Stored user settings
    pub async fn get_settings(&self) -> Result<Settings, DiscoveryError> {
        self.discovery().catalog().settings().await
    }

    /// Validate and store new settings; they apply from the next run.
    ///
    /// A missing push token keeps the registered one.
    pub async fn on_settings_changed(&self, mut settings: Settings) -> Result<Settings, DiscoveryError> {
        settings
            .validate()
            .map_err(|e| DiscoveryError::Validation(e.to_string()))?;

        let catalog = self.discovery().catalog();
        if settings.push_token.is_none() {
            settings.push_token = catalog.settings().await?.push_token;
        }
        catalog.save_settings(&settings).await?;

        info!(
            "Settings updated: {} locations, equipment {}, {} days, every {} minutes",
            settings.locations.len(),
            settings.equipment,
            settings.horizon_days,
            settings.interval_minutes
        );
        Ok(settings)
    }

    /// Published result, entries ordered by location then site name
    pub async fn get_result(&self) -> SearchResult {
        let mut result = (*self.discovery().store().current().await).clone();
        result
            .data
            .sort_by(|a, b| a.full_name.cmp(&b.full_name).then_with(|| a.site.cmp(&b.site)));
        result
    }

    /// Current cart
    pub async fn get_cart(&self) -> Vec<CartEntry> {
        (*self.discovery().store().cart().await).clone()
    }

    /// Add a published entry to the cart
    pub async fn add_to_cart(&self, id: ResourceId) -> Result<CartEntry, DiscoveryError> {
        self.discovery().store().add_to_cart(id).await
    }

    /// Remove one entry, or all of them, from the cart
    pub async fn remove_from_cart(&self, target: CartTarget) -> Result<usize, DiscoveryError> {
        self.discovery().store().remove_from_cart(target).await
    }

    /// Register the device token of the client app identified by `app_id`
    pub async fn register_push_token(&self, app_id: &str, token: &str) -> Result<(), DiscoveryError> {
        if app_id != self.discovery().config().push_app_id {
            return Err(DiscoveryError::Validation(format!("unknown application '{}'", app_id)));
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(DiscoveryError::Validation("push token is empty".to_string()));
        }

        let catalog = self.discovery().catalog();
        if catalog.settings().await?.push_token.as_deref() != Some(token) {
            catalog.set_push_token(token).await?;
            info!("Push token registered");
        }
        Ok(())
    }

    /// Start or restart the periodic loop
    pub async fn start(&self) {
        self.scheduler.start().await
    }

    /// Stop the periodic loop and any in-flight run
    pub async fn stop(&self) {
        self.scheduler.stop().await
    }

    /// Run one cycle now
    pub async fn run_now(&self) -> Result<RunSummary, DiscoveryError> {
        self.scheduler.run_now().await
    }

    /// Scheduler state
    pub async fn status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    /// Refresh categories, locations and attribute definitions
    pub async fn refresh_reference_data(&self) -> Result<ReferenceSummary, DiscoveryError> {
        self.discovery().refresh_reference_data().await
    }

    /// Rewrite catalogued resources' attributes
    pub async fn refresh_resource_attributes(&self) -> Result<usize, DiscoveryError> {
        self.discovery().refresh_resource_attributes().await
    }
}
