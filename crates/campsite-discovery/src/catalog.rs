use std::collections::BTreeMap;

use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::DiscoveryError;
use crate::types::*;

/// Document holding the last published [`SearchResult`]
pub const RESULT_DOCUMENT: &str = "searchResult";

/// Document holding the cart
pub const CART_DOCUMENT: &str = "cart";

const KEY_LOCATIONS: &str = "locations";
const KEY_EQUIPMENT: &str = "equipment";
const KEY_HORIZON: &str = "horizon_days";
const KEY_MIN_NIGHTS: &str = "min_nights";
const KEY_INTERVAL: &str = "interval_minutes";
const KEY_PUSH_TOKEN: &str = "push_token";

/// Durable store of settings, discovered resources, reference tables and documents
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Wrap a pool whose schema has been migrated
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Settings

    /// Raw value stored under `key`
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, DiscoveryError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("value")))
    }

    /// Store `value` under `key`, replacing any previous value
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), DiscoveryError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current user settings; absent keys keep their defaults
    pub async fn settings(&self) -> Result<Settings, DiscoveryError> {
        let mut settings = Settings::default();

        if let Some(raw) = self.get_setting(KEY_LOCATIONS).await? {
            settings.locations = parse_setting(KEY_LOCATIONS, &raw)?;
        }
        if let Some(raw) = self.get_setting(KEY_EQUIPMENT).await? {
            settings.equipment = parse_setting(KEY_EQUIPMENT, &raw)?;
        }
        if let Some(raw) = self.get_setting(KEY_HORIZON).await? {
            settings.horizon_days = parse_setting(KEY_HORIZON, &raw)?;
        }
        if let Some(raw) = self.get_setting(KEY_MIN_NIGHTS).await? {
            settings.min_nights = parse_setting(KEY_MIN_NIGHTS, &raw)?;
        }
        if let Some(raw) = self.get_setting(KEY_INTERVAL).await? {
            settings.interval_minutes = parse_setting(KEY_INTERVAL, &raw)?;
        }
        settings.push_token = self
            .get_setting(KEY_PUSH_TOKEN)
            .await?
            .filter(|token| !token.is_empty());

        Ok(settings)
    }

    /// Persist every field of `settings` in one transaction
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), DiscoveryError> {
        let mut tx = self.pool.begin().await?;

        let pairs = [
            (KEY_LOCATIONS, serde_json::to_string(&settings.locations)?),
            (KEY_EQUIPMENT, settings.equipment.to_string()),
            (KEY_HORIZON, settings.horizon_days.to_string()),
            (KEY_MIN_NIGHTS, settings.min_nights.to_string()),
            (KEY_INTERVAL, settings.interval_minutes.to_string()),
        ];
        for (key, value) in pairs {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value) VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        match &settings.push_token {
            Some(token) => {
                sqlx::query(
                    r#"
                    INSERT INTO settings (key, value) VALUES (?, ?)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value
                    "#,
                )
                .bind(KEY_PUSH_TOKEN)
                .bind(token)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM settings WHERE key = ?")
                    .bind(KEY_PUSH_TOKEN)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Store the device token used for push notifications
    pub async fn set_push_token(&self, token: &str) -> Result<(), DiscoveryError> {
        self.set_setting(KEY_PUSH_TOKEN, token).await
    }

    // Resources

    /// Whether a resource with `id` has been catalogued
    pub async fn resource_exists(&self, id: ResourceId) -> Result<bool, DiscoveryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM resource_map WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    /// Insert a new resource; an existing row with the same id is left untouched.
    ///
    /// Returns whether a row was inserted.
    pub async fn insert_resource(&self, resource: &Resource) -> Result<bool, DiscoveryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO resource_map (
                id, park_id, map_id, location_id, name, description,
                category, capacity, max_stay, photos, attr
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(resource.id)
        .bind(resource.park_id)
        .bind(resource.map_id)
        .bind(resource.location_id)
        .bind(&resource.name)
        .bind(&resource.description)
        .bind(&resource.category)
        .bind(resource.capacity)
        .bind(resource.max_stay)
        .bind(&resource.photos)
        .bind(&resource.attr)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Fetch one resource
    pub async fn resource(&self, id: ResourceId) -> Result<Option<Resource>, DiscoveryError> {
        let resource = sqlx::query_as::<_, Resource>("SELECT * FROM resource_map WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(resource)
    }

    /// Number of catalogued resources
    pub async fn resource_count(&self) -> Result<i64, DiscoveryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM resource_map")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("n"))
    }

    /// Rewrite the attribute blob of an existing resource.
    ///
    /// Returns whether the stored blob changed.
    pub async fn update_resource_attributes(
        &self,
        id: ResourceId,
        attributes: &[Attribute],
    ) -> Result<bool, DiscoveryError> {
        let blob = serde_json::to_string(attributes)?;
        let result = sqlx::query("UPDATE resource_map SET attr = ? WHERE id = ? AND attr <> ?")
            .bind(&blob)
            .bind(id)
            .bind(&blob)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Locations and map links

    /// Insert or replace a location
    pub async fn upsert_location(&self, location: &Location) -> Result<(), DiscoveryError> {
        sqlx::query(
            r#"
            INSERT INTO location (id, root_map_id, name, full_name) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                root_map_id = excluded.root_map_id,
                name = excluded.name,
                full_name = excluded.full_name
            "#,
        )
        .bind(location.id)
        .bind(location.root_map_id)
        .bind(&location.name)
        .bind(&location.full_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one location
    pub async fn location(&self, id: LocationId) -> Result<Option<Location>, DiscoveryError> {
        let location = sqlx::query_as::<_, Location>("SELECT * FROM location WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(location)
    }

    /// Every catalogued location
    pub async fn locations(&self) -> Result<Vec<Location>, DiscoveryError> {
        let locations = sqlx::query_as::<_, Location>("SELECT * FROM location ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(locations)
    }

    /// Record which location owns a map node
    pub async fn upsert_map_link(
        &self,
        map_id: MapId,
        location_id: Option<LocationId>,
    ) -> Result<(), DiscoveryError> {
        sqlx::query(
            r#"
            INSERT INTO map (map_id, resource_location_id) VALUES (?, ?)
            ON CONFLICT(map_id) DO UPDATE SET resource_location_id = excluded.resource_location_id
            "#,
        )
        .bind(map_id)
        .bind(location_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Location owning `map_id`: an explicit map link first, then a location rooted at it
    pub async fn find_location_id(&self, map_id: MapId) -> Result<Option<LocationId>, DiscoveryError> {
        let linked: Option<Option<LocationId>> =
            sqlx::query_scalar("SELECT resource_location_id FROM map WHERE map_id = ?")
                .bind(map_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(Some(location_id)) = linked {
            return Ok(Some(location_id));
        }

        let rooted: Option<LocationId> =
            sqlx::query_scalar("SELECT id FROM location WHERE root_map_id = ? LIMIT 1")
                .bind(map_id)
                .fetch_optional(&self.pool)
                .await?;

        if rooted.is_none() {
            debug!("Map {} has no known location", map_id);
        }
        Ok(rooted)
    }

    // Categories

    /// Insert or replace a category
    pub async fn upsert_category(&self, category: &Category) -> Result<(), DiscoveryError> {
        sqlx::query(
            r#"
            INSERT INTO category (id, name, description) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, description = excluded.description
            "#,
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Display name of a category
    pub async fn category_name(&self, id: i64) -> Result<Option<String>, DiscoveryError> {
        let name = sqlx::query_scalar("SELECT name FROM category WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(name)
    }

    // Attribute definitions

    /// Replace the cached attribute definitions wholesale
    pub async fn replace_attribute_definitions(
        &self,
        definitions: &[AttributeDefinition],
    ) -> Result<(), DiscoveryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM attribute_definition")
            .execute(&mut *tx)
            .await?;

        for definition in definitions {
            sqlx::query("INSERT OR REPLACE INTO attribute_definition (id, definition) VALUES (?, ?)")
                .bind(definition.attribute_definition_id)
                .bind(serde_json::to_string(definition)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Cached attribute definitions keyed by id; rows that no longer decode are skipped
    pub async fn attribute_definitions(
        &self,
    ) -> Result<BTreeMap<i64, AttributeDefinition>, DiscoveryError> {
        let rows = sqlx::query("SELECT id, definition FROM attribute_definition")
            .fetch_all(&self.pool)
            .await?;

        let mut definitions = BTreeMap::new();
        for row in rows {
            let id: i64 = row.get("id");
            let body: String = row.get("definition");
            match serde_json::from_str::<AttributeDefinition>(&body) {
                Ok(definition) => {
                    definitions.insert(id, definition);
                }
                Err(e) => warn!("Skipping attribute definition {}: {}", id, e),
            }
        }

        Ok(definitions)
    }

    // Documents

    /// Load a JSON document; `None` when it was never flushed
    pub async fn load_document<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, DiscoveryError> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM documents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Replace a JSON document
    pub async fn flush_document<T: Serialize + ?Sized>(
        &self,
        name: &str,
        document: &T,
    ) -> Result<(), DiscoveryError> {
        sqlx::query(DOCUMENT_UPSERT)
            .bind(name)
            .bind(serde_json::to_string(document)?)
            .bind(timestamp())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replace the cart and result documents together; neither changes if either write fails
    pub async fn flush_cart(&self, cart: &[CartEntry], result: &SearchResult) -> Result<(), DiscoveryError> {
        let documents = [
            (CART_DOCUMENT, serde_json::to_string(cart)?),
            (RESULT_DOCUMENT, serde_json::to_string(result)?),
        ];
        let updated_at = timestamp();

        let mut tx = self.pool.begin().await?;
        for (name, body) in documents {
            sqlx::query(DOCUMENT_UPSERT)
                .bind(name)
                .bind(body)
                .bind(updated_at.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

const DOCUMENT_UPSERT: &str = r#"
    INSERT INTO documents (name, body, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
"#;

fn timestamp() -> String {
    Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_setting<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, DiscoveryError> {
    serde_json::from_str(raw)
        .map_err(|e| DiscoveryError::Configuration(format!("setting '{}' is invalid: {}", key, e)))
}
