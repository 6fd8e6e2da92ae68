use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Identifier of a node in the remote map tree. Sentinel nodes use large negative values.
pub type MapId = i64;

/// Identifier of a bookable resource (campsite)
pub type ResourceId = i64;

/// Identifier of a resource location (campground)
pub type LocationId = i64;

/// A node on the walker's worklist. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapNode {
    /// Node identifier
    pub id: MapId,
    /// Resource location owning the node, inherited from the parent unless mapped explicitly
    pub location_id: Option<LocationId>,
}

/// A catalogued bookable resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Resource {
    /// Globally unique resource identifier
    pub id: ResourceId,
    /// Park (root map node) the resource was discovered under
    pub park_id: MapId,
    /// Leaf map node listing the resource
    pub map_id: MapId,
    /// Owning resource location
    pub location_id: Option<LocationId>,
    /// Display name, e.g. the site number
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Category name resolved from the category table
    pub category: Option<String>,
    /// Maximum number of people
    pub capacity: i64,
    /// Maximum stay in nights
    pub max_stay: i64,
    /// Serialized photo list as received from the platform
    pub photos: String,
    /// Serialized list of [`Attribute`] pairs
    pub attr: String,
}

/// A resource location (campground) with its display names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    /// Resource location identifier
    pub id: LocationId,
    /// Map node at the top of this location's map tree
    pub root_map_id: Option<MapId>,
    /// Short display name
    pub name: String,
    /// Full display name, e.g. "Jasper - Whistlers"
    pub full_name: String,
}

/// A resource category (campsite, oTENTik, group site, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    /// Category identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
}

/// A display name in one culture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedName {
    /// Culture code such as `en-CA`
    pub culture_name: String,
    /// Name in that culture
    #[serde(default)]
    pub display_name: String,
}

/// One value of an enumerated attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeEnumValue {
    /// Raw value referenced by resources
    pub enum_value: serde_json::Value,
    /// Localized names of the value
    #[serde(default)]
    pub localized_values: Vec<LocalizedName>,
}

/// Cached definition of a classification attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    /// Attribute definition identifier
    #[serde(alias = "id")]
    pub attribute_definition_id: i64,
    /// Localized attribute names
    #[serde(default)]
    pub localized_values: Vec<LocalizedName>,
    /// Enumerated values, empty for numeric attributes
    #[serde(default)]
    pub values: Vec<AttributeEnumValue>,
    /// Lower bound for numeric attributes
    #[serde(default)]
    pub min_value: Option<serde_json::Value>,
    /// Upper bound for numeric attributes
    #[serde(default)]
    pub max_value: Option<serde_json::Value>,
}

/// A resolved attribute ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name
    pub attribute: String,
    /// Rendered value
    pub value: String,
}

/// A stay window in day offsets from the run's reference date.
///
/// Nights run from `start` up to but excluding `end`; `end` is the checkout
/// day, which is also the last day the resource was reported open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    /// Resource the window belongs to
    pub resource_id: ResourceId,
    /// First night, as an offset from today
    pub start: i64,
    /// Checkout day, as an offset from today
    pub end: i64,
}

impl AvailabilityWindow {
    /// Number of nights covered by the window
    pub fn nights(&self) -> i64 {
        self.end - self.start
    }
}

/// One row of the published search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    /// Resource identifier
    pub id: ResourceId,
    /// Site display name
    pub site: String,
    /// Full name of the owning location
    pub full_name: String,
    /// Resolved attributes
    pub attributes: Vec<Attribute>,
    /// Category name
    pub category: Option<String>,
    /// Site description
    pub description: String,
    /// Arrival date
    pub start_date: NaiveDate,
    /// Departure date
    pub end_date: NaiveDate,
    /// Nights between arrival and departure
    pub nights: i64,
    /// Maximum number of people
    pub capacity: i64,
    /// Deep link into the booking flow
    pub booking_url: String,
    /// Whether the resource is in the user's cart
    pub added_to_cart: bool,
}

/// Entries in the cart are snapshots of the search entry they were added from
pub type CartEntry = SearchEntry;

/// The timestamped list produced by one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Local time at which the producing run started
    pub time: Option<NaiveDateTime>,
    /// Entries in discovery order
    pub data: Vec<SearchEntry>,
}

impl SearchResult {
    /// Resource identifiers present in the result
    pub fn resource_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.data.iter().map(|entry| entry.id)
    }
}

/// User settings persisted in the catalog and editable through the façade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Settings {
    /// Park root map ids to walk
    pub locations: Vec<MapId>,

    /// Sub-equipment category used in every probe
    pub equipment: i64,

    /// Days from today covered by a run
    #[validate(range(min = 1, max = 365, message = "horizon must be between 1 and 365 days"))]
    pub horizon_days: i64,

    /// Shortest reportable stay, in nights
    #[validate(range(min = 1, max = 30, message = "minimum stay must be between 1 and 30 nights"))]
    pub min_nights: i64,

    /// Minutes between scheduled runs
    #[validate(range(min = 1, max = 1440, message = "interval must be between 1 and 1440 minutes"))]
    pub interval_minutes: u64,

    /// Device registration token for push notifications
    #[serde(default)]
    pub push_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            equipment: -32759,
            horizon_days: 60,
            min_nights: 5,
            interval_minutes: 20,
            push_token: None,
        }
    }
}
