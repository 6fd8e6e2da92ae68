use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PartialDayPolicy;
use crate::types::{LocationId, MapId, ResourceId};

/// Availability code reported by the platform for a node, resource or day.
///
/// `0` is fully available, `7` partially available, anything else unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AvailabilityCode(pub i32);

impl AvailabilityCode {
    /// Fully available
    pub const AVAILABLE: Self = Self(0);
    /// Unavailable; also what an empty code list collapses to
    pub const UNAVAILABLE: Self = Self(1);
    /// Partially available over the requested range
    pub const PARTIAL: Self = Self(7);

    /// Code `0`
    pub fn is_available(self) -> bool {
        self == Self::AVAILABLE
    }

    /// Code `7`
    pub fn is_partial(self) -> bool {
        self == Self::PARTIAL
    }

    /// Whether a walker should look below a node or resource with this code
    pub fn worth_descending(self) -> bool {
        self.is_available() || self.is_partial()
    }

    /// Whether the code keeps a stay window open under `policy`
    pub fn is_open(self, policy: PartialDayPolicy) -> bool {
        match policy {
            PartialDayPolicy::Gap => self.is_available(),
            PartialDayPolicy::Available => self.worth_descending(),
        }
    }

    /// Collapse a list of codes into one coarse code.
    ///
    /// All available is `0`; any available or partial entry is `7`; otherwise
    /// the first code. An empty list is unavailable.
    pub fn summarize(codes: &[AvailabilityCode]) -> AvailabilityCode {
        let Some(first) = codes.first() else {
            return Self::UNAVAILABLE;
        };

        if codes.iter().all(|c| c.is_available()) {
            Self::AVAILABLE
        } else if codes.iter().any(|c| c.worth_descending()) {
            Self::PARTIAL
        } else {
            *first
        }
    }
}

/// Child links of an internal map node with their coarse codes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapProbe {
    /// Child map node -> coarse availability code
    pub children: BTreeMap<MapId, AvailabilityCode>,
}

/// Resources listed by a leaf map node with their availability codes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceProbe {
    /// Resource -> codes; one per day when daily availability was requested
    pub resources: BTreeMap<ResourceId, Vec<AvailabilityCode>>,
}

impl ResourceProbe {
    /// Coarse code of one resource; absent resources are unavailable
    pub fn code_for(&self, resource_id: ResourceId) -> AvailabilityCode {
        self.resources
            .get(&resource_id)
            .map(|codes| AvailabilityCode::summarize(codes))
            .unwrap_or(AvailabilityCode::UNAVAILABLE)
    }
}

/// Normalized outcome of a map availability probe
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Internal node
    Map(MapProbe),
    /// Leaf node
    Resources(ResourceProbe),
    /// Transport failure or unexpected payload; always read as "not available"
    Unknown,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeEntry {
    Bare(i32),
    Entry { availability: i32 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeList {
    Many(Vec<CodeEntry>),
    One(CodeEntry),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMapAvailability {
    #[serde(default)]
    resource_availabilities: Option<HashMap<String, CodeList>>,
    #[serde(default)]
    map_link_availabilities: Option<HashMap<String, CodeList>>,
}

impl From<CodeEntry> for AvailabilityCode {
    fn from(entry: CodeEntry) -> Self {
        match entry {
            CodeEntry::Bare(code) => AvailabilityCode(code),
            CodeEntry::Entry { availability } => AvailabilityCode(availability),
        }
    }
}

impl CodeList {
    fn into_codes(self) -> Vec<AvailabilityCode> {
        match self {
            CodeList::Many(entries) => entries.into_iter().map(Into::into).collect(),
            CodeList::One(entry) => vec![entry.into()],
        }
    }
}

fn decode_keyed(raw: HashMap<String, CodeList>) -> Option<BTreeMap<i64, Vec<AvailabilityCode>>> {
    raw.into_iter()
        .map(|(key, list)| {
            let id = key.trim().parse::<i64>().ok()?;
            Some((id, list.into_codes()))
        })
        .collect()
}

impl ProbeOutcome {
    /// Decode a map availability payload, failing closed on any shape mismatch.
    ///
    /// A non-empty `resourceAvailabilities` object marks a leaf; otherwise a
    /// `mapLinkAvailabilities` object (possibly empty) marks an internal node.
    pub fn decode(payload: Option<Value>) -> Self {
        let Some(payload) = payload else {
            return Self::Unknown;
        };

        let raw: RawMapAvailability = match serde_json::from_value(payload) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Map availability payload did not decode: {}", e);
                return Self::Unknown;
            }
        };

        if let Some(resources) = raw.resource_availabilities.filter(|r| !r.is_empty()) {
            return match decode_keyed(resources) {
                Some(resources) => Self::Resources(ResourceProbe { resources }),
                None => {
                    warn!("Resource availability keyed by a non-numeric id");
                    Self::Unknown
                }
            };
        }

        match raw.map_link_availabilities {
            Some(links) => match decode_keyed(links) {
                Some(children) => Self::Map(MapProbe {
                    children: children
                        .into_iter()
                        .map(|(id, codes)| (id, AvailabilityCode::summarize(&codes)))
                        .collect(),
                }),
                None => {
                    warn!("Map link availability keyed by a non-numeric id");
                    Self::Unknown
                }
            },
            None => Self::Unknown,
        }
    }
}

/// Decode a per-day availability array; `None` unless every entry carries a code
pub fn decode_daily(payload: Option<Value>) -> Option<Vec<AvailabilityCode>> {
    let entries: Vec<CodeEntry> = serde_json::from_value(payload?).ok()?;
    Some(entries.into_iter().map(Into::into).collect())
}

/// Localized text of a resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceText {
    /// Culture code of this entry
    #[serde(default)]
    pub culture_name: Option<String>,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
}

/// Attribute reference carried by a resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinedAttribute {
    /// Attribute definition referenced
    pub attribute_definition_id: i64,
    /// Raw enumerated values
    #[serde(default)]
    pub values: Vec<Value>,
}

/// One entry of a location's resource detail list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetail {
    /// Category id, resolved through the category table
    #[serde(default)]
    pub resource_category_id: Option<i64>,
    /// Localized name and description
    #[serde(default)]
    pub localized_values: Vec<ResourceText>,
    /// Maximum number of people
    #[serde(default)]
    pub max_capacity: Option<i64>,
    /// Maximum stay in nights
    #[serde(default)]
    pub max_stay: Option<i64>,
    /// Photo list, kept verbatim
    #[serde(default)]
    pub photos: Value,
    /// Attribute references
    #[serde(default)]
    pub defined_attributes: Vec<DefinedAttribute>,
}

impl ResourceDetail {
    /// Text for `locale`, falling back to the first entry
    pub fn text(&self, locale: &str) -> ResourceText {
        self.localized_values
            .iter()
            .find(|t| t.culture_name.as_deref() == Some(locale))
            .or_else(|| self.localized_values.first())
            .cloned()
            .unwrap_or_default()
    }
}

/// Decode a location's resource detail list keyed by resource id.
///
/// Entries that do not decode are dropped individually; a payload that is not
/// an object is `None`.
pub fn decode_resource_details(payload: Option<Value>) -> Option<BTreeMap<ResourceId, ResourceDetail>> {
    let Value::Object(entries) = payload? else {
        return None;
    };

    let mut details = BTreeMap::new();
    for (key, value) in entries {
        let Ok(id) = key.trim().parse::<ResourceId>() else {
            warn!("Skipping resource detail with key '{}'", key);
            continue;
        };
        match serde_json::from_value::<ResourceDetail>(value) {
            Ok(detail) => {
                details.insert(id, detail);
            }
            Err(e) => warn!("Skipping resource detail {}: {}", id, e),
        }
    }

    Some(details)
}

/// A resource location entry from the location list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocation {
    /// Location id
    pub resource_location_id: LocationId,
    /// Root map node of the location
    #[serde(default, alias = "mapId")]
    pub root_map_id: Option<MapId>,
    /// Localized names
    #[serde(default)]
    pub localized_values: Vec<RemoteLocationName>,
}

/// Localized names of a location
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocationName {
    /// Culture code
    #[serde(default)]
    pub culture_name: Option<String>,
    /// Short name
    #[serde(default)]
    pub short_name: String,
    /// Full name
    #[serde(default)]
    pub full_name: String,
}

/// A resource category entry from the category list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCategory {
    /// Category id
    #[serde(alias = "resourceCategoryId")]
    pub id: i64,
    /// Localized names
    #[serde(default)]
    pub localized_values: Vec<ResourceText>,
}

/// Decode a JSON array, dropping entries that do not match `T`
pub fn decode_list<T: for<'de> Deserialize<'de>>(payload: Option<Value>) -> Option<Vec<T>> {
    let Value::Array(items) = payload? else {
        return None;
    };

    Some(
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_codes() {
        let c = AvailabilityCode;
        assert_eq!(AvailabilityCode::summarize(&[c(0), c(0)]), c(0));
        assert_eq!(AvailabilityCode::summarize(&[c(1), c(0)]), c(7));
        assert_eq!(AvailabilityCode::summarize(&[c(1), c(7)]), c(7));
        assert_eq!(AvailabilityCode::summarize(&[c(5), c(1)]), c(5));
        assert_eq!(AvailabilityCode::summarize(&[]), c(1));
    }

    #[test]
    fn test_open_depends_on_partial_policy() {
        let partial = AvailabilityCode::PARTIAL;
        assert!(!partial.is_open(PartialDayPolicy::Gap));
        assert!(partial.is_open(PartialDayPolicy::Available));
        assert!(AvailabilityCode(0).is_open(PartialDayPolicy::Gap));
        assert!(!AvailabilityCode(1).is_open(PartialDayPolicy::Available));
    }

    #[test]
    fn test_decode_internal_node() {
        let outcome = ProbeOutcome::decode(Some(json!({
            "mapId": -2147483590,
            "mapAvailabilities": [0],
            "resourceAvailabilities": {},
            "mapLinkAvailabilities": {"-2147483400": [0], "-2147483399": [1], "-2147483398": 7}
        })));

        let ProbeOutcome::Map(map) = outcome else {
            panic!("expected internal node, got {:?}", outcome);
        };
        assert_eq!(map.children.len(), 3);
        assert_eq!(map.children[&-2147483400], AvailabilityCode(0));
        assert_eq!(map.children[&-2147483399], AvailabilityCode(1));
        assert_eq!(map.children[&-2147483398], AvailabilityCode(7));
    }

    #[test]
    fn test_decode_leaf_node() {
        let outcome = ProbeOutcome::decode(Some(json!({
            "resourceAvailabilities": {
                "101": [{"availability": 0, "remainingQuota": null}],
                "102": [{"availability": 1}]
            },
            "mapLinkAvailabilities": {}
        })));

        let ProbeOutcome::Resources(leaf) = outcome else {
            panic!("expected leaf node, got {:?}", outcome);
        };
        assert_eq!(leaf.code_for(101), AvailabilityCode(0));
        assert_eq!(leaf.code_for(102), AvailabilityCode(1));
        assert_eq!(leaf.code_for(999), AvailabilityCode::UNAVAILABLE);
    }

    #[test]
    fn test_decode_fails_closed() {
        assert_eq!(ProbeOutcome::decode(None), ProbeOutcome::Unknown);
        assert_eq!(ProbeOutcome::decode(Some(json!([1, 2]))), ProbeOutcome::Unknown);
        assert_eq!(
            ProbeOutcome::decode(Some(json!({"message": "Too many requests"}))),
            ProbeOutcome::Unknown
        );
        assert_eq!(
            ProbeOutcome::decode(Some(json!({"mapLinkAvailabilities": {"abc": [0]}}))),
            ProbeOutcome::Unknown
        );
        assert_eq!(
            ProbeOutcome::decode(Some(json!({"mapLinkAvailabilities": {"1": ["open"]}}))),
            ProbeOutcome::Unknown
        );
    }

    #[test]
    fn test_decode_empty_internal_node() {
        let outcome = ProbeOutcome::decode(Some(json!({
            "resourceAvailabilities": {},
            "mapLinkAvailabilities": {}
        })));
        assert_eq!(outcome, ProbeOutcome::Map(MapProbe::default()));
    }

    #[test]
    fn test_decode_daily() {
        let codes = decode_daily(Some(json!([
            {"availability": 0, "remainingQuota": null},
            {"availability": 1},
            {"availability": 7}
        ])))
        .unwrap();
        assert_eq!(codes, vec![AvailabilityCode(0), AvailabilityCode(1), AvailabilityCode(7)]);

        assert!(decode_daily(Some(json!({"availability": 0}))).is_none());
        assert!(decode_daily(Some(json!([{"status": "open"}]))).is_none());
        assert!(decode_daily(None).is_none());
    }

    #[test]
    fn test_decode_resource_details_skips_bad_entries() {
        let details = decode_resource_details(Some(json!({
            "101": {
                "resourceCategoryId": -2147483648,
                "localizedValues": [{"cultureName": "en-CA", "name": "Site 12", "description": "Pull-through"}],
                "maxCapacity": 6,
                "maxStay": 14,
                "photos": [],
                "definedAttributes": [{"attributeDefinitionId": -32756, "values": [1]}]
            },
            "oops": {},
            "103": {"localizedValues": "not a list"}
        })))
        .unwrap();

        assert_eq!(details.len(), 1);
        let site = &details[&101];
        assert_eq!(site.text("en-CA").name, "Site 12");
        assert_eq!(site.text("fr-CA").description, "Pull-through");
        assert_eq!(site.max_capacity, Some(6));
        assert_eq!(site.defined_attributes[0].attribute_definition_id, -32756);

        assert!(decode_resource_details(Some(json!([]))).is_none());
    }
}
