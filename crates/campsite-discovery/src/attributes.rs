use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::probe::DefinedAttribute;
use crate::types::{Attribute, AttributeDefinition, LocalizedName};

/// Resolve a resource's attribute references into display pairs.
///
/// References to unknown definitions are dropped. Enumerated attributes list
/// the names of the referenced values joined by `", "`; numeric attributes
/// render their bounds.
pub fn resolve_attributes(
    defined: &[DefinedAttribute],
    definitions: &BTreeMap<i64, AttributeDefinition>,
    locale: &str,
) -> Vec<Attribute> {
    defined
        .iter()
        .filter_map(|reference| {
            let Some(definition) = definitions.get(&reference.attribute_definition_id) else {
                debug!(
                    "No definition cached for attribute {}",
                    reference.attribute_definition_id
                );
                return None;
            };

            let value = if definition.values.is_empty() {
                format!(
                    "[Min : {} - Max : {}]",
                    render(&definition.min_value),
                    render(&definition.max_value)
                )
            } else {
                reference
                    .values
                    .iter()
                    .filter_map(|raw| {
                        definition
                            .values
                            .iter()
                            .find(|candidate| same_value(&candidate.enum_value, raw))
                            .map(|candidate| localized(&candidate.localized_values, locale))
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };

            Some(Attribute {
                attribute: localized(&definition.localized_values, locale),
                value,
            })
        })
        .collect()
}

/// Display name for `locale`, falling back to the first entry
pub fn localized(names: &[LocalizedName], locale: &str) -> String {
    names
        .iter()
        .find(|n| n.culture_name == locale)
        .or_else(|| names.first())
        .map(|n| n.display_name.clone())
        .unwrap_or_default()
}

// Enum values arrive as numbers on definitions and sometimes as strings on resources.
fn same_value(a: &Value, b: &Value) -> bool {
    plain(a) == plain(b)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render(bound: &Option<Value>) -> String {
    match bound {
        None | Some(Value::Null) => "-".to_string(),
        Some(value) => plain(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definitions() -> BTreeMap<i64, AttributeDefinition> {
        let defs: Vec<AttributeDefinition> = serde_json::from_value(json!([
            {
                "attributeDefinitionId": -32756,
                "localizedValues": [
                    {"cultureName": "en-CA", "displayName": "Service Type"},
                    {"cultureName": "fr-CA", "displayName": "Type de service"}
                ],
                "values": [
                    {"enumValue": 1, "localizedValues": [{"cultureName": "en-CA", "displayName": "Unserviced"}]},
                    {"enumValue": 2, "localizedValues": [{"cultureName": "en-CA", "displayName": "Electric"}]},
                    {"enumValue": 3, "localizedValues": [{"cultureName": "en-CA", "displayName": "Water"}]}
                ]
            },
            {
                "attributeDefinitionId": -32700,
                "localizedValues": [{"cultureName": "en-CA", "displayName": "Driveway Length"}],
                "minValue": 6,
                "maxValue": 18.5
            }
        ]))
        .unwrap();
        defs.into_iter()
            .map(|d| (d.attribute_definition_id, d))
            .collect()
    }

    fn reference(id: i64, values: Value) -> DefinedAttribute {
        serde_json::from_value(json!({"attributeDefinitionId": id, "values": values})).unwrap()
    }

    #[test]
    fn test_enumerated_values_join() {
        let resolved = resolve_attributes(
            &[reference(-32756, json!([2, "3", 9]))],
            &definitions(),
            "en-CA",
        );
        assert_eq!(
            resolved,
            vec![Attribute {
                attribute: "Service Type".to_string(),
                value: "Electric, Water".to_string(),
            }]
        );
    }

    #[test]
    fn test_numeric_range_and_unknown_definition() {
        let resolved = resolve_attributes(
            &[reference(-32700, json!([])), reference(-1, json!([1]))],
            &definitions(),
            "en-CA",
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].attribute, "Driveway Length");
        assert_eq!(resolved[0].value, "[Min : 6 - Max : 18.5]");
    }

    #[test]
    fn test_locale_selection() {
        let resolved = resolve_attributes(&[reference(-32756, json!([1]))], &definitions(), "fr-CA");
        assert_eq!(resolved[0].attribute, "Type de service");
        assert_eq!(resolved[0].value, "Unserviced");
    }
}
