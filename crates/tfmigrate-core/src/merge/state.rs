//! State side of the cross-resource merge.

use super::rule::{FieldKind, MergeField, MergeRule};
use super::MergeOutcome;
use crate::error::{MigrationError, Result};
use crate::primitives::json::enabled_to_bool;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Position of an instance inside the `resources` array.
type InstanceRef = (usize, usize);

/// Fold item instances into their parent instance's collection attribute.
///
/// Matched item instances are removed; an item resource entry left without
/// instances is removed entirely. Unmatched items are kept.
pub fn merge_state(state: &mut Value, rule: &MergeRule) -> Result<MergeOutcome> {
    let mut outcome = MergeOutcome::default();
    let Some(resources) = state.get_mut("resources") else {
        return Ok(outcome);
    };
    let resources = resources
        .as_array_mut()
        .ok_or_else(|| MigrationError::state("resources is not an array").with_operation("merge"))?;

    let mut parents: Vec<(InstanceRef, Value)> = Vec::new();
    let mut items: Vec<(InstanceRef, Value)> = Vec::new();
    for (r, resource) in resources.iter().enumerate() {
        if resource.get("mode").and_then(Value::as_str).unwrap_or("managed") != "managed" {
            continue;
        }
        let resource_type = resource.get("type").and_then(Value::as_str).unwrap_or_default();
        let (collection, key) = if resource_type == rule.parent_type {
            (&mut parents, &rule.parent_id_attribute)
        } else if resource_type == rule.item_type {
            (&mut items, &rule.parent_ref_attribute)
        } else {
            continue;
        };
        for (i, instance) in instances(resource).iter().enumerate() {
            if let Some(value) = attribute(instance, key) {
                collection.push(((r, i), value.clone()));
            }
        }
    }

    let mut matched: BTreeSet<InstanceRef> = BTreeSet::new();
    for ((r, i), id) in &parents {
        let members: Vec<InstanceRef> = items
            .iter()
            .filter(|(_, reference)| reference == id)
            .map(|(position, _)| *position)
            .collect();
        if members.is_empty() {
            continue;
        }

        let kind = rule
            .kind_attribute
            .as_deref()
            .and_then(|k| attribute(&instances(&resources[*r])[*i], k))
            .and_then(Value::as_str)
            .map(str::to_string);
        let payloads: Vec<Value> = members
            .iter()
            .filter_map(|(ir, ii)| instances(&resources[*ir]).get(*ii))
            .map(|instance| item_payload(rule, kind.as_deref(), instance))
            .collect();

        let Some(attrs) = resources[*r]
            .get_mut("instances")
            .and_then(|v| v.get_mut(*i))
            .and_then(|v| v.get_mut("attributes"))
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        let target = attrs
            .entry(rule.target_attribute.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        let mut total = 0;
        if let Value::Array(collection) = target {
            collection.extend(payloads);
            total = collection.len();
        }
        if let Some(count) = &rule.count_attribute {
            attrs.insert(count.clone(), Value::from(total));
        }

        debug!(
            parent = %format!("{}[{}]", rule.parent_type, i),
            id = %id,
            items = members.len(),
            "merged item instances into parent"
        );
        outcome.merged += members.len();
        matched.extend(members);
    }

    for ((r, _), reference) in items.iter().filter(|(position, _)| !matched.contains(position)) {
        outcome.orphaned += 1;
        let name = resources[*r].get("name").and_then(Value::as_str).unwrap_or_default();
        warn!(
            item = %format!("{}.{}", rule.item_type, name),
            reference = %reference,
            "item instance references no {} in this state, leaving it in place",
            rule.parent_type
        );
    }

    remove_matched(resources, &matched);
    Ok(outcome)
}

fn instances(resource: &Value) -> &[Value] {
    resource
        .get("instances")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn attribute<'a>(instance: &'a Value, key: &str) -> Option<&'a Value> {
    instance
        .get("attributes")?
        .get(key)
        .filter(|v| !v.is_null())
}

/// Remove matched instances, then resource entries they left empty.
fn remove_matched(resources: &mut Vec<Value>, matched: &BTreeSet<InstanceRef>) {
    let touched: BTreeSet<usize> = matched.iter().map(|(r, _)| *r).collect();
    for &r in &touched {
        if let Some(list) = resources[r].get_mut("instances").and_then(Value::as_array_mut) {
            let mut index = 0;
            list.retain(|_| {
                let keep = !matched.contains(&(r, index));
                index += 1;
                keep
            });
        }
    }

    let mut index = 0;
    resources.retain(|resource| {
        let emptied = touched.contains(&index) && instances(resource).is_empty();
        index += 1;
        !emptied
    });
}

/// The payload an item instance contributes to its parent's collection.
fn item_payload(rule: &MergeRule, kind: Option<&str>, instance: &Value) -> Value {
    let fields: Vec<&MergeField> = rule.fields_for(kind).collect();
    match instance.get("attributes").and_then(Value::as_object) {
        Some(attrs) => Value::Object(select_fields(&fields, attrs)),
        None => Value::Object(Map::new()),
    }
}

fn select_fields(fields: &[&MergeField], attrs: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        let Some(value) = attrs.get(&field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let value = match &field.kind {
            FieldKind::Scalar => value.clone(),
            FieldKind::Boolean => enabled_to_bool(value),
            FieldKind::Object(nested) => {
                let object = match value {
                    Value::Array(items) => items.first().and_then(Value::as_object),
                    Value::Object(object) => Some(object),
                    _ => None,
                };
                let Some(object) = object else {
                    continue;
                };
                let nested: Vec<&MergeField> = nested.iter().collect();
                Value::Object(select_fields(&nested, object))
            }
        };
        out.insert(field.name.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rule() -> MergeRule {
        MergeRule::new("cloudflare_list_item", "cloudflare_list", "items")
            .with_parent_ref("list_id")
            .with_count("num_items")
            .with_kind("kind")
            .with_field(MergeField::scalar("ip").for_kind("ip"))
            .with_field(
                MergeField::object(
                    "redirect",
                    vec![
                        MergeField::scalar("source_url"),
                        MergeField::boolean("include_subdomains"),
                    ],
                )
                .for_kind("redirect"),
            )
            .with_field(MergeField::scalar("comment"))
    }

    fn item(name: &str, list_id: &str, attrs: Value) -> Value {
        let mut attributes = attrs;
        attributes["list_id"] = json!(list_id);
        json!({
            "mode": "managed",
            "type": "cloudflare_list_item",
            "name": name,
            "instances": [{ "schema_version": 1, "attributes": attributes }]
        })
    }

    #[test]
    fn test_items_merged_in_order() {
        let mut state = json!({
            "version": 4,
            "resources": [
                {
                    "mode": "managed",
                    "type": "cloudflare_list",
                    "name": "ips",
                    "instances": [{ "attributes": { "id": "L1", "kind": "ip", "num_items": 0 } }]
                },
                item("a", "L1", json!({ "ip": "1.1.1.1", "comment": null, "asn": null })),
                item("b", "L1", json!({ "ip": "2.2.2.2", "comment": "second" })),
                item("c", "L2", json!({ "ip": "3.3.3.3" }))
            ]
        });

        let outcome = merge_state(&mut state, &rule()).unwrap();
        assert_eq!(outcome.merged, 2);
        assert_eq!(outcome.orphaned, 1);

        let resources = state["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(
            resources[0]["instances"][0]["attributes"],
            json!({
                "id": "L1",
                "kind": "ip",
                "num_items": 2,
                "items": [{ "ip": "1.1.1.1" }, { "ip": "2.2.2.2", "comment": "second" }]
            })
        );
        assert_eq!(resources[1]["name"], json!("c"));
    }

    #[test]
    fn test_redirect_payload_normalized() {
        let mut state = json!({
            "resources": [
                {
                    "type": "cloudflare_list",
                    "name": "r",
                    "instances": [{ "attributes": { "id": "L1", "kind": "redirect" } }]
                },
                item("x", "L1", json!({
                    "ip": null,
                    "redirect": [{ "source_url": "a.com/x", "include_subdomains": "enabled", "extra": 1 }]
                }))
            ]
        });

        merge_state(&mut state, &rule()).unwrap();
        assert_eq!(
            state["resources"][0]["instances"][0]["attributes"]["items"],
            json!([{ "redirect": { "source_url": "a.com/x", "include_subdomains": true } }])
        );
        assert_eq!(state["resources"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_no_items_is_noop() {
        let original = json!({
            "resources": [{
                "type": "cloudflare_list",
                "name": "ips",
                "instances": [{ "attributes": { "id": "L1", "kind": "ip" } }]
            }]
        });
        let mut state = original.clone();
        let outcome = merge_state(&mut state, &rule()).unwrap();
        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(state, original);
    }

    #[test]
    fn test_resources_not_array() {
        let mut state = json!({ "resources": {} });
        assert!(merge_state(&mut state, &rule()).is_err());
    }
}
