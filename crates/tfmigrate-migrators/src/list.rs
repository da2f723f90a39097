//! `cloudflare_list`: inline `item` blocks become the `items` attribute.

use serde_json::{Map, Value};
use tfmigrate_core::primitives::{hcl, json as state};
use tfmigrate_core::{MigrationContext, Result, TransformResult, Transformer};
use tfmigrate_hcl::{
    rename_reference, Attribute, Block, Body, Expression, ForExpr, ObjectItem, Structure,
};
use tracing::{debug, warn};

pub const LIST_TYPE: &str = "cloudflare_list";

/// Redirect fields that took `"enabled"`/`"disabled"` in v4.
pub const REDIRECT_BOOLEANS: &[&str] = &[
    "include_subdomains",
    "subpath_matching",
    "preserve_query_string",
    "preserve_path_suffix",
];

/// Value kinds nested under a list item's `value`.
const VALUE_KINDS: &[&str] = &["ip", "asn", "hostname", "redirect"];

#[derive(Debug, Default, Clone, Copy)]
pub struct ListMigrator;

impl ListMigrator {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for ListMigrator {
    fn can_handle(&self, resource_type: &str) -> bool {
        resource_type == LIST_TYPE
    }

    fn resource_type(&self) -> &str {
        LIST_TYPE
    }

    fn transform_config(&self, _ctx: &MigrationContext, mut block: Block) -> Result<TransformResult> {
        let name = block.resource_name().unwrap_or_default().to_string();
        let body = &mut block.body;
        let Some(first) = body.structures.iter().position(is_item_block) else {
            return Ok(TransformResult::in_place(block));
        };
        if body.has_attribute("items") {
            warn!(resource = %name, "list sets both items and item blocks, leaving item blocks alone");
            return Ok(TransformResult::in_place(block));
        }

        let items = items_expression(body);
        let decor = body.structures[first].decor().clone();
        let mut index = 0;
        body.structures.retain(|s| {
            let keep = index == first || !is_item_block(s);
            index += 1;
            keep
        });
        let mut attr = Attribute::new("items", items);
        attr.decor = decor;
        body.structures[first] = Structure::Attribute(attr);

        debug!(resource = %name, "converted item blocks to items");
        Ok(TransformResult::in_place(block))
    }

    fn transform_state(&self, _ctx: &MigrationContext, mut instance: Value, _path: &str) -> Result<Value> {
        if let Some(attrs) = instance.get_mut("attributes") {
            if let Some(Value::Array(items)) = state::remove_field(attrs, "item") {
                if !items.is_empty() {
                    let flattened: Vec<Value> = items.into_iter().map(flatten_state_item).collect();
                    state::set(attrs, "num_items", Value::from(flattened.len()));
                    state::set(attrs, "items", Value::Array(flattened));
                }
            }
        }
        state::set_schema_version(&mut instance, 0);
        Ok(instance)
    }
}

fn is_item_block(structure: &Structure) -> bool {
    match structure {
        Structure::Block(b) => b.ident == "item" || (b.ident == "dynamic" && b.label(0) == Some("item")),
        Structure::Attribute(_) => false,
    }
}

enum Part {
    Static(Vec<Expression>),
    Dynamic(Expression),
}

/// Static items form a tuple; each `dynamic "item"` becomes a `for`
/// expression. Several parts are joined with `concat`.
fn items_expression(body: &Body) -> Expression {
    let mut parts: Vec<Part> = Vec::new();
    for block in body.blocks() {
        if block.ident == "item" {
            let object = item_object(&block.body);
            match parts.last_mut() {
                Some(Part::Static(objects)) => objects.push(object),
                _ => parts.push(Part::Static(vec![object])),
            }
        } else if block.ident == "dynamic" && block.label(0) == Some("item") {
            parts.push(Part::Dynamic(dynamic_items(&block.body)));
        }
    }

    let mut expressions: Vec<Expression> = parts
        .into_iter()
        .map(|part| match part {
            Part::Static(objects) => Expression::tuple(objects),
            Part::Dynamic(expr) => expr,
        })
        .collect();
    if expressions.len() == 1 {
        expressions.remove(0)
    } else {
        Expression::call("concat", expressions)
    }
}

fn dynamic_items(body: &Body) -> Expression {
    let iterator = body
        .get("iterator")
        .and_then(Expression::as_reference_path)
        .and_then(|path| match path.as_slice() {
            [name] => Some(name.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "item".to_string());
    let collection = body.get("for_each").cloned().unwrap_or_else(|| Expression::tuple(Vec::new()));

    let mut object = match body.blocks_of_type("content").next() {
        Some(content) => item_object(&content.body),
        None => Expression::Object(Vec::new()),
    };
    rename_reference(&mut object, &[iterator.as_str(), "key"], &["key"]);
    rename_reference(&mut object, &[iterator.as_str(), "value"], &["value"]);

    Expression::For(Box::new(ForExpr {
        key_var: Some("key".to_string()),
        value_var: "value".to_string(),
        collection,
        key_expr: None,
        value_expr: object,
        grouping: false,
        condition: None,
    }))
}

/// `item { value { ip = "..." } comment = "..." }` becomes
/// `{ ip = "...", comment = "..." }`.
fn item_object(body: &Body) -> Expression {
    let mut items: Vec<ObjectItem> = Vec::new();
    let value = body
        .blocks_of_type("value")
        .next()
        .map(|b| hcl::body_to_object(&b.body))
        .or_else(|| body.get("value").cloned());
    if let Some(Expression::Object(fields)) = value {
        items.extend(fields.into_iter().map(normalize_value_field));
    }
    for attr in body.attributes().filter(|a| a.key != "value") {
        items.push(ObjectItem::named(attr.key.clone(), attr.value.clone()));
    }
    Expression::Object(items)
}

fn normalize_value_field(mut item: ObjectItem) -> ObjectItem {
    if item.key.as_str() != Some("redirect") {
        return item;
    }
    if let Expression::Object(fields) = &mut item.value {
        for field in fields.iter_mut() {
            if field
                .key
                .as_str()
                .map_or(false, |k| REDIRECT_BOOLEANS.contains(&k))
            {
                field.value = hcl::enabled_to_bool_expr(field.value.clone());
            }
        }
    }
    item
}

/// `{ value = [{ ip = "..", asn = null, hostname = [] }], comment = ".." }`
/// becomes `{ ip = "..", comment = ".." }`.
fn flatten_state_item(item: Value) -> Value {
    let Value::Object(mut fields) = item else {
        return item;
    };
    let mut out = Map::new();
    let value = match fields.remove("value") {
        Some(Value::Array(values)) => values.into_iter().next(),
        other => other,
    };
    if let Some(Value::Object(value)) = value {
        for (key, field) in value {
            if !VALUE_KINDS.contains(&key.as_str()) {
                continue;
            }
            if let Some(field) = normalize_state_value(&key, field) {
                out.insert(key, field);
            }
        }
    }
    for (key, field) in fields {
        if !field.is_null() {
            out.insert(key, field);
        }
    }
    Value::Object(out)
}

fn normalize_state_value(key: &str, value: Value) -> Option<Value> {
    let mut value = match value {
        Value::Null => return None,
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    state::drop_nulls(&mut value);
    if key == "redirect" {
        for field in REDIRECT_BOOLEANS {
            state::coerce_field(&mut value, field, state::enabled_to_bool);
        }
    }
    Some(value)
}
