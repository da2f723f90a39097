//! Configuration rewrite helpers operating on the HCL tree.

use serde_json::{Map, Number as JsonNumber, Value};
use tfmigrate_hcl::{
    Attribute, Block, Body, Expression, Number, ObjectItem, ObjectKey, Structure, UnaryOp,
};

/// Meta-arguments Terraform accepts on every resource block.
pub const META_ARGUMENTS: &[&str] = &["count", "for_each", "provider", "depends_on"];

/// Meta-argument blocks Terraform accepts on every resource block.
pub const META_BLOCKS: &[&str] = &["lifecycle"];

/// Rename an attribute in place, keeping its position and comments.
///
/// Does nothing if `from` is absent or `to` already exists. Returns whether
/// the attribute was renamed.
pub fn rename_attribute(body: &mut Body, from: &str, to: &str) -> bool {
    if body.has_attribute(to) {
        return false;
    }
    match body.get_attribute_mut(from) {
        Some(attr) => {
            attr.key = to.to_string();
            true
        }
        None => false,
    }
}

/// Remove an attribute if present.
pub fn remove_attribute(body: &mut Body, key: &str) -> Option<Attribute> {
    body.remove_attribute(key)
}

/// Remove several attributes, returning how many were present.
pub fn remove_attributes(body: &mut Body, keys: &[&str]) -> usize {
    keys.iter()
        .filter(|key| body.remove_attribute(key).is_some())
        .count()
}

/// Set an attribute only if it is not already present.
pub fn ensure_attribute(body: &mut Body, key: &str, value: Expression) -> bool {
    if body.has_attribute(key) {
        return false;
    }
    body.set_attribute(key, value);
    true
}

/// Set an attribute, replacing any existing value.
pub fn set_attribute(body: &mut Body, key: &str, value: Expression) {
    body.set_attribute(key, value);
}

/// Convert a body to an object expression.
///
/// Attributes become object items and nested blocks become nested objects;
/// repeated nested blocks of one type become a tuple of objects.
pub fn body_to_object(body: &Body) -> Expression {
    let mut items: Vec<ObjectItem> = Vec::new();
    for structure in &body.structures {
        match structure {
            Structure::Attribute(attr) => {
                let mut item = ObjectItem::named(attr.key.clone(), attr.value.clone());
                item.decor = attr.decor.clone();
                item.decor.blank_line_before &= !items.is_empty();
                items.push(item);
            }
            Structure::Block(block) => {
                if items
                    .iter()
                    .any(|item| item.key.as_str() == Some(block.ident.as_str()))
                {
                    continue;
                }
                let siblings: Vec<&Block> = body.blocks_of_type(&block.ident).collect();
                let value = if siblings.len() == 1 {
                    body_to_object(&block.body)
                } else {
                    Expression::tuple(siblings.iter().map(|b| body_to_object(&b.body)))
                };
                items.push(ObjectItem::named(block.ident.clone(), value));
            }
        }
    }
    Expression::Object(items)
}

/// Replace the first nested `name` block with an attribute holding an
/// object built from its body.
///
/// The attribute takes the block's position. Returns whether a block was
/// converted; an existing attribute of the same name is left alone.
pub fn block_to_attribute(body: &mut Body, name: &str) -> bool {
    if body.has_attribute(name) {
        return false;
    }
    let Some(index) = body
        .structures
        .iter()
        .position(|s| matches!(s, Structure::Block(b) if b.ident == name))
    else {
        return false;
    };
    if let Structure::Block(block) = &body.structures[index] {
        let mut attr = Attribute::new(name, body_to_object(&block.body));
        attr.decor = block.decor.clone();
        body.structures[index] = Structure::Attribute(attr);
    }
    true
}

/// Replace every nested `name` block with one attribute holding a tuple of
/// objects, at the position of the first block.
pub fn blocks_to_attribute(body: &mut Body, name: &str, attribute: &str) -> bool {
    let Some(first) = body
        .structures
        .iter()
        .position(|s| matches!(s, Structure::Block(b) if b.ident == name))
    else {
        return false;
    };

    let decor = body.structures[first].decor().clone();
    let objects: Vec<Expression> = body
        .blocks_of_type(name)
        .map(|b| body_to_object(&b.body))
        .collect();

    let mut index = 0;
    body.structures.retain(|s| {
        let keep = index == first || !matches!(s, Structure::Block(b) if b.ident == name);
        index += 1;
        keep
    });
    let mut attr = Attribute::new(attribute, Expression::tuple(objects));
    attr.decor = decor;
    body.structures[first] = Structure::Attribute(attr);
    true
}

/// Replace an object-valued attribute with a nested block of the same name.
///
/// Returns false when the attribute is absent or not an object constructor
/// with identifier keys.
pub fn attribute_to_block(body: &mut Body, name: &str) -> bool {
    let Some(index) = body
        .structures
        .iter()
        .position(|s| matches!(s, Structure::Attribute(a) if a.key == name))
    else {
        return false;
    };
    let Structure::Attribute(attr) = &body.structures[index] else {
        return false;
    };
    let Some(items) = attr.value.as_object() else {
        return false;
    };

    let mut block = Block::new(name);
    for item in items {
        let Some(key) = item.key.as_str() else {
            return false;
        };
        block.body.set_attribute(key, item.value.clone());
    }
    block.decor = attr.decor.clone();
    body.structures[index] = Structure::Block(block);
    true
}

/// What a derived resource block carries over from its source.
#[derive(Debug, Clone, Default)]
pub struct DeriveSpec {
    pub resource_type: String,
    pub name: String,
    /// Attributes copied unchanged.
    pub copy: Vec<String>,
    /// Attributes copied under a new name, as `(from, to)`.
    pub rename: Vec<(String, String)>,
    /// Attributes set to fixed values.
    pub set: Vec<(String, Expression)>,
    /// Copy `count`, `for_each`, `provider`, `depends_on` and `lifecycle`.
    pub copy_meta_arguments: bool,
}

impl DeriveSpec {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn copy(mut self, key: impl Into<String>) -> Self {
        self.copy.push(key.into());
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.push((from.into(), to.into()));
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.set.push((key.into(), value));
        self
    }

    pub fn with_meta_arguments(mut self) -> Self {
        self.copy_meta_arguments = true;
        self
    }
}

/// Build a new resource block from an existing one.
pub fn derive_block(source: &Block, spec: &DeriveSpec) -> Block {
    let mut block = Block::resource(&spec.resource_type, &spec.name);

    if spec.copy_meta_arguments {
        for key in ["count", "for_each", "provider"] {
            if let Some(value) = source.body.get(key) {
                block.body.set_attribute(key, value.clone());
            }
        }
    }
    for key in &spec.copy {
        if let Some(value) = source.body.get(key) {
            block.body.set_attribute(key.clone(), value.clone());
        }
    }
    for (from, to) in &spec.rename {
        if let Some(value) = source.body.get(from) {
            block.body.set_attribute(to.clone(), value.clone());
        }
    }
    for (key, value) in &spec.set {
        block.body.set_attribute(key.clone(), value.clone());
    }
    if spec.copy_meta_arguments {
        if let Some(value) = source.body.get("depends_on") {
            block.body.set_attribute("depends_on", value.clone());
        }
        for ident in META_BLOCKS {
            for nested in source.body.blocks_of_type(ident) {
                block.body.push_block(nested.clone());
            }
        }
    }
    block
}

/// Build a `moved { from = ... to = ... }` block.
pub fn moved_block(from: &[&str], to: &[&str]) -> Block {
    Block::new("moved")
        .with_attribute("from", Expression::reference(from))
        .with_attribute("to", Expression::reference(to))
}

/// `type.name` address of a resource block.
pub fn resource_address(block: &Block) -> Option<String> {
    Some(format!("{}.{}", block.resource_type()?, block.resource_name()?))
}

/// Convert a literal expression to JSON.
///
/// Returns `None` if any part of the expression is not a literal.
pub fn expression_to_json(expr: &Expression) -> Option<Value> {
    match expr {
        Expression::Null => Some(Value::Null),
        Expression::Bool(b) => Some(Value::Bool(*b)),
        Expression::Number(n) => number_to_json(n, false),
        Expression::Unary(UnaryOp::Neg, inner) => number_to_json(inner.as_number()?, true),
        Expression::Template(t) => t.as_literal().map(|s| Value::String(s.to_string())),
        Expression::Parenthesis(inner) => expression_to_json(inner),
        Expression::Tuple(items) => items
            .iter()
            .map(|item| expression_to_json(&item.value))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expression::Object(items) => {
            let mut map = Map::new();
            for item in items {
                map.insert(item.key.as_str()?.to_string(), expression_to_json(&item.value)?);
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

fn number_to_json(number: &Number, negate: bool) -> Option<Value> {
    if let Some(i) = number.as_i64() {
        return Some(Value::Number(JsonNumber::from(if negate { -i } else { i })));
    }
    let f = number.as_f64()?;
    JsonNumber::from_f64(if negate { -f } else { f }).map(Value::Number)
}

/// Convert a JSON value to a literal expression.
pub fn json_to_expression(value: &Value) -> Expression {
    match value {
        Value::Null => Expression::Null,
        Value::Bool(b) => Expression::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) if i < 0 => Expression::Unary(UnaryOp::Neg, Box::new(Expression::number(-i))),
            Some(i) => Expression::number(i),
            None => Expression::Number(Number::from_source(n.to_string())),
        },
        Value::String(s) => Expression::string(s.clone()),
        Value::Array(items) => Expression::tuple(items.iter().map(json_to_expression)),
        Value::Object(map) => Expression::Object(
            map.iter()
                .map(|(k, v)| ObjectItem::new(object_key(k), json_to_expression(v)))
                .collect(),
        ),
    }
}

fn object_key(key: &str) -> ObjectKey {
    let identifier = key
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if identifier {
        ObjectKey::Identifier(key.to_string())
    } else {
        ObjectKey::Expression(Expression::string(key))
    }
}

/// Normalize `"enabled"`/`"disabled"` string literals to booleans.
pub fn enabled_to_bool_expr(expr: Expression) -> Expression {
    match expr.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("enabled") => Expression::Bool(true),
        Some("disabled") => Expression::Bool(false),
        _ => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tfmigrate_hcl::{format_block, format_body, parse_body, parse_expression};

    fn first_block(source: &str) -> Block {
        parse_body(source)
            .unwrap()
            .blocks()
            .next()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_rename_attribute() {
        let mut block = first_block("resource \"a\" \"b\" {\n  value = \"x\" # keep\n  ttl   = 1\n}\n");
        assert!(rename_attribute(&mut block.body, "value", "content"));
        assert!(!rename_attribute(&mut block.body, "missing", "other"));
        assert_eq!(
            format_block(&block),
            "resource \"a\" \"b\" {\n  content = \"x\" # keep\n  ttl     = 1\n}\n"
        );
    }

    #[test]
    fn test_rename_attribute_target_exists() {
        let mut block = first_block("resource \"a\" \"b\" {\n  value   = \"x\"\n  content = \"y\"\n}\n");
        assert!(!rename_attribute(&mut block.body, "value", "content"));
        assert_eq!(block.body.get("content").and_then(Expression::as_str), Some("y"));
    }

    #[test]
    fn test_remove_and_ensure() {
        let mut block = first_block("resource \"a\" \"b\" {\n  hostname = \"x\"\n  allow_overwrite = true\n}\n");
        assert_eq!(remove_attributes(&mut block.body, &["hostname", "allow_overwrite", "none"]), 2);
        assert!(ensure_attribute(&mut block.body, "ttl", Expression::number(1)));
        assert!(!ensure_attribute(&mut block.body, "ttl", Expression::number(2)));
        assert_eq!(block.body.get("ttl").and_then(|e| e.as_number()).and_then(|n| n.as_i64()), Some(1));
    }

    #[test]
    fn test_block_to_attribute() {
        let mut block = first_block(
            "resource \"cloudflare_record\" \"srv\" {\n  name = \"_sip\"\n\n  data {\n    priority = 10\n    target   = \"sip.example.com\"\n  }\n}\n",
        );
        assert!(block_to_attribute(&mut block.body, "data"));
        assert_eq!(
            format_block(&block),
            "resource \"cloudflare_record\" \"srv\" {\n  name = \"_sip\"\n\n  data = {\n    priority = 10\n    target   = \"sip.example.com\"\n  }\n}\n"
        );
        assert!(!block_to_attribute(&mut block.body, "data"));
    }

    #[test]
    fn test_blocks_to_attribute() {
        let mut block = first_block(
            "resource \"cloudflare_list\" \"l\" {\n  kind = \"ip\"\n  item {\n    ip = \"1.1.1.1\"\n  }\n  item {\n    ip = \"2.2.2.2\"\n  }\n}\n",
        );
        assert!(blocks_to_attribute(&mut block.body, "item", "items"));
        assert_eq!(block.body.blocks().count(), 0);
        let items = expression_to_json(block.body.get("items").unwrap()).unwrap();
        assert_eq!(items, json!([{ "ip": "1.1.1.1" }, { "ip": "2.2.2.2" }]));
    }

    #[test]
    fn test_attribute_to_block() {
        let mut block = first_block("resource \"a\" \"b\" {\n  data = { x = 1 }\n}\n");
        assert!(attribute_to_block(&mut block.body, "data"));
        assert_eq!(format_block(&block), "resource \"a\" \"b\" {\n  data {\n    x = 1\n  }\n}\n");
    }

    #[test]
    fn test_derive_block() {
        let source = first_block(
            "resource \"cloudflare_tiered_cache\" \"main\" {\n  count      = 2\n  zone_id    = var.zone\n  cache_type = \"generic\"\n  depends_on = [cloudflare_zone.z]\n\n  lifecycle {\n    prevent_destroy = true\n  }\n}\n",
        );
        let spec = DeriveSpec::new("cloudflare_argo_tiered_caching", "main")
            .copy("zone_id")
            .rename("cache_type", "legacy")
            .set("value", Expression::string("on"))
            .with_meta_arguments();
        let derived = derive_block(&source, &spec);
        assert_eq!(
            format_block(&derived),
            "resource \"cloudflare_argo_tiered_caching\" \"main\" {\n  count      = 2\n  zone_id    = var.zone\n  legacy     = \"generic\"\n  value      = \"on\"\n  depends_on = [cloudflare_zone.z]\n\n  lifecycle {\n    prevent_destroy = true\n  }\n}\n"
        );
    }

    #[test]
    fn test_moved_block() {
        let mut body = Body::new();
        body.push_block(moved_block(
            &["cloudflare_tiered_cache", "main"],
            &["cloudflare_argo_tiered_caching", "main"],
        ));
        assert_eq!(
            format_body(&body),
            "moved {\n  from = cloudflare_tiered_cache.main\n  to   = cloudflare_argo_tiered_caching.main\n}\n"
        );
    }

    #[test]
    fn test_json_conversion() {
        let expr = parse_expression("{ a = 1, b = -2, c = [true, null, \"x\"], d = 1.5 }").unwrap();
        let value = expression_to_json(&expr).unwrap();
        assert_eq!(value, json!({ "a": 1, "b": -2, "c": [true, null, "x"], "d": 1.5 }));
        assert_eq!(expression_to_json(&json_to_expression(&value)), Some(value));

        let reference = parse_expression("{ a = var.x }").unwrap();
        assert_eq!(expression_to_json(&reference), None);
    }

    #[test]
    fn test_enabled_to_bool_expr() {
        assert_eq!(enabled_to_bool_expr(Expression::string("Enabled")), Expression::Bool(true));
        assert_eq!(enabled_to_bool_expr(Expression::string("disabled")), Expression::Bool(false));
        assert_eq!(enabled_to_bool_expr(Expression::string("on")), Expression::string("on"));
    }

    #[test]
    fn test_resource_address() {
        assert_eq!(resource_address(&Block::resource("a", "b")).as_deref(), Some("a.b"));
        assert_eq!(resource_address(&Block::new("moved")), None);
    }
}
