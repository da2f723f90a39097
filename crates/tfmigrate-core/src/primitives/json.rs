//! State rewrite helpers operating on instance JSON.
//!
//! Paths are dotted: `attributes.data.0.target`. Numeric segments index into
//! arrays.

use serde_json::{Map, Number, Value};
use tracing::warn;

/// Resolve a dotted path.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Resolve a dotted path mutably.
pub fn get_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Set the value at a dotted path, creating intermediate objects.
///
/// Returns false when an intermediate segment exists but is not a container.
pub fn set(value: &mut Value, path: &str, new_value: Value) -> bool {
    let (parent_path, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };

    let mut current = value;
    if !parent_path.is_empty() {
        for segment in parent_path.split('.') {
            current = match current {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    Some(item) => item,
                    None => return false,
                },
                _ => return false,
            };
        }
    }

    match current {
        Value::Object(map) => {
            map.insert(key.to_string(), new_value);
            true
        }
        Value::Array(items) => match key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Delete the value at a dotted path, returning it.
pub fn delete(value: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };
    match get_mut(value, parent_path)? {
        Value::Object(map) => map.remove(key),
        Value::Array(items) => {
            let index = key.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Rename a field of an object, keeping its position. Does nothing when the
/// source is absent or the target already exists.
pub fn rename_field(attrs: &mut Value, from: &str, to: &str) -> bool {
    let Value::Object(map) = attrs else {
        return false;
    };
    if !map.contains_key(from) || map.contains_key(to) {
        return false;
    }
    let renamed: Map<String, Value> = std::mem::take(map)
        .into_iter()
        .map(|(k, v)| if k == from { (to.to_string(), v) } else { (k, v) })
        .collect();
    *map = renamed;
    true
}

/// Remove a field of an object.
pub fn remove_field(attrs: &mut Value, key: &str) -> Option<Value> {
    attrs.as_object_mut()?.remove(key)
}

/// Remove several fields, returning how many were present.
pub fn remove_fields(attrs: &mut Value, keys: &[&str]) -> usize {
    keys.iter()
        .filter(|key| remove_field(attrs, key).is_some())
        .count()
}

/// Set a field when it is absent or null.
pub fn ensure_field(attrs: &mut Value, key: &str, default: Value) -> bool {
    let Value::Object(map) = attrs else {
        return false;
    };
    match map.get(key) {
        Some(existing) if !existing.is_null() => false,
        _ => {
            map.insert(key.to_string(), default);
            true
        }
    }
}

/// Stamp the `schema_version` of a state instance.
pub fn set_schema_version(instance: &mut Value, version: u64) {
    if let Value::Object(map) = instance {
        map.insert("schema_version".to_string(), Value::from(version));
    }
}

/// Apply a coercion to a field in place. Returns whether the value changed.
pub fn coerce_field(attrs: &mut Value, key: &str, coerce: fn(&Value) -> Value) -> bool {
    let Some(slot) = attrs.as_object_mut().and_then(|map| map.get_mut(key)) else {
        return false;
    };
    let coerced = coerce(slot);
    if coerced == *slot {
        return false;
    }
    *slot = coerced;
    true
}

/// What to do when a MaxItems:1 array is empty or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyMode {
    /// Remove the field.
    #[default]
    DeleteIfEmpty,
    /// Replace it with an empty object (after applying defaults).
    EnsureObject,
}

/// Per-field policy for [`array_to_object`].
#[derive(Debug, Clone, Default)]
pub struct ArrayToObjectOptions {
    /// Fields dropped from the object.
    pub skip: Vec<String>,
    /// Fields renamed, as `(from, to)`.
    pub rename: Vec<(String, String)>,
    /// Fields rewritten by a function.
    pub transform: Vec<(String, fn(&Value) -> Value)>,
    /// Fields set when absent or null.
    pub defaults: Vec<(String, Value)>,
    pub mode: EmptyMode,
}

impl ArrayToObjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, key: impl Into<String>) -> Self {
        self.skip.push(key.into());
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.push((from.into(), to.into()));
        self
    }

    pub fn transform(mut self, key: impl Into<String>, f: fn(&Value) -> Value) -> Self {
        self.transform.push((key.into(), f));
        self
    }

    pub fn default_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.push((key.into(), value));
        self
    }

    pub fn ensure_object(mut self) -> Self {
        self.mode = EmptyMode::EnsureObject;
        self
    }

    fn apply(&self, mut object: Map<String, Value>) -> Map<String, Value> {
        for key in &self.skip {
            object.remove(key);
        }
        let mut object: Map<String, Value> = object
            .into_iter()
            .map(|(k, v)| {
                match self.rename.iter().find(|(from, _)| *from == k) {
                    Some((_, to)) => (to.clone(), v),
                    None => (k, v),
                }
            })
            .collect();
        for (key, f) in &self.transform {
            if let Some(slot) = object.get_mut(key) {
                *slot = f(slot);
            }
        }
        for (key, value) in &self.defaults {
            if object.get(key).map_or(true, Value::is_null) {
                object.insert(key.clone(), value.clone());
            }
        }
        object
    }
}

/// Convert a MaxItems:1 array field to an object.
///
/// A one-element array holding an object becomes that object with the
/// policies applied. An empty array, null or missing field is removed, or
/// replaced by an object in [`EmptyMode::EnsureObject`]. A field that is
/// already an object is normalized with the same policies. Any other value,
/// such as an array of several elements or a scalar, is left as it is.
/// Returns whether anything changed.
pub fn array_to_object(attrs: &mut Value, field: &str, options: &ArrayToObjectOptions) -> bool {
    let Value::Object(map) = attrs else {
        return false;
    };

    let current = map.get(field).cloned().unwrap_or(Value::Null);
    let converted = match current {
        Value::Array(items) if items.is_empty() => None,
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => match items.remove(0) {
            Value::Object(first) => Some(options.apply(first)),
            _ => None,
        },
        Value::Object(object) => Some(options.apply(object)),
        Value::Null => None,
        other => {
            warn!(field, value = %other, "not a single-element array, leaving it unconverted");
            return false;
        }
    };

    let replacement = match (converted, options.mode) {
        (Some(object), _) => Some(Value::Object(object)),
        (None, EmptyMode::EnsureObject) => Some(Value::Object(options.apply(Map::new()))),
        (None, EmptyMode::DeleteIfEmpty) => None,
    };

    let before = map.get(field).cloned();
    match replacement {
        Some(value) => {
            map.insert(field.to_string(), value);
        }
        None => {
            map.remove(field);
        }
    }
    map.get(field) != before.as_ref()
}

/// Wrap an object field in a one-element array. Null becomes an empty array.
pub fn object_to_array(attrs: &mut Value, field: &str) -> bool {
    let Some(slot) = attrs.as_object_mut().and_then(|map| map.get_mut(field)) else {
        return false;
    };
    match slot {
        Value::Object(_) => {
            let object = slot.take();
            *slot = Value::Array(vec![object]);
            true
        }
        Value::Null => {
            *slot = Value::Array(Vec::new());
            true
        }
        _ => false,
    }
}

/// Coerce a string or float holding an integer to an integer.
pub fn coerce_int(value: &Value) -> Value {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        Value::Number(n) if n.as_i64().is_none() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Coerce a string or integer to a JSON float.
///
/// Integral values keep integer notation so `1` stays `1` rather than
/// `1.0`.
pub fn coerce_float(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => float_value(f),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Convert a duration string like `"1h30m"`, `"45s"` or `"500ms"` to whole
/// seconds. Plain numeric strings are taken as seconds.
pub fn duration_to_seconds(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    parse_duration(s.trim())
        .map(|seconds| float_value(seconds.floor()))
        .unwrap_or_else(|| value.clone())
}

fn parse_duration(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return Some(seconds);
    }

    let mut total = 0.0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 0.001,
            "us" | "µs" => 0.000_001,
            "ns" => 0.000_000_001,
            _ => return None,
        };
        total += amount * scale;
        rest = &rest[unit_len..];
    }
    Some(total)
}

/// Convert `"enabled"`/`"disabled"` (any case) to a boolean.
pub fn enabled_to_bool(value: &Value) -> Value {
    match value.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("enabled") => Value::Bool(true),
        Some("disabled") => Value::Bool(false),
        _ => value.clone(),
    }
}

/// Drop null-valued fields of an object, recursively.
pub fn drop_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_path_access() {
        let mut value = json!({ "attributes": { "data": [{ "target": "x" }] } });
        assert_eq!(get(&value, "attributes.data.0.target"), Some(&json!("x")));
        assert_eq!(get(&value, "attributes.data.1"), None);

        assert!(set(&mut value, "attributes.data.0.weight", json!(5)));
        assert!(set(&mut value, "attributes.meta.owner", json!("ops")));
        assert!(!set(&mut value, "attributes.data.0.target.deep", json!(1)));
        assert_eq!(get(&value, "attributes.meta.owner"), Some(&json!("ops")));

        assert_eq!(delete(&mut value, "attributes.data.0.weight"), Some(json!(5)));
        assert_eq!(delete(&mut value, "attributes.missing"), None);
    }

    #[test]
    fn test_rename_field_keeps_order() {
        let mut attrs = json!({ "name": "a", "value": "1.2.3.4", "ttl": 1 });
        assert!(rename_field(&mut attrs, "value", "content"));
        let keys: Vec<_> = attrs.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "content", "ttl"]);

        assert!(!rename_field(&mut attrs, "missing", "other"));
    }

    #[test]
    fn test_ensure_field() {
        let mut attrs = json!({ "ttl": null, "priority": 10 });
        assert!(ensure_field(&mut attrs, "ttl", json!(1)));
        assert!(!ensure_field(&mut attrs, "priority", json!(0)));
        assert_eq!(attrs, json!({ "ttl": 1, "priority": 10 }));
    }

    #[test]
    fn test_array_to_object() {
        let mut attrs = json!({ "data": [{ "priority": "10", "legacy": true, "old": "x" }] });
        let options = ArrayToObjectOptions::new()
            .skip("legacy")
            .rename("old", "new")
            .transform("priority", coerce_int)
            .default_value("weight", json!(0));
        assert!(array_to_object(&mut attrs, "data", &options));
        assert_eq!(attrs, json!({ "data": { "priority": 10, "new": "x", "weight": 0 } }));
    }

    #[test]
    fn test_array_to_object_empty() {
        let mut attrs = json!({ "data": [] });
        assert!(array_to_object(&mut attrs, "data", &ArrayToObjectOptions::new()));
        assert_eq!(attrs, json!({}));

        let mut attrs = json!({ "data": null });
        let options = ArrayToObjectOptions::new().ensure_object();
        assert!(array_to_object(&mut attrs, "data", &options));
        assert_eq!(attrs, json!({ "data": {} }));

        let mut attrs = json!({});
        assert!(!array_to_object(&mut attrs, "data", &ArrayToObjectOptions::new()));
    }

    #[test]
    fn test_array_to_object_leaves_other_shapes() {
        for value in [
            json!([{ "x": 1 }, { "x": 2 }]),
            json!(["a"]),
            json!("scalar"),
            json!(3),
        ] {
            let mut attrs = json!({ "data": value.clone() });
            assert!(!array_to_object(&mut attrs, "data", &ArrayToObjectOptions::new().ensure_object()));
            assert_eq!(attrs, json!({ "data": value }));
        }
    }

    #[test]
    fn test_object_to_array() {
        let mut attrs = json!({ "data": { "a": 1 }, "empty": null });
        assert!(object_to_array(&mut attrs, "data"));
        assert!(object_to_array(&mut attrs, "empty"));
        assert_eq!(attrs, json!({ "data": [{ "a": 1 }], "empty": [] }));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(coerce_int(&json!("42")), json!(42));
        assert_eq!(coerce_int(&json!(3.0)), json!(3));
        assert_eq!(coerce_int(&json!("abc")), json!("abc"));

        assert_eq!(coerce_float(&json!("300")), json!(300));
        assert_eq!(coerce_float(&json!("0.5")), json!(0.5));
        assert_eq!(coerce_float(&json!(true)), json!(true));

        assert_eq!(duration_to_seconds(&json!("1h30m")), json!(5400));
        assert_eq!(duration_to_seconds(&json!("45s")), json!(45));
        assert_eq!(duration_to_seconds(&json!("1500ms")), json!(1));
        assert_eq!(duration_to_seconds(&json!("soon")), json!("soon"));

        assert_eq!(enabled_to_bool(&json!("ENABLED")), json!(true));
        assert_eq!(enabled_to_bool(&json!("disabled")), json!(false));
        assert_eq!(enabled_to_bool(&json!("on")), json!("on"));
    }

    #[test]
    fn test_coerce_field() {
        let mut attrs = json!({ "ttl": "300", "priority": 10 });
        assert!(coerce_field(&mut attrs, "ttl", coerce_float));
        assert!(!coerce_field(&mut attrs, "priority", coerce_float));
        assert!(!coerce_field(&mut attrs, "missing", coerce_float));
        assert_eq!(attrs, json!({ "ttl": 300, "priority": 10 }));
    }

    #[test]
    fn test_drop_nulls() {
        let mut value = json!({ "a": null, "b": { "c": null, "d": 1 }, "e": [{ "f": null }] });
        drop_nulls(&mut value);
        assert_eq!(value, json!({ "b": { "d": 1 }, "e": [{}] }));
    }
}
