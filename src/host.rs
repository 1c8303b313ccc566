//! The host-object seam: how script code sees the datum being filtered.
//!
//! During execution a name that is not bound in the environment is read as
//! a field of the host object. This trait is the only channel between the
//! script and the datum; implementations are provided for `()` (no datum),
//! string-keyed maps, and `serde_json::Value` so a JSON document can be
//! filtered directly.

use std::collections::HashMap;

use crate::value::Value;

/// A datum whose fields scripts can read by name.
pub trait HostObject {
    /// Field lookup. Implementations should fall back to a
    /// case-insensitive match so `name` finds `Name`.
    fn field(&self, name: &str) -> Option<Value>;
}

impl HostObject for () {
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl HostObject for HashMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get(name) {
            return Some(value.clone());
        }
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

impl HostObject for serde_json::Value {
    fn field(&self, name: &str) -> Option<Value> {
        let object = self.as_object()?;
        if let Some(value) = object.get(name) {
            return Some(json_to_value(value));
        }
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| json_to_value(value))
    }
}

/// Convert a JSON document into a runtime value. Numbers that fit i64 stay
/// integral; objects have no script-side representation and inspect as
/// their JSON text.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(elements) => {
            Value::Array(elements.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(_) => Value::String(json.to_string()),
    }
}
