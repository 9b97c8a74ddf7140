//! Endpoint identity and cache/batch key derivation.

use reqwest::Method;
use serde_json::Value;
use std::fmt;

/// A (path, method) pair. One dispatcher exists per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub path: String,
    pub method: Method,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }

    /// `path_METHOD`
    pub fn batch_key(&self) -> String {
        batch_key(&self.path, &self.method)
    }

    /// `path_METHOD_<stable input>`
    pub fn cache_key(&self, input: &Value) -> String {
        cache_key(&self.path, &self.method, input)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

pub fn batch_key(path: &str, method: &Method) -> String {
    format!("{}_{}", path, method)
}

pub fn cache_key(path: &str, method: &Method, input: &Value) -> String {
    format!("{}_{}_{}", path, method, stable_serialize(input))
}

/// Deterministic JSON text for structurally equal values.
///
/// Object keys are emitted in sorted order at every depth, independent of how
/// the map was built.
pub fn stable_serialize(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // String serialization cannot fail.
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_stable(&map[k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_batch_key_format() {
        assert_eq!(batch_key("/users", &Method::GET), "/users_GET");
        assert_eq!(Endpoint::new("/users", Method::POST).batch_key(), "/users_POST");
    }

    #[test]
    fn test_cache_key_format() {
        let key = cache_key("/users", &Method::GET, &json!({"id": 1}));
        assert_eq!(key, r#"/users_GET_{"id":1}"#);
    }

    #[test]
    fn test_stable_serialize_ignores_insertion_order() {
        let mut a = Map::new();
        a.insert("zeta".into(), json!(1));
        a.insert("alpha".into(), json!({"y": [1, {"b": 2, "a": 1}], "x": null}));

        let mut b = Map::new();
        b.insert("alpha".into(), json!({"x": null, "y": [1, {"a": 1, "b": 2}]}));
        b.insert("zeta".into(), json!(1));

        let a = stable_serialize(&Value::Object(a));
        let b = stable_serialize(&Value::Object(b));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"alpha":{"x":null,"y":[1,{"a":1,"b":2}]},"zeta":1}"#);
    }

    #[test]
    fn test_stable_serialize_keeps_array_order() {
        assert_ne!(stable_serialize(&json!([1, 2])), stable_serialize(&json!([2, 1])));
    }

    #[test]
    fn test_stable_serialize_escapes_keys() {
        assert_eq!(stable_serialize(&json!({"a\"b": "c"})), r#"{"a\"b":"c"}"#);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("/items", Method::DELETE).to_string(), "DELETE /items");
    }
}
