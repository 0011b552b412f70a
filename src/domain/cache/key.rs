//! Cache key derivation

use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::domain::DomainError;

/// Separator between a namespace and the rest of the key
pub const NAMESPACE_SEPARATOR: char = ':';

/// Opaque cache key: `<namespace>:<stableJSON(descriptor)>:<stableJSON(options)>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the string representation of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key belongs to the given namespace
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.0.starts_with(&CacheKeyBuilder::namespace_prefix(namespace))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives deterministic keys from a namespace, a descriptor and options
///
/// Keys are not hashed or truncated, so distinct inputs never collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Derives the key for a read
    pub fn derive<D, O>(
        &self,
        namespace: &str,
        descriptor: &D,
        options: &O,
    ) -> Result<CacheKey, DomainError>
    where
        D: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        let descriptor = stable_json(descriptor)?;
        let options = stable_json(options)?;

        Ok(CacheKey(format!(
            "{}{}{}{}{}",
            namespace, NAMESPACE_SEPARATOR, descriptor, NAMESPACE_SEPARATOR, options
        )))
    }

    /// Prefix shared by every key of a namespace
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{}{}", namespace, NAMESPACE_SEPARATOR)
    }
}

/// Serializes a value to compact JSON with object keys sorted recursively
pub fn stable_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DomainError> {
    let value = serde_json::to_value(value)
        .map_err(|e| DomainError::serialization(format!("Failed to serialize key part: {}", e)))?;

    let mut out = String::new();
    write_stable(&value, &mut out)?;
    Ok(out)
}

fn write_stable(value: &Value, out: &mut String) -> Result<(), DomainError> {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&String, &Value)> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (field, nested)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode(field)?);
                out.push(':');
                write_stable(nested, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out)?;
            }
            out.push(']');
        }
        Value::Number(number) => out.push_str(&format_number(number)),
        scalar => out.push_str(&encode(scalar)?),
    }

    Ok(())
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, DomainError> {
    serde_json::to_string(value)
        .map_err(|e| DomainError::serialization(format!("Failed to encode key part: {}", e)))
}

// Integral floats print without a fraction, matching the JSON encoders that
// wrote existing keys.
fn format_number(number: &Number) -> String {
    match number.as_f64() {
        Some(f) if number.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => {
            format!("{}", f as i128)
        }
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    use crate::domain::query::{QueryOptions, ReadDescriptor};

    #[test]
    fn test_key_literal_format() {
        let builder = CacheKeyBuilder::new();

        let key = builder
            .derive("threads", &json!({"status": "open"}), &json!({"limit": 5}))
            .unwrap();

        assert_eq!(key.as_str(), r#"threads:{"status":"open"}:{"limit":5}"#);
    }

    #[test]
    fn test_nested_keys_are_sorted() {
        let key = CacheKeyBuilder::new()
            .derive(
                "posts",
                &json!({"z": 1, "a": {"y": [{"d": 1, "c": 2}], "b": null}}),
                &json!({}),
            )
            .unwrap();

        assert_eq!(
            key.as_str(),
            r#"posts:{"a":{"b":null,"y":[{"c":2,"d":1}]},"z":1}:{}"#
        );
    }

    #[test]
    fn test_large_unsigned_ids_keep_distinct_keys() {
        let builder = CacheKeyBuilder::new();
        let derive = |raw: Value| {
            let descriptor: ReadDescriptor = serde_json::from_value(raw).unwrap();
            builder
                .derive("users", &descriptor, &QueryOptions::new())
                .unwrap()
        };

        let max = derive(json!({"id": u64::MAX}));
        let below = derive(json!({"id": u64::MAX - 1}));

        assert_eq!(max.as_str(), r#"users:{"id":18446744073709551615}:{}"#);
        assert_eq!(below.as_str(), r#"users:{"id":18446744073709551614}:{}"#);
        assert_ne!(max, below);
    }

    #[test]
    fn test_field_order_does_not_change_key() {
        #[derive(Serialize)]
        struct Forward {
            board: u32,
            status: &'static str,
        }

        #[derive(Serialize)]
        struct Reversed {
            status: &'static str,
            board: u32,
        }

        let builder = CacheKeyBuilder::new();
        let a = builder
            .derive("threads", &Forward { board: 3, status: "open" }, &json!({}))
            .unwrap();
        let b = builder
            .derive("threads", &Reversed { status: "open", board: 3 }, &json!({}))
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_gives_different_key() {
        let builder = CacheKeyBuilder::new();

        let open = builder
            .derive("threads", &json!({"status": "open"}), &json!({}))
            .unwrap();
        let closed = builder
            .derive("threads", &json!({"status": "closed"}), &json!({}))
            .unwrap();
        let other_ns = builder
            .derive("posts", &json!({"status": "open"}), &json!({}))
            .unwrap();
        let paged = builder
            .derive("threads", &json!({"status": "open"}), &json!({"skip": 10}))
            .unwrap();

        assert_ne!(open, closed);
        assert_ne!(open, other_ns);
        assert_ne!(open, paged);
    }

    #[test]
    fn test_typed_descriptor_matches_wire_json() {
        let descriptor: ReadDescriptor =
            serde_json::from_value(json!({"status": "open", "$or": [{"a": 1}, {"b": 2}]}))
                .unwrap();
        let options = QueryOptions::new().with_sort("-createdAt").with_limit(5u64);

        let key = CacheKeyBuilder::new()
            .derive("threads", &descriptor, &options)
            .unwrap();

        assert_eq!(
            key.as_str(),
            r#"threads:{"$or":[{"a":1},{"b":2}],"status":"open"}:{"limit":5,"sort":"-createdAt"}"#
        );
    }

    #[test]
    fn test_integral_floats_print_as_integers() {
        assert_eq!(stable_json(&json!({"score": 2.0, "ratio": 0.5})).unwrap(), r#"{"ratio":0.5,"score":2}"#);
    }

    #[test]
    fn test_non_serializable_input_fails() {
        let mut descriptor: HashMap<(u8, u8), u8> = HashMap::new();
        descriptor.insert((1, 2), 3);

        let result = CacheKeyBuilder::new().derive("threads", &descriptor, &json!({}));

        assert!(matches!(result, Err(DomainError::Serialization { .. })));
    }

    #[test]
    fn test_namespace_membership() {
        let key = CacheKeyBuilder::new()
            .derive("threads", &json!({}), &json!({}))
            .unwrap();

        assert!(key.in_namespace("threads"));
        assert!(!key.in_namespace("thread"));
        assert_eq!(key.clone().into_string(), key.to_string());
        assert_eq!(CacheKeyBuilder::namespace_prefix("threads"), "threads:");
    }
}
