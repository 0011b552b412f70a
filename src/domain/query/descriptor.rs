//! Read descriptors - the filter half of a cached read operation

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::domain::DomainError;

/// Key under which a disjunction is carried in the wire form
pub const DISJUNCTION_KEY: &str = "$or";

/// A scalar operand of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Unsigned integer above `i64::MAX`
    UInt(u64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Typed date, only produced by normalization
    #[serde(skip_deserializing, serialize_with = "serialize_date")]
    Date(DateTime<Utc>),
}

impl Scalar {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_u64().map(Self::UInt))
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(n) => Value::from(n),
            Self::UInt(n) => Value::from(n),
            Self::Float(f) => Value::from(f),
            Self::String(s) => Value::String(s),
            Self::Date(d) => Value::String(format_date(&d)),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<u64> for Scalar {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Self::UInt(n), Self::Int)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

/// Dates are written the way a JSON encoder renders them on the wire:
/// millisecond precision with a `Z` suffix.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_date<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_date(date))
}

/// Bounds of a range condition; unset bounds are omitted from the wire form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gt: Option<Scalar>,
    pub gte: Option<Scalar>,
    pub lt: Option<Scalar>,
    pub lte: Option<Scalar>,
}

impl RangeBounds {
    pub fn has_lower(&self) -> bool {
        self.gt.is_some() || self.gte.is_some()
    }

    pub fn has_upper(&self) -> bool {
        self.lt.is_some() || self.lte.is_some()
    }

    fn is_empty(&self) -> bool {
        !self.has_lower() && !self.has_upper()
    }
}

/// A condition on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Condition {
    /// Equality against a scalar
    Eq(Scalar),
    /// Range over `$gt` / `$gte` / `$lt` / `$lte`
    Range(RangeBounds),
    /// Set membership (`$in`)
    In(Vec<Scalar>),
    /// Any other condition document, carried untouched
    Other(Value),
}

impl Condition {
    /// Create an equality condition
    pub fn eq(value: impl Into<Scalar>) -> Self {
        Self::Eq(value.into())
    }

    /// Create a set-membership condition
    pub fn is_in<T: Into<Scalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    /// Create a closed range `[from, to]`
    pub fn between(from: impl Into<Scalar>, to: impl Into<Scalar>) -> Self {
        Self::Range(RangeBounds {
            gte: Some(from.into()),
            lte: Some(to.into()),
            ..Default::default()
        })
    }

    fn range_from_object(object: &Map<String, Value>) -> Option<RangeBounds> {
        let mut bounds = RangeBounds::default();

        for (operator, operand) in object {
            let scalar = Scalar::from_value(operand)?;

            match operator.as_str() {
                "$gt" => bounds.gt = Some(scalar),
                "$gte" => bounds.gte = Some(scalar),
                "$lt" => bounds.lt = Some(scalar),
                "$lte" => bounds.lte = Some(scalar),
                _ => return None,
            }
        }

        (!bounds.is_empty()).then_some(bounds)
    }

    fn in_from_object(object: &Map<String, Value>) -> Option<Vec<Scalar>> {
        if object.len() != 1 {
            return None;
        }

        match object.get("$in")? {
            Value::Array(items) => items.iter().map(Scalar::from_value).collect(),
            _ => None,
        }
    }
}

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        if let Some(scalar) = Scalar::from_value(&value) {
            return Self::Eq(scalar);
        }

        if let Value::Object(object) = &value {
            if let Some(values) = Self::in_from_object(object) {
                return Self::In(values);
            }

            if let Some(bounds) = Self::range_from_object(object) {
                return Self::Range(bounds);
            }
        }

        Self::Other(value)
    }
}

impl From<Condition> for Value {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Eq(scalar) => scalar.into_value(),
            Condition::Range(bounds) => {
                let mut object = Map::new();

                for (operator, bound) in [
                    ("$gt", bounds.gt),
                    ("$gte", bounds.gte),
                    ("$lt", bounds.lt),
                    ("$lte", bounds.lte),
                ] {
                    if let Some(bound) = bound {
                        object.insert(operator.to_string(), bound.into_value());
                    }
                }

                Value::Object(object)
            }
            Condition::In(values) => {
                let items = values.into_iter().map(Scalar::into_value).collect();
                let mut object = Map::new();
                object.insert("$in".to_string(), Value::Array(items));
                Value::Object(object)
            }
            Condition::Other(value) => value,
        }
    }
}

/// Filter half of a read operation: field conditions plus an optional disjunction
///
/// The wire form is a single JSON object; the disjunction travels under `$or`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ReadDescriptor {
    pub conditions: BTreeMap<String, Condition>,
    pub any_of: Option<Vec<ReadDescriptor>>,
}

impl ReadDescriptor {
    /// Creates an empty descriptor (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition on a field
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    /// Sets the disjunction branches
    pub fn with_any_of(mut self, branches: Vec<ReadDescriptor>) -> Self {
        self.any_of = Some(branches);
        self
    }

    /// Returns the condition on a field, if any
    pub fn condition(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    /// Returns `(field, value)` when this descriptor is exactly one scalar equality
    pub fn as_single_equality(&self) -> Option<(&str, &Scalar)> {
        if self.any_of.is_some() || self.conditions.len() != 1 {
            return None;
        }

        match self.conditions.iter().next()? {
            (field, Condition::Eq(value)) => Some((field.as_str(), value)),
            _ => None,
        }
    }
}

impl TryFrom<Value> for ReadDescriptor {
    type Error = DomainError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(object) = value else {
            return Err(DomainError::validation("Read descriptor must be a JSON object"));
        };

        let mut descriptor = ReadDescriptor::new();

        for (field, raw) in object {
            if field == DISJUNCTION_KEY {
                let Value::Array(items) = raw else {
                    return Err(DomainError::validation("'$or' must be an array of objects"));
                };

                let branches = items
                    .into_iter()
                    .map(ReadDescriptor::try_from)
                    .collect::<Result<Vec<_>, _>>()?;

                descriptor.any_of = Some(branches);
            } else {
                descriptor.conditions.insert(field, Condition::from(raw));
            }
        }

        Ok(descriptor)
    }
}

impl From<ReadDescriptor> for Value {
    fn from(descriptor: ReadDescriptor) -> Self {
        let mut object: Map<String, Value> = descriptor
            .conditions
            .into_iter()
            .map(|(field, condition)| (field, Value::from(condition)))
            .collect();

        if let Some(branches) = descriptor.any_of {
            let branches = branches.into_iter().map(Value::from).collect();
            object.insert(DISJUNCTION_KEY.to_string(), Value::Array(branches));
        }

        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_condition_kinds() {
        let descriptor: ReadDescriptor = serde_json::from_value(json!({
            "status": "open",
            "views": {"$gte": 10, "$lt": 100},
            "tags": {"$in": ["rust", "cache"]},
            "author": {"$exists": true}
        }))
        .unwrap();

        assert_eq!(descriptor.condition("status"), Some(&Condition::eq("open")));
        assert_eq!(
            descriptor.condition("views"),
            Some(&Condition::Range(RangeBounds {
                gte: Some(Scalar::Int(10)),
                lt: Some(Scalar::Int(100)),
                ..Default::default()
            }))
        );
        assert_eq!(
            descriptor.condition("tags"),
            Some(&Condition::is_in(["rust", "cache"]))
        );
        assert_eq!(
            descriptor.condition("author"),
            Some(&Condition::Other(json!({"$exists": true})))
        );
    }

    #[test]
    fn test_unsigned_above_i64_is_exact() {
        let raw = json!({"id": u64::MAX, "rank": {"$in": [u64::MAX - 1, 3]}});
        let descriptor: ReadDescriptor = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(descriptor.condition("id"), Some(&Condition::Eq(Scalar::UInt(u64::MAX))));
        assert_eq!(
            descriptor.condition("rank"),
            Some(&Condition::In(vec![Scalar::UInt(u64::MAX - 1), Scalar::Int(3)]))
        );
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), raw);
        assert_eq!(Scalar::from(7u64), Scalar::Int(7));
    }

    #[test]
    fn test_parse_disjunction() {
        let descriptor: ReadDescriptor = serde_json::from_value(json!({
            "$or": [{"status": "open"}, {"status": "closed"}]
        }))
        .unwrap();

        let branches = descriptor.any_of.as_ref().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[1].as_single_equality(),
            Some(("status", &Scalar::from("closed")))
        );
    }

    #[test]
    fn test_rejects_non_object() {
        let result: Result<ReadDescriptor, _> = serde_json::from_value(json!(["status"]));
        assert!(result.is_err());

        let result: Result<ReadDescriptor, _> = serde_json::from_value(json!({"$or": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_wire_form_is_preserved() {
        let raw = json!({
            "board": 7,
            "createdAt": {"$gte": "2024-01-01", "$lte": "2024-02-01"},
            "$or": [{"pinned": true}, {"score": 1.5}]
        });

        let descriptor: ReadDescriptor = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), raw);
    }

    #[test]
    fn test_date_scalar_serializes_with_millis() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let descriptor = ReadDescriptor::new().with("createdAt", Condition::eq(date));

        assert_eq!(
            serde_json::to_string(&descriptor).unwrap(),
            r#"{"createdAt":"2024-03-01T12:30:00.000Z"}"#
        );
    }

    #[test]
    fn test_single_equality() {
        let descriptor = ReadDescriptor::new().with("status", Condition::eq("open"));
        assert_eq!(
            descriptor.as_single_equality(),
            Some(("status", &Scalar::from("open")))
        );

        let descriptor = descriptor.with("board", Condition::eq(3));
        assert!(descriptor.as_single_equality().is_none());

        let descriptor = ReadDescriptor::new().with("tags", Condition::is_in(["a"]));
        assert!(descriptor.as_single_equality().is_none());
    }
}
