//! Query options - selection, sort, pagination and cache TTL override

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field selection: a mapping of field to 0/1, or a space-delimited field list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Fields(BTreeMap<String, i64>),
    Spec(String),
}

impl From<&str> for Selection {
    fn from(s: &str) -> Self {
        Self::Spec(s.to_string())
    }
}

/// Sort direction, written as `1` / `-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            1 => Ok(Self::Ascending),
            -1 => Ok(Self::Descending),
            other => Err(de::Error::custom(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

/// Sort specification: an ordered mapping of field to direction, or a
/// space-delimited string where a leading `-` means descending
#[derive(Debug, Clone, PartialEq)]
pub enum SortSpec {
    Fields(Vec<(String, SortDirection)>),
    Spec(String),
}

impl From<&str> for SortSpec {
    fn from(s: &str) -> Self {
        Self::Spec(s.to_string())
    }
}

/// Writes ordered sort fields as a JSON object, keeping their order
pub fn serialize_sort_fields<S: Serializer>(
    fields: &[(String, SortDirection)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;

    for (field, direction) in fields {
        map.serialize_entry(field, direction)?;
    }

    map.end()
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fields(fields) => serialize_sort_fields(fields, serializer),
            Self::Spec(spec) => serializer.serialize_str(spec),
        }
    }
}

struct SortSpecVisitor;

impl<'de> Visitor<'de> for SortSpecVisitor {
    type Value = SortSpec;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a sort string or a mapping of field to 1/-1")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<SortSpec, E> {
        Ok(SortSpec::Spec(value.to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SortSpec, A::Error> {
        let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));

        while let Some((field, direction)) = access.next_entry::<String, SortDirection>()? {
            fields.push((field, direction));
        }

        Ok(SortSpec::Fields(fields))
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SortSpecVisitor)
    }
}

/// Pagination input as received from a request: a number or its textual form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<u64> for PageValue {
    fn from(n: u64) -> Self {
        Self::Int(n as i64)
    }
}

impl From<&str> for PageValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Caller-supplied options for a cached read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Selection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<PageValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<PageValue>,
    /// Cache time-to-live override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_select(mut self, select: impl Into<Selection>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<SortSpec>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_skip(mut self, skip: impl Into<PageValue>) -> Self {
        self.skip = Some(skip.into());
        self
    }

    pub fn with_limit(mut self, limit: impl Into<PageValue>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }
}

/// Options in canonical, execution-ready form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<BTreeMap<String, i64>>,
    #[serde(serialize_with = "serialize_sort_fields")]
    pub sort: Vec<(String, SortDirection)>,
    pub skip: u64,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl From<NormalizedOptions> for QueryOptions {
    fn from(options: NormalizedOptions) -> Self {
        Self {
            select: options.select.map(Selection::Fields),
            sort: (!options.sort.is_empty()).then_some(SortSpec::Fields(options.sort)),
            skip: Some(PageValue::from(options.skip)),
            limit: Some(PageValue::from(options.limit)),
            ttl: options.ttl,
        }
    }
}
