//! Query normalization - rewrites a raw read into its canonical executable form

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::descriptor::{Condition, RangeBounds, ReadDescriptor, Scalar};
use super::options::{
    NormalizedOptions, PageValue, QueryOptions, Selection, SortDirection, SortSpec,
};

pub const DEFAULT_SKIP: u64 = 0;
pub const DEFAULT_LIMIT: u64 = 10;

/// Configuration for query normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Fields whose range bounds are coerced to typed dates
    pub temporal_fields: BTreeSet<String>,
    pub default_skip: u64,
    pub default_limit: u64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            temporal_fields: ["createdAt", "updatedAt"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_skip: DEFAULT_SKIP,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl NormalizerConfig {
    /// Marks an additional field as temporal
    pub fn with_temporal_field(mut self, field: impl Into<String>) -> Self {
        self.temporal_fields.insert(field.into());
        self
    }

    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }
}

/// A read operation in canonical form, ready to hand to an executor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedQuery {
    pub filter: ReadDescriptor,
    pub options: NormalizedOptions,
}

/// Canonicalizes read descriptors and their options
///
/// Every rule is a fixed point on its own output, so normalizing an already
/// normalized query returns it unchanged.
#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    config: NormalizerConfig,
}

impl QueryNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalizes a descriptor and its options
    pub fn normalize(&self, descriptor: &ReadDescriptor, options: &QueryOptions) -> NormalizedQuery {
        NormalizedQuery {
            filter: self.normalize_descriptor(descriptor),
            options: self.normalize_options(options),
        }
    }

    pub fn normalize_descriptor(&self, descriptor: &ReadDescriptor) -> ReadDescriptor {
        let mut conditions: BTreeMap<String, Condition> = descriptor
            .conditions
            .iter()
            .map(|(field, condition)| (field.clone(), self.normalize_condition(field, condition)))
            .collect();

        let mut any_of = descriptor.any_of.as_ref().map(|branches| {
            branches
                .iter()
                .map(|branch| self.normalize_descriptor(branch))
                .collect::<Vec<_>>()
        });

        if let Some((field, values)) = any_of.as_deref().and_then(collapsible_disjunction) {
            if !conditions.contains_key(&field) {
                conditions.insert(field, Condition::In(values));
                any_of = None;
            }
        }

        ReadDescriptor { conditions, any_of }
    }

    fn normalize_condition(&self, field: &str, condition: &Condition) -> Condition {
        match condition {
            Condition::Range(bounds)
                if bounds.has_lower()
                    && bounds.has_upper()
                    && self.config.temporal_fields.contains(field) =>
            {
                Condition::Range(RangeBounds {
                    gt: bounds.gt.as_ref().map(coerce_date),
                    gte: bounds.gte.as_ref().map(coerce_date),
                    lt: bounds.lt.as_ref().map(coerce_date),
                    lte: bounds.lte.as_ref().map(coerce_date),
                })
            }
            other => other.clone(),
        }
    }

    pub fn normalize_options(&self, options: &QueryOptions) -> NormalizedOptions {
        NormalizedOptions {
            select: options.select.as_ref().map(normalize_selection),
            sort: options.sort.as_ref().map(normalize_sort).unwrap_or_default(),
            skip: parse_page(options.skip.as_ref()).unwrap_or(self.config.default_skip),
            limit: parse_page(options.limit.as_ref()).unwrap_or(self.config.default_limit),
            ttl: options.ttl,
        }
    }
}

/// Returns the field and values when every branch is a scalar equality on the same field
fn collapsible_disjunction(branches: &[ReadDescriptor]) -> Option<(String, Vec<Scalar>)> {
    let (first, _) = branches.first()?.as_single_equality()?;
    let mut values = Vec::with_capacity(branches.len());

    for branch in branches {
        let (field, value) = branch.as_single_equality()?;

        if field != first {
            return None;
        }

        values.push(value.clone());
    }

    Some((first.to_string(), values))
}

fn coerce_date(bound: &Scalar) -> Scalar {
    let parsed = match bound {
        Scalar::String(text) => parse_date(text),
        Scalar::Int(millis) => Utc.timestamp_millis_opt(*millis).single(),
        _ => None,
    };

    parsed.map(Scalar::Date).unwrap_or_else(|| bound.clone())
}

/// Parses the ISO-like date shapes clients send
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn normalize_selection(selection: &Selection) -> BTreeMap<String, i64> {
    match selection {
        Selection::Fields(fields) => fields.clone(),
        Selection::Spec(spec) => spec
            .split_whitespace()
            .map(|field| (field.to_string(), 1))
            .collect(),
    }
}

fn normalize_sort(sort: &SortSpec) -> Vec<(String, SortDirection)> {
    match sort {
        SortSpec::Fields(fields) => fields.clone(),
        SortSpec::Spec(spec) => spec
            .split_whitespace()
            .filter_map(|token| match token.strip_prefix('-') {
                Some("") => None,
                Some(field) => Some((field.to_string(), SortDirection::Descending)),
                None => Some((token.to_string(), SortDirection::Ascending)),
            })
            .collect(),
    }
}

/// Malformed or negative input yields `None` so the caller falls back to the default
fn parse_page(value: Option<&PageValue>) -> Option<u64> {
    match value? {
        PageValue::Int(n) => u64::try_from(*n).ok(),
        PageValue::Float(f) if f.is_finite() && *f >= 0.0 => Some(f.trunc() as u64),
        PageValue::Float(_) => None,
        PageValue::Text(text) => {
            let text = text.trim();

            text.parse::<u64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f.trunc() as u64)
            })
        }
    }
}
