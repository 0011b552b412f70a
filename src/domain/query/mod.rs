//! Query domain - read descriptors, options and their normalization

mod descriptor;
mod normalizer;
mod options;

pub use descriptor::{format_date, Condition, RangeBounds, ReadDescriptor, Scalar, DISJUNCTION_KEY};
pub use normalizer::{
    parse_date, NormalizedQuery, NormalizerConfig, QueryNormalizer, DEFAULT_LIMIT, DEFAULT_SKIP,
};
pub use options::{
    NormalizedOptions, PageValue, QueryOptions, Selection, SortDirection, SortSpec,
};
