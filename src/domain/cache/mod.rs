//! Cache domain - keys, stores and clocks

mod clock;
mod key;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{stable_json, CacheKey, CacheKeyBuilder, NAMESPACE_SEPARATOR};
pub use store::CacheStore;

#[cfg(test)]
pub use store::MockCacheStore;
