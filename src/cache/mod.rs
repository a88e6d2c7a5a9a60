//! Tiered response cache for offline support.
//!
//! This module provides:
//! - Three named tiers (static assets, dynamic pages, API responses), each
//!   versioned by the deployment generation
//! - A SQLite tier store shared with the offline queue
//! - Cache-First and Network-First strategies with offline fallbacks

mod layer;
mod registry;
mod storage;
mod traits;

pub use layer::{CacheLayer, Fallback};
pub use registry::{CacheTierRegistry, TierKind};
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, CachedEntry, Served};
#[cfg(test)]
pub use traits::CacheSource;
