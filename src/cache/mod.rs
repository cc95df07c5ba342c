//! Shared response cache.
//!
//! - `SlotCache`: fixed-capacity concurrent map with per-slot locking
//! - `CachedResponse`: a stored response plus its freshness metadata
//!
//! There is no chaining and no LRU: a key owns exactly one slot and
//! colliding keys overwrite each other.

pub mod entry;
pub mod store;

pub use entry::CachedResponse;
pub use store::{Accessor, SlotCache};

/// The cache type the proxy shares across connections: full request URLs
/// mapped to stored responses.
pub type ResponseCache = SlotCache<String, CachedResponse>;
