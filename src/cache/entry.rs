//! Cached response entry type.

use crate::http::{HttpMessage, ResponseCacheInfo};

/// A stored origin response together with its freshness metadata.
///
/// Entries are immutable once inserted; a 304 revalidation replaces the
/// whole entry (carrying the old body forward) rather than mutating it
/// in place, so concurrent readers always observe a consistent snapshot.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub message: HttpMessage,
    pub info: ResponseCacheInfo,
}

impl CachedResponse {
    pub fn new(message: HttpMessage, info: ResponseCacheInfo) -> Self {
        Self { message, info }
    }

    /// Build the refreshed entry a 304 response produces: the validated
    /// body is kept, the header lines and freshness metadata are taken
    /// from the revalidation response.
    pub fn revalidated(&self, not_modified: &HttpMessage, info: ResponseCacheInfo) -> Self {
        let mut message = self.message.clone();
        message.header_lines = not_modified.header_lines.clone();
        Self { message, info }
    }
}
