// Constants module - centralized default values for configuration

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 12345;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Cache defaults
// =============================================================================

/// Default number of cache slots
pub const DEFAULT_CACHE_SLOTS: usize = 4096;

/// Responses with a body larger than this are never stored (2 MiB)
pub const MAX_CACHEABLE_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// Protocol limits
// =============================================================================

/// Delta-seconds values above this are clamped rather than rejected.
/// RFC 7234 Sec 1.2.1 prescribes treating overlarge values as infinity.
pub const MAX_DELTA_SECONDS: i64 = 1 << 31;
