//! Constants for Shutter
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// CACHE
// ============================================================================

/// Default time-to-live for cached entities in seconds (30 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;

/// Longest TTL any backend will store (one year). Larger values are clamped.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Key namespace reserved for cached listing pages
pub const LISTING_NAMESPACE: &str = "listing:";

/// Default directory for the LMDB cache backend
pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

/// Default LMDB map size in megabytes
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 256;

/// Default Redis endpoint
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

// ============================================================================
// PACING
// ============================================================================

/// Default admission rate for every pacing gate (requests per second)
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Gate protecting registration and other credential work
pub const AUTH_GATE: &str = "auth";

/// Gate protecting post reads and listings
pub const POSTS_GATE: &str = "posts";

// ============================================================================
// TASK COORDINATION
// ============================================================================

/// How long cancelled sibling tasks may take to wind down before they are
/// aborted (milliseconds)
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 2000;

// ============================================================================
// PAGINATION
// ============================================================================

/// Default page number for list operations (1-based)
pub const DEFAULT_PAGE: u32 = 1;

/// Default page size for list operations
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum page size for list operations
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Signing secret used when none is configured. Only fit for local runs.
pub const INSECURE_DEFAULT_JWT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Default access token lifetime in days
pub const DEFAULT_TOKEN_TTL_DAYS: u64 = 7;

// ============================================================================
// VALIDATION
// ============================================================================

/// Minimum accepted password length at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Longest accepted comment body, in characters
pub const MAX_COMMENT_LEN: usize = 2_000;
