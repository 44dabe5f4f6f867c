//! Configuration types
//!
//! Every setting has a default and can be overridden from the environment.
//! Unparsable or out-of-range values fall back to the default instead of
//! failing startup.

use crate::constants::{
    DEFAULT_CACHE_PATH, DEFAULT_CACHE_TTL_SECS, DEFAULT_CANCEL_GRACE_MS,
    DEFAULT_LMDB_MAX_SIZE_MB, DEFAULT_REDIS_URL, DEFAULT_REQUESTS_PER_SECOND,
    DEFAULT_TOKEN_TTL_DAYS, INSECURE_DEFAULT_JWT_SECRET, MAX_CACHE_TTL_SECS,
};
use crate::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Parse a requests-per-second budget.
///
/// Absent, unparsable, zero and negative inputs all yield the default of 10.
pub fn parse_rate_budget(raw: Option<&str>) -> NonZeroU32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .and_then(NonZeroU32::new)
        .unwrap_or(default_rate())
}

fn default_rate() -> NonZeroU32 {
    NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN)
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(raw: Option<String>) -> bool {
    raw.map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

// ============================================================================
// CACHE
// ============================================================================

/// Which cache backend to wire at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Lmdb,
    Redis,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "lmdb" => Ok(CacheBackendKind::Lmdb),
            "redis" => Ok(CacheBackendKind::Redis),
            other => Err(ConfigError::InvalidValue {
                field: "SHUTTER_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected one of memory, lmdb, redis".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    /// TTL applied to every single-entity entry.
    pub entity_ttl: Duration,
    /// TTL applied to listing pages; bounds how stale a listing may get.
    pub listing_ttl: Duration,
    /// LMDB directory.
    pub path: PathBuf,
    /// LMDB map size.
    pub max_size_mb: usize,
    pub redis_url: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            entity_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            listing_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `SHUTTER_CACHE_BACKEND`: memory | lmdb | redis (default: memory)
    /// - `SHUTTER_CACHE_TTL_SECS`: entity TTL (default: 1800, at most one year)
    /// - `SHUTTER_LISTING_TTL_SECS`: listing TTL (default: entity TTL, at most one year)
    /// - `SHUTTER_CACHE_PATH`: LMDB directory (default: ./data/cache)
    /// - `SHUTTER_CACHE_MAX_SIZE_MB`: LMDB map size (default: 256)
    /// - `SHUTTER_REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend = lookup("SHUTTER_CACHE_BACKEND")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.backend);
        let ttl_secs = parse_or(lookup("SHUTTER_CACHE_TTL_SECS"), DEFAULT_CACHE_TTL_SECS)
            .min(MAX_CACHE_TTL_SECS);
        let listing_ttl_secs =
            parse_or(lookup("SHUTTER_LISTING_TTL_SECS"), ttl_secs).min(MAX_CACHE_TTL_SECS);

        Self {
            backend,
            entity_ttl: Duration::from_secs(ttl_secs),
            listing_ttl: Duration::from_secs(listing_ttl_secs),
            path: lookup("SHUTTER_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: parse_or(lookup("SHUTTER_CACHE_MAX_SIZE_MB"), defaults.max_size_mb),
            redis_url: lookup("SHUTTER_REDIS_URL").unwrap_or(defaults.redis_url),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl = ttl;
        self
    }

    pub fn with_listing_ttl(mut self, ttl: Duration) -> Self {
        self.listing_ttl = ttl;
        self
    }
}

// ============================================================================
// PACING
// ============================================================================

/// Rate budget shared by every pacing gate. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    pub requests_per_second: NonZeroU32,
    /// Longest a request may wait for its slot. `None` waits until admitted
    /// or cancelled.
    pub acquire_timeout: Option<Duration>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate(),
            acquire_timeout: None,
        }
    }
}

impl GateSettings {
    /// Environment variables:
    /// - `SHUTTER_RATE_LIMIT_REQUESTS_PER_SECOND`: admissions per second (default: 10)
    /// - `SHUTTER_GATE_ACQUIRE_TIMEOUT_MS`: slot wait deadline (default: none, 0 = none)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            requests_per_second: parse_rate_budget(
                lookup("SHUTTER_RATE_LIMIT_REQUESTS_PER_SECOND").as_deref(),
            ),
            acquire_timeout: Some(parse_or(lookup("SHUTTER_GATE_ACQUIRE_TIMEOUT_MS"), 0u64))
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Spacing between two consecutive admission slots.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(1) / self.requests_per_second.get()
    }
}

// ============================================================================
// TASK COORDINATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSettings {
    /// Time cancelled siblings get to observe cancellation before they are
    /// aborted.
    pub cancel_grace: Duration,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            cancel_grace: Duration::from_millis(DEFAULT_CANCEL_GRACE_MS),
        }
    }
}

impl ExecSettings {
    /// Environment variables:
    /// - `SHUTTER_TASK_CANCEL_GRACE_MS`: wind-down window (default: 2000)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            cancel_grace: Duration::from_millis(parse_or(
                lookup("SHUTTER_TASK_CANCEL_GRACE_MS"),
                DEFAULT_CANCEL_GRACE_MS,
            )),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Token signing secret. Never printed.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    ///
    /// The secret must not be empty.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "SHUTTER_JWT_SECRET".to_string(),
                value: String::new(),
                reason: "secret must not be empty".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value, for signing and verification only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_JWT_SECRET
    }
}

impl Default for JwtSecret {
    fn default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_JWT_SECRET.into()))
    }
}

impl PartialEq for JwtSecret {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for JwtSecret {}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub jwt_secret: JwtSecret,
    /// Lifetime of an issued access token.
    pub token_ttl: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::default(),
            token_ttl: days(DEFAULT_TOKEN_TTL_DAYS),
        }
    }
}

fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(24 * 60 * 60))
}

impl AuthSettings {
    /// Environment variables:
    /// - `SHUTTER_JWT_SECRET`: HS256 signing secret (default: an insecure placeholder)
    /// - `SHUTTER_JWT_EXPIRY_DAYS`: token lifetime in days (default: 7, at most 365)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("SHUTTER_JWT_SECRET")
            .and_then(|s| JwtSecret::new(s.trim().to_string()).ok())
            .unwrap_or_default();
        let expiry_days = parse_or(lookup("SHUTTER_JWT_EXPIRY_DAYS"), DEFAULT_TOKEN_TTL_DAYS);
        let expiry_days = if expiry_days == 0 {
            DEFAULT_TOKEN_TTL_DAYS
        } else {
            expiry_days.min(365)
        };

        Self {
            jwt_secret,
            token_ttl: days(expiry_days),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutterConfig {
    pub cache: CacheSettings,
    pub gates: GateSettings,
    pub exec: ExecSettings,
    pub auth: AuthSettings,
    /// Emit logs as JSON lines (`SHUTTER_LOG_JSON`).
    pub log_json: bool,
}

impl ShutterConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            cache: CacheSettings::from_lookup(&lookup),
            gates: GateSettings::from_lookup(&lookup),
            exec: ExecSettings::from_lookup(&lookup),
            auth: AuthSettings::from_lookup(&lookup),
            log_json: parse_flag(lookup("SHUTTER_LOG_JSON")),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_rate_budget_fallbacks() {
        assert_eq!(parse_rate_budget(None).get(), 10);
        assert_eq!(parse_rate_budget(Some("")).get(), 10);
        assert_eq!(parse_rate_budget(Some("abc")).get(), 10);
        assert_eq!(parse_rate_budget(Some("0")).get(), 10);
        assert_eq!(parse_rate_budget(Some("-3")).get(), 10);
        assert_eq!(parse_rate_budget(Some("2.5")).get(), 10);
        assert_eq!(parse_rate_budget(Some(" 25 ")).get(), 25);
    }

    #[test]
    fn test_gate_cadence() {
        let settings = GateSettings {
            requests_per_second: NonZeroU32::new(4).unwrap(),
            acquire_timeout: None,
        };
        assert_eq!(settings.cadence(), Duration::from_millis(250));
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ShutterConfig::from_lookup(|_| None);
        assert_eq!(config, ShutterConfig::default());
        assert_eq!(config.cache.entity_ttl, Duration::from_secs(1800));
        assert_eq!(config.gates.requests_per_second.get(), 10);
        assert_eq!(config.gates.acquire_timeout, None);
        assert_eq!(config.exec.cancel_grace, Duration::from_millis(2000));
        assert!(!config.log_json);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = ShutterConfig::from_lookup(lookup_from(&[
            ("SHUTTER_CACHE_BACKEND", "LMDB"),
            ("SHUTTER_CACHE_TTL_SECS", "60"),
            ("SHUTTER_RATE_LIMIT_REQUESTS_PER_SECOND", "2"),
            ("SHUTTER_TASK_CANCEL_GRACE_MS", "10"),
            ("SHUTTER_LOG_JSON", "true"),
            ("SHUTTER_GATE_ACQUIRE_TIMEOUT_MS", "1500"),
        ]));
        assert_eq!(config.cache.backend, CacheBackendKind::Lmdb);
        assert_eq!(config.cache.entity_ttl, Duration::from_secs(60));
        // Listing TTL follows the entity TTL unless set on its own.
        assert_eq!(config.cache.listing_ttl, Duration::from_secs(60));
        assert_eq!(config.gates.requests_per_second.get(), 2);
        assert_eq!(config.gates.acquire_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.exec.cancel_grace, Duration::from_millis(10));
        assert!(config.log_json);
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let huge = u64::MAX.to_string();
        let settings = CacheSettings::from_lookup(lookup_from(&[("SHUTTER_CACHE_TTL_SECS", huge.as_str())]));
        assert_eq!(settings.entity_ttl, Duration::from_secs(MAX_CACHE_TTL_SECS));
        assert_eq!(settings.listing_ttl, Duration::from_secs(MAX_CACHE_TTL_SECS));
    }

    #[test]
    fn test_auth_settings_from_lookup() {
        let settings = AuthSettings::from_lookup(lookup_from(&[
            ("SHUTTER_JWT_SECRET", "s3cret-value"),
            ("SHUTTER_JWT_EXPIRY_DAYS", "2"),
        ]));
        assert_eq!(settings.jwt_secret.expose(), "s3cret-value");
        assert!(!settings.jwt_secret.is_insecure_default());
        assert_eq!(settings.token_ttl, Duration::from_secs(2 * 24 * 60 * 60));

        let fallback = AuthSettings::from_lookup(lookup_from(&[
            ("SHUTTER_JWT_SECRET", ""),
            ("SHUTTER_JWT_EXPIRY_DAYS", "0"),
        ]));
        assert!(fallback.jwt_secret.is_insecure_default());
        assert_eq!(fallback.token_ttl, Duration::from_secs(7 * 24 * 60 * 60));
    }

    #[test]
    fn test_jwt_secret_is_redacted_in_debug() {
        let config = ShutterConfig {
            auth: AuthSettings {
                jwt_secret: JwtSecret::new("do-not-print".to_string()).unwrap(),
                ..AuthSettings::default()
            },
            ..ShutterConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("do-not-print"));
        assert!(printed.contains("REDACTED"));
        assert!(JwtSecret::new(String::new()).is_err());
    }

    #[test]
    fn test_unknown_backend_falls_back() {
        let settings = CacheSettings::from_lookup(lookup_from(&[("SHUTTER_CACHE_BACKEND", "memcached")]));
        assert_eq!(settings.backend, CacheBackendKind::Memory);
        assert!("memcached".parse::<CacheBackendKind>().is_err());
    }

    proptest! {
        #[test]
        fn prop_rate_budget_never_fails(raw in ".*") {
            prop_assert!(parse_rate_budget(Some(&raw)).get() >= 1);
        }

        #[test]
        fn prop_positive_rate_budget_is_kept(n in 1u32..=u32::MAX) {
            prop_assert_eq!(parse_rate_budget(Some(&n.to_string())).get(), n);
        }
    }
}
