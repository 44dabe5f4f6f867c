//! Shutter Core - Entity Types
//!
//! Pure data structures shared by every Shutter crate: identifiers, entity
//! kinds, the domain records that get cached, the error taxonomy and the
//! configuration types. No I/O lives here.

pub mod config;
pub mod constants;
pub mod entities;
pub mod error;

pub use config::{
    parse_rate_budget, AuthSettings, CacheBackendKind, CacheSettings, ExecSettings,
    GateSettings, JwtSecret, ShutterConfig,
};
pub use entities::{
    Comment, ContentType, Like, ListFilter, Listable, NewUser, Page, Post, PostImage,
    PostUpdate, ProfileUpdate, PurchaseOption, User, UserRole,
};
pub use error::{
    AuthError, CacheError, ConfigError, GateError, ShutterError, ShutterResult, StoreError,
    TaskError, ValidationError,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier assigned by the durable store. Monotonic per entity kind.
pub type EntityId = u64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Current UTC time, used for `created_at` / `updated_at` stamps.
pub fn now() -> Timestamp {
    Utc::now()
}

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// Entity kind discriminator.
///
/// Every kind owns a reserved cache key prefix. Listing keys live under the
/// separate `listing:` namespace, so an entity key and a listing key can
/// never address the same cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Post,
    User,
    Comment,
    Like,
}

impl EntityKind {
    /// All known kinds.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Post,
        EntityKind::User,
        EntityKind::Comment,
        EntityKind::Like,
    ];

    /// Reserved cache key prefix for single entities of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Post => "post:",
            EntityKind::User => "user:",
            EntityKind::Comment => "comment:",
            EntityKind::Like => "like:",
        }
    }

    /// Lower-case name, used in log fields and listing keys.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::User => "user",
            EntityKind::Comment => "comment",
            EntityKind::Like => "like",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every record that can be stored and cached by id.
pub trait Identified {
    /// The kind this record belongs to. Constant for all instances.
    fn kind() -> EntityKind;

    /// The id assigned by the durable store.
    fn id(&self) -> EntityId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_are_distinct() {
        let prefixes: Vec<&str> = EntityKind::ALL.iter().map(|k| k.prefix()).collect();
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                assert!(!a.starts_with(b) && !b.starts_with(a));
            }
        }
    }

    #[test]
    fn test_no_prefix_overlaps_listing_namespace() {
        for kind in EntityKind::ALL {
            assert!(!kind.prefix().starts_with(constants::LISTING_NAMESPACE));
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EntityKind::Post.to_string(), "post");
        assert_eq!(EntityKind::User.to_string(), "user");
        assert_eq!(EntityKind::Comment.to_string(), "comment");
    }
}
