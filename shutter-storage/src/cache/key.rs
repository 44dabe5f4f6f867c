//! Cache keys.
//!
//! A key can only be built from an [`EntityKind`], so every key carries the
//! prefix reserved for its kind. Listing pages live under the separate
//! `listing:` namespace, which no entity prefix starts with.

use shutter_core::constants::LISTING_NAMESPACE;
use shutter_core::{EntityId, EntityKind};

/// Address of one cached value.
///
/// # Format
///
/// - single entity: `{prefix}{id}`, e.g. `post:42`
/// - listing page: `listing:{kind}:page:{P}:size:{S}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Private so keys cannot be built from arbitrary strings.
    inner: String,
}

impl CacheKey {
    /// Key of a single entity.
    pub fn entity(kind: EntityKind, id: EntityId) -> Self {
        Self {
            inner: format!("{}{}", kind.prefix(), id),
        }
    }

    /// Key of one listing page of `kind`.
    pub fn listing(kind: EntityKind, page: u32, page_size: u32) -> Self {
        Self {
            inner: format!(
                "{}{}:page:{}:size:{}",
                LISTING_NAMESPACE,
                kind.as_str(),
                page,
                page_size
            ),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Whether this key addresses a listing page rather than an entity.
    pub fn is_listing(&self) -> bool {
        self.inner.starts_with(LISTING_NAMESPACE)
    }

    /// The entity kind this key belongs to.
    pub fn kind(&self) -> Option<EntityKind> {
        let rest = self
            .inner
            .strip_prefix(LISTING_NAMESPACE)
            .unwrap_or(&self.inner);
        EntityKind::ALL.into_iter().find(|kind| {
            rest.starts_with(kind.prefix())
                || rest
                    .strip_prefix(kind.as_str())
                    .is_some_and(|tail| tail.starts_with(':'))
        })
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}
