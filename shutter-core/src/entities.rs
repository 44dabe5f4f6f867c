//! Domain records
//!
//! These are the values that travel through the cache and the durable store.
//! Field names serialize in camelCase to match the public JSON shapes.

use crate::{EntityId, EntityKind, Identified, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// USERS
// ============================================================================

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Seller,
}

impl UserRole {
    /// Parse the wire form (`buyer` / `seller`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(UserRole::Buyer),
            "seller" => Some(UserRole::Seller),
            _ => None,
        }
    }
}

/// A user profile as exposed to callers.
///
/// The credential hash is not part of this record; it lives only in the
/// durable store (see [`NewUser`]), so cached profiles never carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub profile_image: String,
    pub role: UserRole,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Identified for User {
    fn kind() -> EntityKind {
        EntityKind::User
    }

    fn id(&self) -> EntityId {
        self.id
    }
}

/// Registration payload handed to the durable store once the password has
/// been hashed and uniqueness has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub password_hash: String,
}

/// Editable profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: String,
    pub bio: String,
    pub profile_image: String,
}

// ============================================================================
// POSTS
// ============================================================================

/// What a post carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Image feed post, images attached separately
    Feed,
    /// Short video
    Reel,
    /// Live stream session
    Live,
}

impl ContentType {
    /// Parse the wire form (`feed` / `reel` / `live`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(ContentType::Feed),
            "reel" => Some(ContentType::Reel),
            "live" => Some(ContentType::Live),
            _ => None,
        }
    }
}

/// A single image of a feed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostImage {
    pub image_url: String,
}

/// A link where the featured product can be bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOption {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: EntityId,
    pub user_id: EntityId,
    pub caption: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_stream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PostImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purchase_options: Vec<PurchaseOption>,
    /// Filled in by the store on reads; ignored on create and update.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub likes: Vec<Like>,
    /// Newest first. Filled in by the store on reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Post {
    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn is_liked_by(&self, user_id: EntityId) -> bool {
        self.likes.iter().any(|like| like.user_id == user_id)
    }
}

impl Identified for Post {
    fn kind() -> EntityKind {
        EntityKind::Post
    }

    fn id(&self) -> EntityId {
        self.id
    }
}

/// Editable post fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub caption: String,
    pub location: Option<String>,
}

// ============================================================================
// ENGAGEMENT
// ============================================================================

/// A user's like on a post. At most one per user and post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user_id: EntityId,
    pub post_id: EntityId,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub user_id: EntityId,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Identified for Comment {
    fn kind() -> EntityKind {
        EntityKind::Comment
    }

    fn id(&self) -> EntityId {
        self.id
    }
}

// ============================================================================
// LISTINGS
// ============================================================================

/// Filter for count/list queries. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    pub owner_id: Option<EntityId>,
    pub content_type: Option<ContentType>,
}

impl ListFilter {
    /// Filter matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to records owned by `owner_id`.
    pub fn owned_by(mut self, owner_id: EntityId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Restrict posts to a content type.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.owner_id.is_none() && self.content_type.is_none()
    }
}

/// Records that can be selected by a [`ListFilter`].
pub trait Listable {
    fn matches(&self, filter: &ListFilter) -> bool;

    /// Ordering key; listings are returned newest first.
    fn created_at(&self) -> Timestamp;
}

impl Listable for Post {
    fn matches(&self, filter: &ListFilter) -> bool {
        filter.owner_id.map_or(true, |owner| owner == self.user_id)
            && filter.content_type.map_or(true, |ct| ct == self.content_type)
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

impl Listable for Comment {
    fn matches(&self, filter: &ListFilter) -> bool {
        filter.owner_id.map_or(true, |owner| owner == self.user_id) && filter.content_type.is_none()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

impl Listable for User {
    fn matches(&self, filter: &ListFilter) -> bool {
        // Users own themselves; content type does not apply.
        filter.owner_id.map_or(true, |owner| owner == self.id) && filter.content_type.is_none()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

/// One page of a listing, with the totals needed for pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Build a page, deriving `total_pages = ceil(total / page_size)`.
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size))
        };
        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }

    /// Zero-based row offset of this page.
    pub fn offset(page: u32, page_size: u32) -> u64 {
        u64::from(page.saturating_sub(1)) * u64::from(page_size)
    }
}
