//! Durable store traits.
//!
//! The durable store is the system of record. It owns the real consistency
//! guarantees (transactions, uniqueness); the cache layer never assumes any
//! coupling with it. Every call may fail.

use async_trait::async_trait;
use shutter_core::{Comment, EntityId, Like, ListFilter, NewUser, ShutterResult, User};

/// CRUD and query access to entities of type `T`.
#[async_trait]
pub trait DurableStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Fetch entity `id`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when no such entity exists.
    async fn get(&self, id: EntityId) -> ShutterResult<T>;

    /// Persist a new entity. The store assigns the id and creation stamps and
    /// returns the stored record.
    async fn create(&self, entity: T) -> ShutterResult<T>;

    /// Replace an existing entity.
    async fn update(&self, entity: &T) -> ShutterResult<()>;

    async fn delete(&self, id: EntityId) -> ShutterResult<()>;

    /// Number of entities matching `filter`.
    async fn count(&self, filter: &ListFilter) -> ShutterResult<u64>;

    /// Entities matching `filter`, newest first, skipping `offset` and
    /// returning at most `limit`.
    async fn list(&self, filter: &ListFilter, offset: u64, limit: u32) -> ShutterResult<Vec<T>>;
}

/// User-specific queries on top of [`DurableStore<User>`].
#[async_trait]
pub trait UserStore: DurableStore<User> {
    /// Any user already holding `username` or `email`.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> ShutterResult<Option<User>>;

    /// The user registered under `email` together with their stored
    /// credential, for login.
    async fn find_login(&self, email: &str) -> ShutterResult<Option<(User, String)>>;

    /// Create an account.
    ///
    /// # Errors
    ///
    /// `StoreError::Conflict` if the username or email is already taken. This
    /// is the authoritative uniqueness check; earlier lookups are advisory.
    async fn create_user(&self, new_user: NewUser) -> ShutterResult<User>;
}

/// Likes and comments on posts.
///
/// A post read through [`DurableStore<Post>`](DurableStore) carries its likes
/// and comments, so every mutation here changes what a cached post should
/// hold.
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Record that `user_id` likes `post_id`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` (post) if the post does not exist
    /// - `StoreError::Conflict` (like) if the user already likes it
    async fn add_like(&self, post_id: EntityId, user_id: EntityId) -> ShutterResult<Like>;

    /// # Errors
    ///
    /// `StoreError::NotFound` (like) if the user does not like the post.
    async fn remove_like(&self, post_id: EntityId, user_id: EntityId) -> ShutterResult<()>;

    /// Persist a comment; the store assigns id and stamps.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` (post) if the post does not exist.
    async fn add_comment(&self, comment: Comment) -> ShutterResult<Comment>;

    async fn get_comment(&self, id: EntityId) -> ShutterResult<Comment>;

    /// Comments on `post_id`, newest first.
    async fn list_comments(&self, post_id: EntityId) -> ShutterResult<Vec<Comment>>;

    async fn delete_comment(&self, id: EntityId) -> ShutterResult<()>;
}
