//! Shutter Test Utilities
//!
//! Centralized test infrastructure for the Shutter workspace:
//! - Proptest generators for the domain records
//! - Fixtures for common scenarios (seeded store, cache wiring)
//! - A fault-injecting cache store for outage tests
//! - A side-effect log and instrumented tasks for cancellation assertions
//! - Custom assertions for Shutter error variants

pub use shutter_core::{
    Comment, ContentType, EntityId, EntityKind, Like, ListFilter, Page, Post, PostImage,
    PostUpdate, ProfileUpdate, PurchaseOption, ShutterError, ShutterResult, StoreError, User,
    UserRole,
};
pub use shutter_exec::{Task, TaskContext};
pub use shutter_storage::{CacheKey, CacheStats, CacheStore, InMemoryCacheStore, InMemoryStore};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shutter_core::CacheError;

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Cache store that can be switched into an outage.
///
/// While down, every call fails with `CacheError::Backend`; otherwise calls
/// pass through to the wrapped store.
pub struct FlakyCacheStore {
    inner: Arc<dyn CacheStore>,
    down: AtomicBool,
    failed_calls: AtomicU64,
}

impl FlakyCacheStore {
    pub fn new(inner: Arc<dyn CacheStore>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            failed_calls: AtomicU64::new(0),
        }
    }

    /// A flaky store over a fresh in-memory cache.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    /// Calls rejected while the store was down.
    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> ShutterResult<()> {
        if self.is_down() {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            return Err(CacheError::Backend {
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    async fn get(&self, key: &CacheKey) -> ShutterResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> ShutterResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> ShutterResult<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn stats(&self) -> ShutterResult<CacheStats> {
        self.check()?;
        self.inner.stats().await
    }
}

// ============================================================================
// SIDE EFFECTS
// ============================================================================

/// Append-only record of side effects, shared between tasks and assertions.
#[derive(Debug, Clone, Default)]
pub struct SideEffectLog(Arc<Mutex<Vec<String>>>);

impl SideEffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, effect: impl Into<String>) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(effect.into());
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any recorded effect starts with `prefix`.
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.snapshot().iter().any(|e| e.starts_with(prefix))
    }
}

/// Task that performs `steps` side effects `pause` apart, recording
/// `"{label}:{step}"` for each. Observes cancellation before every step.
pub fn instrumented_task(
    log: SideEffectLog,
    label: &'static str,
    steps: usize,
    pause: Duration,
) -> Task<usize> {
    Task::new(move |ctx| async move {
        for step in 0..steps {
            ctx.guard(async {
                tokio::time::sleep(pause).await;
                Ok(())
            })
            .await?;
            ctx.checkpoint()?;
            log.record(format!("{label}:{step}"));
        }
        Ok(steps)
    })
}

/// Task that fails with `error` after `delay`.
pub fn failing_task<T: Send + 'static>(error: ShutterError, delay: Duration) -> Task<T> {
    Task::new(move |_ctx| async move {
        tokio::time::sleep(delay).await;
        Err(error)
    })
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Shutter records.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use shutter_core::Timestamp;

    /// Millisecond-precision timestamps between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800_000i64..1_893_456_000_000i64)
            .prop_filter_map("valid timestamp", |ms| Utc.timestamp_millis_opt(ms).single())
    }

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1u64..1_000_000
    }

    pub fn arb_content_type() -> impl Strategy<Value = ContentType> {
        prop_oneof![
            Just(ContentType::Feed),
            Just(ContentType::Reel),
            Just(ContentType::Live),
        ]
    }

    pub fn arb_role() -> impl Strategy<Value = UserRole> {
        prop_oneof![Just(UserRole::Buyer), Just(UserRole::Seller)]
    }

    pub fn arb_url() -> impl Strategy<Value = String> {
        "[a-z]{3,10}".prop_map(|s| format!("https://cdn.example.com/{s}"))
    }

    pub fn arb_purchase_option() -> impl Strategy<Value = PurchaseOption> {
        ("[A-Za-z]{2,12}", arb_url()).prop_map(|(platform, url)| PurchaseOption { platform, url })
    }

    /// Posts whose media fields agree with their content type, with a few
    /// likes and comments from distinct users.
    pub fn arb_post() -> impl Strategy<Value = Post> {
        (
            arb_entity_id(),
            arb_entity_id(),
            "\\PC{0,80}",
            arb_content_type(),
            arb_url(),
            proptest::option::of("[A-Za-z ]{1,30}"),
            prop::collection::vec(arb_url(), 0..4),
            prop::collection::vec(arb_purchase_option(), 0..3),
            prop::collection::btree_map(arb_entity_id(), "\\PC{1,40}", 0..4),
            arb_timestamp(),
        )
            .prop_map(
                |(id, user_id, caption, content_type, media, location, images, purchase_options, engagement, created_at)| {
                    let (video_url, live_stream_url, images) = match content_type {
                        ContentType::Feed => (
                            None,
                            None,
                            images.into_iter().map(|image_url| PostImage { image_url }).collect(),
                        ),
                        ContentType::Reel => (Some(media), None, vec![]),
                        ContentType::Live => (None, Some(media), vec![]),
                    };
                    let likes = engagement
                        .keys()
                        .map(|&fan| Like {
                            user_id: fan,
                            post_id: id,
                            created_at,
                        })
                        .collect();
                    let comments = engagement
                        .into_iter()
                        .zip(1u64..)
                        .map(|((author, content), comment_id)| Comment {
                            id: comment_id,
                            post_id: id,
                            user_id: author,
                            content,
                            created_at,
                            updated_at: created_at,
                        })
                        .collect();
                    Post {
                        id,
                        user_id,
                        caption,
                        content_type,
                        video_url,
                        live_stream_url,
                        location,
                        images,
                        purchase_options,
                        likes,
                        comments,
                        created_at,
                        updated_at: created_at,
                    }
                },
            )
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (
            arb_entity_id(),
            "[a-z][a-z0-9_]{2,15}",
            "[A-Za-z ]{1,30}",
            "\\PC{0,60}",
            proptest::option::of(arb_url()),
            arb_role(),
            arb_timestamp(),
        )
            .prop_map(|(id, username, name, bio, image, role, created_at)| User {
                id,
                email: format!("{username}@example.com"),
                username,
                name,
                bio,
                profile_image: image.unwrap_or_default(),
                role,
                created_at,
                updated_at: created_at,
            })
    }

    pub fn arb_post_update() -> impl Strategy<Value = PostUpdate> {
        ("\\PC{0,80}", proptest::option::of("[A-Za-z ]{1,30}"))
            .prop_map(|(caption, location)| PostUpdate { caption, location })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use shutter_core::now;

    /// A feed post with the given caption.
    pub fn post(id: EntityId, user_id: EntityId, caption: &str) -> Post {
        let now = now();
        Post {
            id,
            user_id,
            caption: caption.to_string(),
            content_type: ContentType::Feed,
            video_url: None,
            live_stream_url: None,
            location: None,
            images: vec![PostImage {
                image_url: format!("https://cdn.example.com/{id}.jpg"),
            }],
            purchase_options: vec![],
            likes: vec![],
            comments: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// A reel with a video and one purchase link.
    pub fn reel(id: EntityId, user_id: EntityId) -> Post {
        Post {
            content_type: ContentType::Reel,
            video_url: Some(format!("https://cdn.example.com/{id}.mp4")),
            images: vec![],
            purchase_options: vec![PurchaseOption {
                platform: "shop".to_string(),
                url: format!("https://shop.example.com/item/{id}"),
            }],
            ..post(id, user_id, "new drop")
        }
    }

    pub fn user(id: EntityId, username: &str) -> User {
        let now = now();
        User {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            name: username.to_string(),
            bio: String::new(),
            profile_image: String::new(),
            role: UserRole::Buyer,
            created_at: now,
            updated_at: now,
        }
    }

    /// A store holding user 1 (`alice`) and `posts` feed posts owned by
    /// that user, ids `1..=posts`.
    pub fn seeded_store(posts: u64) -> ShutterResult<Arc<InMemoryStore>> {
        let store = InMemoryStore::new();
        store.seed_user(user(1, "alice"))?;
        for id in 1..=posts {
            store.seed_post(post(id, 1, &format!("post {id}")))?;
        }
        Ok(Arc::new(store))
    }

    /// A fresh in-memory cache behind the trait object.
    pub fn memory_cache() -> Arc<dyn CacheStore> {
        Arc::new(InMemoryCacheStore::new())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Shutter error variants.

    use super::*;
    use shutter_core::{GateError, TaskError, ValidationError};

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &ShutterResult<T>, kind: EntityKind) {
        match result {
            Err(ShutterError::Store(StoreError::NotFound { kind: k, .. })) => {
                assert_eq!(*k, kind, "Wrong entity kind in NotFound error");
            }
            other => panic!("Expected NotFound error for {kind}, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &ShutterResult<T>) {
        match result {
            Err(ShutterError::Store(StoreError::Conflict { .. })) => {}
            other => panic!("Expected Conflict error, got: {other:?}"),
        }
    }

    /// Assert an `InvalidValue` error on `field`.
    #[track_caller]
    pub fn assert_invalid_field<T: std::fmt::Debug>(result: &ShutterResult<T>, field: &str) {
        match result {
            Err(ShutterError::Validation(ValidationError::InvalidValue { field: f, .. })) => {
                assert_eq!(f, field, "Wrong field in InvalidValue error");
            }
            other => panic!("Expected InvalidValue error for {field}, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_forbidden<T: std::fmt::Debug>(result: &ShutterResult<T>) {
        match result {
            Err(ShutterError::Validation(ValidationError::Forbidden { .. })) => {}
            other => panic!("Expected Forbidden error, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_gate_timeout<T: std::fmt::Debug>(result: &ShutterResult<T>) {
        match result {
            Err(ShutterError::Gate(GateError::Timeout { .. })) => {}
            other => panic!("Expected gate Timeout error, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_cancelled<T: std::fmt::Debug>(result: &ShutterResult<T>) {
        match result {
            Err(ShutterError::Task(TaskError::Cancelled { .. }))
            | Err(ShutterError::Gate(GateError::Cancelled { .. })) => {}
            other => panic!("Expected cancellation, got: {other:?}"),
        }
    }
}
