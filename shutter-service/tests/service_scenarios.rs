//! End-to-end scenarios across cache, store, coordinator and gates.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use proptest::prelude::*;
use shutter_core::{
    CacheBackendKind, CacheSettings, EntityKind, GateSettings, Post, PostUpdate, ShutterConfig,
    ShutterResult, User,
};
use shutter_exec::TaskContext;
use shutter_service::{
    Argon2Hasher, CommentRequest, CredentialHasher, JwtIssuer, ListQuery, LoginRequest,
    PostService, RegisterRequest, ServiceCore, UserService,
};
use shutter_storage::{CacheStore, CachedRead, DurableStore, InMemoryStore};
use shutter_test_utils::assertions::{
    assert_conflict, assert_forbidden, assert_invalid_field, assert_not_found,
};
use shutter_test_utils::generators::arb_post_update;
use shutter_test_utils::{fixtures, FlakyCacheStore, SideEffectLog};
use tokio::runtime::Runtime;

fn core_with(config: ShutterConfig, cache: Arc<dyn CacheStore>) -> ServiceCore {
    ServiceCore::new(config, cache)
}

fn fast_gates() -> ShutterConfig {
    ShutterConfig {
        gates: GateSettings {
            requests_per_second: NonZeroU32::new(1_000).unwrap(),
            acquire_timeout: None,
        },
        ..ShutterConfig::default()
    }
}

/// Hashes slowly, recording each chunk, and honours cancellation.
struct SlowHasher {
    log: SideEffectLog,
}

#[async_trait]
impl CredentialHasher for SlowHasher {
    async fn hash(&self, password: &str, ctx: &TaskContext) -> ShutterResult<String> {
        for chunk in 0..20 {
            ctx.guard(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            })
            .await?;
            self.log.record(format!("hash:{chunk}"));
        }
        Ok(format!("slow${password}"))
    }

    async fn verify(&self, password: &str, encoded: &str) -> ShutterResult<bool> {
        Ok(encoded == format!("slow${password}"))
    }
}

#[tokio::test]
async fn test_post_42_read_invalidate_reread() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = Arc::new(InMemoryStore::new());
    store.seed_post(fixtures::post(42, 1, "hi")).unwrap();

    // (1)-(2) miss, durable fetch, populate
    let first: CachedRead<Post> = core.cached_read(&store, 42).await.unwrap();
    assert!(first.was_cache_miss());
    assert_eq!(first.value().caption, "hi");

    // (3) hit
    let second: CachedRead<Post> = core.cached_read(&store, 42).await.unwrap();
    assert!(second.was_cache_hit());
    assert_eq!(second.value().caption, "hi");

    // (4) mutate in the store, then invalidate
    let mut changed = second.into_value();
    changed.caption = "bye".to_string();
    let writer = Arc::clone(&store);
    core.write_then_invalidate(EntityKind::Post, 42, async move {
        DurableStore::<Post>::update(&*writer, &changed).await
    })
    .await
    .unwrap();

    // (5) miss again, (6) re-fetch yields the new caption and is cached
    let third: CachedRead<Post> = core.cached_read(&store, 42).await.unwrap();
    assert!(third.was_cache_miss());
    assert_eq!(third.value().caption, "bye");
    let fourth: CachedRead<Post> = core.cached_read(&store, 42).await.unwrap();
    assert!(fourth.was_cache_hit());
    assert_eq!(fourth.value().caption, "bye");
}

#[tokio::test]
async fn test_registration_conflict_cancels_hashing_and_creates_nothing() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = fixtures::seeded_store(0).unwrap();
    let log = SideEffectLog::new();
    let hasher: Arc<dyn CredentialHasher> = Arc::new(SlowHasher { log: log.clone() });
    let users = UserService::new(core, Arc::clone(&store), hasher);

    let result = users
        .register(RegisterRequest {
            username: "alice".to_string(),
            email: "someone-else@example.com".to_string(),
            password: "secret1".to_string(),
            name: "Alice Again".to_string(),
            role: "buyer".to_string(),
        })
        .await;

    assert_conflict(&result);
    assert_eq!(store.user_count().unwrap(), 1);

    // Hashing was cancelled and stays stopped.
    let at_return = log.len();
    assert!(at_return < 20);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(log.len(), at_return);
}

#[tokio::test]
async fn test_registration_without_conflict_uses_hash() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = Arc::new(InMemoryStore::new());
    let log = SideEffectLog::new();
    let hasher: Arc<dyn CredentialHasher> = Arc::new(SlowHasher { log: log.clone() });
    let users = UserService::new(core, Arc::clone(&store), hasher);

    let user = users
        .register(RegisterRequest {
            username: "erin".to_string(),
            email: "erin@example.com".to_string(),
            password: "secret1".to_string(),
            name: "Erin".to_string(),
            role: "seller".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(log.len(), 20);
    assert!(log.contains_prefix("hash:19"));
    assert_eq!(store.credential(user.id).unwrap().as_deref(), Some("slow$secret1"));
}

#[tokio::test]
async fn test_listing_is_stale_until_its_ttl_elapses() {
    let config = ShutterConfig {
        cache: CacheSettings::default().with_listing_ttl(Duration::from_millis(300)),
        ..fast_gates()
    };
    let core = core_with(config, fixtures::memory_cache());
    let store = fixtures::seeded_store(3).unwrap();
    let posts = PostService::new(core, Arc::clone(&store));

    let before = posts.list_posts(ListQuery::default()).await.unwrap();
    assert_eq!(before.value().total, 3);

    DurableStore::<Post>::create(&*store, fixtures::post(0, 1, "fresh"))
        .await
        .unwrap();

    // Within the TTL the cached page is served as is.
    let stale = posts.list_posts(ListQuery::default()).await.unwrap();
    assert!(stale.was_cache_hit());
    assert_eq!(stale.value().total, 3);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let fresh = posts.list_posts(ListQuery::default()).await.unwrap();
    assert!(fresh.was_cache_miss());
    assert_eq!(fresh.value().total, 4);
    assert_eq!(fresh.value().items[0].caption, "fresh");
}

#[tokio::test]
async fn test_cache_outage_degrades_to_store_reads() {
    let flaky = Arc::new(FlakyCacheStore::in_memory());
    let cache: Arc<dyn CacheStore> = flaky.clone();
    let core = core_with(fast_gates(), cache);
    let store = fixtures::seeded_store(2).unwrap();
    let posts = PostService::new(core, Arc::clone(&store));

    flaky.set_down(true);
    for _ in 0..3 {
        let read = posts.get_post(1).await.unwrap();
        assert!(read.was_cache_miss());
    }
    assert_eq!(store.read_count(), 3);

    // Writes still succeed; only the invalidation is lost.
    let updated = posts
        .update_post(
            1,
            2,
            PostUpdate {
                caption: "edited".to_string(),
                location: Some("Lisbon".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.caption, "edited");

    let listing = posts.list_posts(ListQuery::new(1, 10)).await.unwrap();
    assert_eq!(listing.value().total, 2);
    assert!(flaky.failed_calls() > 0);

    flaky.set_down(false);
    assert_eq!(posts.get_post(2).await.unwrap().value().caption, "edited");
}

#[tokio::test]
async fn test_store_outage_surfaces_and_nothing_is_cached() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = fixtures::seeded_store(2).unwrap();
    let posts = PostService::new(core.clone(), Arc::clone(&store));

    store.set_online(false);
    let err = posts.list_posts(ListQuery::default()).await.unwrap_err();
    assert!(err.is_retryable());
    let err = posts.get_post(1).await.unwrap_err();
    assert!(err.is_retryable());

    store.set_online(true);
    assert!(posts.get_post(1).await.unwrap().was_cache_miss());
    assert!(posts
        .list_posts(ListQuery::default())
        .await
        .unwrap()
        .was_cache_miss());
}

#[tokio::test]
async fn test_only_owner_mutates_and_cached_post_follows() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = fixtures::seeded_store(1).unwrap();
    let posts = PostService::new(core, Arc::clone(&store));

    assert!(posts.get_post(1).await.unwrap().was_cache_miss());
    assert!(posts.get_post(1).await.unwrap().was_cache_hit());

    let denied = posts.update_post(99, 1, PostUpdate::default()).await;
    assert_forbidden(&denied);
    // Rejected write left the cached entry alone.
    assert!(posts.get_post(1).await.unwrap().was_cache_hit());

    posts.delete_post(1, 1).await.unwrap();
    assert_not_found(&posts.get_post(1).await, EntityKind::Post);
}

#[tokio::test]
async fn test_engagement_invalidates_cached_post() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = Arc::new(InMemoryStore::new());
    store.seed_post(fixtures::reel(7, 1)).unwrap();
    let posts = PostService::new(core, Arc::clone(&store));

    assert!(posts.get_post(7).await.unwrap().was_cache_miss());
    assert!(posts.get_post(7).await.unwrap().was_cache_hit());

    // Each step changes what the cached post holds, so each is followed by a
    // miss that picks up the change.
    posts.like_post(2, 7).await.unwrap();
    let liked = posts.get_post(7).await.unwrap();
    assert!(liked.was_cache_miss());
    assert_eq!(liked.value().like_count(), 1);

    let comment = posts
        .add_comment(2, 7, CommentRequest { content: "where to buy?".to_string() })
        .await
        .unwrap();
    let commented = posts.get_post(7).await.unwrap();
    assert!(commented.was_cache_miss());
    assert_eq!(commented.value().comments.len(), 1);
    assert_eq!(commented.value().purchase_options.len(), 1);

    posts.delete_comment(2, comment.id).await.unwrap();
    posts.unlike_post(2, 7).await.unwrap();
    let cleared = posts.get_post(7).await.unwrap();
    assert!(cleared.was_cache_miss());
    assert_eq!(cleared.value().like_count(), 0);
    assert!(cleared.value().comments.is_empty());

    assert_not_found(&posts.unlike_post(2, 7).await, EntityKind::Like);
    assert_not_found(&posts.delete_comment(2, comment.id).await, EntityKind::Comment);
    assert_invalid_field(
        &posts.add_comment(2, 7, CommentRequest { content: "   ".to_string() }).await,
        "content",
    );
}

#[tokio::test]
async fn test_register_then_login_with_argon2() {
    let core = core_with(fast_gates(), fixtures::memory_cache());
    let store = Arc::new(InMemoryStore::new());
    let hasher: Arc<dyn CredentialHasher> =
        Arc::new(Argon2Hasher::with_params(8 * 1024, 1, 1).unwrap());
    let users = UserService::new(core.clone(), Arc::clone(&store), hasher);

    let user = users
        .register(RegisterRequest {
            username: "gina".to_string(),
            email: "gina@example.com".to_string(),
            password: "correct horse".to_string(),
            name: "Gina".to_string(),
            role: "seller".to_string(),
        })
        .await
        .unwrap();

    let response = users
        .login(LoginRequest {
            email: "gina@example.com".to_string(),
            password: "correct horse".to_string(),
        })
        .await
        .unwrap();
    let claims = JwtIssuer::from_settings(&core.config().auth)
        .validate(&response.token)
        .unwrap();
    assert_eq!(claims.user_id, user.id);

    // Login put the profile in the cache.
    let cached: CachedRead<User> = core.cached_read(&store, user.id).await.unwrap();
    assert!(cached.was_cache_hit());

    let malformed = users
        .login(LoginRequest {
            email: "gina".to_string(),
            password: "correct horse".to_string(),
        })
        .await;
    assert_invalid_field(&malformed, "email");
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_owner_update_is_visible_through_the_cache(update in arb_post_update()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let core = core_with(fast_gates(), fixtures::memory_cache());
            let store = fixtures::seeded_store(1).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let posts = PostService::new(core, Arc::clone(&store));
            posts.get_post(1).await.map_err(|e| TestCaseError::fail(e.to_string()))?;

            posts
                .update_post(1, 1, update.clone())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let read = posts.get_post(1).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(read.was_cache_miss());
            prop_assert_eq!(&read.value().caption, &update.caption);
            prop_assert_eq!(&read.value().location, &update.location);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test]
async fn test_posts_gate_paces_reads() {
    let config = ShutterConfig {
        gates: GateSettings {
            requests_per_second: NonZeroU32::new(5).unwrap(),
            acquire_timeout: None,
        },
        ..ShutterConfig::default()
    };
    let core = core_with(config, fixtures::memory_cache());
    let store = fixtures::seeded_store(1).unwrap();
    let posts = PostService::new(core, store);

    let started = Instant::now();
    for _ in 0..5 {
        posts.get_post(1).await.unwrap();
    }
    // Slots at 0, 200, 400, 600 and 800ms.
    assert!(started.elapsed() >= Duration::from_millis(780));
}

#[tokio::test]
async fn test_lmdb_backed_core_serves_hits() {
    let dir = tempfile::tempdir().unwrap();
    let config = ShutterConfig {
        cache: CacheSettings {
            backend: CacheBackendKind::Lmdb,
            path: dir.path().to_path_buf(),
            max_size_mb: 16,
            ..CacheSettings::default()
        },
        ..fast_gates()
    };
    let core = ServiceCore::from_config(config).await.unwrap();
    let store = fixtures::seeded_store(1).unwrap();
    let posts = PostService::new(core, Arc::clone(&store));

    assert!(posts.get_post(1).await.unwrap().was_cache_miss());
    let hit = posts.get_post(1).await.unwrap();
    assert!(hit.was_cache_hit());
    assert_eq!(hit.value().caption, "post 1");
    assert_eq!(store.read_count(), 1);
}
