//! The caller-facing facade over cache, coordinator and gates.
//!
//! [`ServiceCore`] owns the wiring that every handler needs and exposes the
//! four operations handlers build on: cache-aside reads, invalidating
//! writes, concurrent runs and paced admission. Store and cache handles are
//! passed in; nothing here is global.

use std::future::Future;
use std::sync::Arc;

use shutter_core::{EntityId, EntityKind, ShutterConfig, ShutterResult};
use shutter_exec::{CancellationToken, GateRegistry, JoinPolicy, Task, TaskCoordinator};
use shutter_storage::{
    open_cache_store, CacheAside, CacheKey, CacheStore, Cacheable, CachedRead, DurableStore,
    EntityCache, ListingCache,
};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shared wiring for the services.
#[derive(Clone)]
pub struct ServiceCore {
    config: ShutterConfig,
    cache: Arc<dyn CacheStore>,
    gates: GateRegistry,
    coordinator: TaskCoordinator,
    shutdown: CancellationToken,
}

impl ServiceCore {
    pub fn new(config: ShutterConfig, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            gates: GateRegistry::from_settings(&config.gates),
            coordinator: TaskCoordinator::from_settings(&config.exec),
            shutdown: CancellationToken::new(),
            cache,
            config,
        }
    }

    /// Open the configured cache backend and wire everything around it.
    ///
    /// # Errors
    ///
    /// Fails if the cache backend cannot be opened.
    pub async fn from_config(config: ShutterConfig) -> ShutterResult<Self> {
        let cache = open_cache_store(&config.cache).await?;
        Ok(Self::new(config, cache))
    }

    /// Tie gate waits and coordinated runs to `shutdown`: once it fires,
    /// waiting callers return `Cancelled` and running tasks are cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.coordinator = self.coordinator.with_parent(shutdown.clone());
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &ShutterConfig {
        &self.config
    }

    pub fn cache_store(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn gates(&self) -> &GateRegistry {
        &self.gates
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    pub fn entity_cache<T: Cacheable>(&self) -> EntityCache<T> {
        EntityCache::with_ttl(Arc::clone(&self.cache), self.config.cache.entity_ttl)
    }

    pub fn listing_cache<T: Cacheable>(&self) -> ListingCache<T> {
        ListingCache::with_ttl(Arc::clone(&self.cache), self.config.cache.listing_ttl)
    }

    pub fn cache_aside<T, S>(&self, store: Arc<S>) -> CacheAside<T, S>
    where
        T: Cacheable,
        S: DurableStore<T> + ?Sized,
    {
        CacheAside::new(self.entity_cache(), store)
    }

    /// Read entity `id` of type `T`, from the cache when possible.
    ///
    /// # Errors
    ///
    /// Durable store errors only; cache failures degrade to a store read.
    pub async fn cached_read<T, S>(&self, store: &Arc<S>, id: EntityId) -> ShutterResult<CachedRead<T>>
    where
        T: Cacheable,
        S: DurableStore<T> + ?Sized,
    {
        self.cache_aside(Arc::clone(store)).cached_read(id).await
    }

    /// Await `mutation`, then invalidate entity `id` of `kind`.
    ///
    /// The cache is only touched if the mutation succeeded; a failed
    /// invalidation is logged and the entry ages out with its TTL.
    pub async fn write_then_invalidate<Fut, R>(
        &self,
        kind: EntityKind,
        id: EntityId,
        mutation: Fut,
    ) -> ShutterResult<R>
    where
        Fut: Future<Output = ShutterResult<R>>,
    {
        let outcome = mutation.await?;

        let key = CacheKey::entity(kind, id);
        match self.cache.delete(&key).await {
            Ok(()) => debug!(%key, "invalidated after write"),
            Err(e) => warn!(%key, error = %e, "failed to invalidate after write"),
        }
        Ok(outcome)
    }

    /// Run `tasks` concurrently and join them under `policy`.
    pub async fn run_concurrent<T>(&self, tasks: Vec<Task<T>>, policy: JoinPolicy) -> ShutterResult<Vec<T>>
    where
        T: Send + 'static,
    {
        self.coordinator.run(tasks, policy).await
    }

    /// Wait for an admission slot on `gate`.
    ///
    /// # Errors
    ///
    /// - `GateError::Timeout` once the configured acquire timeout elapsed
    /// - `GateError::Cancelled` if shutdown fired while waiting
    pub async fn acquire(&self, gate: &str) -> ShutterResult<()> {
        let deadline = self.config.gates.acquire_timeout.map(|t| Instant::now() + t);
        self.gates
            .gate(gate)
            .acquire_cancellable(&self.shutdown, deadline)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ServiceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCore")
            .field("config", &self.config)
            .field("gates", &self.gates)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
