//! Post Service
//!
//! Reads go through the `posts` gate and the cache. Listings are cached per
//! page and size and are NOT invalidated when a post changes: a cached page
//! may lag the store by up to the listing TTL, so a new post can take that
//! long to show up in a cached listing. Single-post reads never lag, since
//! every mutation invalidates the post's own entry.
//!
//! A post is read together with its likes and comments, so liking,
//! unliking, commenting and deleting a comment invalidate the post too.

use std::sync::Arc;

use shutter_core::constants::POSTS_GATE;
use shutter_core::{
    now, Comment, ContentType, EntityId, EntityKind, Like, ListFilter, Page, Post, PostImage,
    PostUpdate, PurchaseOption, ShutterResult,
};
use shutter_exec::{JoinPolicy, Task};
use shutter_storage::{CachedRead, DurableStore, EngagementStore, ListingCache};
use tracing::{debug, info, warn};

use crate::requests::{CommentRequest, CreatePostRequest, ListQuery};
use crate::service_core::ServiceCore;
use crate::validation::ensure_owner;

pub struct PostService<S: ?Sized> {
    core: ServiceCore,
    store: Arc<S>,
    listings: ListingCache<Post>,
}

impl<S> PostService<S>
where
    S: DurableStore<Post> + ?Sized + 'static,
{
    pub fn new(core: ServiceCore, store: Arc<S>) -> Self {
        Self {
            listings: core.listing_cache(),
            core,
            store,
        }
    }

    /// Post `id`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if there is no such post
    /// - `GateError` if no admission slot was granted
    pub async fn get_post(&self, id: EntityId) -> ShutterResult<CachedRead<Post>> {
        self.core.acquire(POSTS_GATE).await?;
        self.core.cached_read(&self.store, id).await
    }

    /// One page of all posts, newest first.
    ///
    /// On a cache miss the total count and the page rows are fetched
    /// concurrently; either failing fails the listing.
    pub async fn list_posts(&self, query: ListQuery) -> ShutterResult<CachedRead<Page<Post>>> {
        self.core.acquire(POSTS_GATE).await?;
        let (page, page_size) = query.resolve();

        if let Some(cached) = self.listings.get(page, page_size).await {
            return Ok(CachedRead::from_cache(cached));
        }

        let filter = ListFilter::all();
        let counting = {
            let store = Arc::clone(&self.store);
            let filter = filter.clone();
            Task::new(move |ctx| async move { ctx.guard(store.count(&filter)).await })
        };
        let fetching = {
            let store = Arc::clone(&self.store);
            let offset = Page::<Post>::offset(page, page_size);
            Task::new(move |ctx| async move {
                ctx.guard(store.list(&filter, offset, page_size)).await
            })
        };

        let (total, items) = self
            .core
            .coordinator()
            .run_pair(counting, fetching, JoinPolicy::FirstErrorWins)
            .await?;

        let listing = Page::new(items, total, page, page_size);
        if let Err(e) = self.listings.put(&listing).await {
            warn!(page, page_size, error = %e, "failed to cache listing");
        }
        Ok(CachedRead::from_store(listing))
    }

    /// Publish a post owned by `caller_id`.
    ///
    /// Existing cached listings are left alone (see the module docs).
    pub async fn create_post(&self, caller_id: EntityId, request: CreatePostRequest) -> ShutterResult<Post> {
        let content_type = request.validate()?;

        let stamp = now();
        let draft = Post {
            id: 0,
            user_id: caller_id,
            caption: request.caption,
            content_type,
            video_url: request.video_url.filter(|_| content_type == ContentType::Reel),
            live_stream_url: request
                .live_stream_url
                .filter(|_| content_type == ContentType::Live),
            location: request.location.filter(|l| !l.trim().is_empty()),
            images: match content_type {
                ContentType::Feed => request
                    .image_urls
                    .into_iter()
                    .map(|image_url| PostImage { image_url })
                    .collect(),
                _ => vec![],
            },
            purchase_options: request
                .purchase_options
                .into_iter()
                .map(|o| PurchaseOption {
                    platform: o.platform,
                    url: o.url,
                })
                .collect(),
            likes: vec![],
            comments: vec![],
            created_at: stamp,
            updated_at: stamp,
        };

        let post = self.store.create(draft).await?;
        info!(post_id = post.id, user_id = caller_id, content_type = ?post.content_type, "post created");
        Ok(post)
    }

    /// Change caption and location of post `id`. Owner only.
    pub async fn update_post(&self, caller_id: EntityId, id: EntityId, update: PostUpdate) -> ShutterResult<Post> {
        let mut post = self.store.get(id).await?;
        ensure_owner(post.user_id, caller_id, "update", EntityKind::Post, id)?;

        post.caption = update.caption;
        post.location = update.location;

        let store = Arc::clone(&self.store);
        let saved = post.clone();
        self.core
            .write_then_invalidate(EntityKind::Post, id, async move { store.update(&saved).await })
            .await?;

        debug!(post_id = id, "post updated");
        Ok(post)
    }

    /// Delete post `id`. Owner only.
    pub async fn delete_post(&self, caller_id: EntityId, id: EntityId) -> ShutterResult<()> {
        let post = self.store.get(id).await?;
        ensure_owner(post.user_id, caller_id, "delete", EntityKind::Post, id)?;

        let store = Arc::clone(&self.store);
        self.core
            .write_then_invalidate(EntityKind::Post, id, async move { store.delete(id).await })
            .await?;

        info!(post_id = id, "post deleted");
        Ok(())
    }
}

impl<S> PostService<S>
where
    S: DurableStore<Post> + EngagementStore + ?Sized + 'static,
{
    /// Like post `post_id` as `caller_id`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if there is no such post
    /// - `StoreError::Conflict` if the caller already likes it
    pub async fn like_post(&self, caller_id: EntityId, post_id: EntityId) -> ShutterResult<Like> {
        let store = Arc::clone(&self.store);
        let like = self
            .core
            .write_then_invalidate(EntityKind::Post, post_id, async move {
                store.add_like(post_id, caller_id).await
            })
            .await?;
        debug!(post_id, user_id = caller_id, "post liked");
        Ok(like)
    }

    /// # Errors
    ///
    /// `StoreError::NotFound` (like) if the caller does not like the post.
    pub async fn unlike_post(&self, caller_id: EntityId, post_id: EntityId) -> ShutterResult<()> {
        let store = Arc::clone(&self.store);
        self.core
            .write_then_invalidate(EntityKind::Post, post_id, async move {
                store.remove_like(post_id, caller_id).await
            })
            .await?;
        debug!(post_id, user_id = caller_id, "post unliked");
        Ok(())
    }

    /// Comment on post `post_id` as `caller_id`.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidValue` for empty or overlong content
    /// - `StoreError::NotFound` if there is no such post
    pub async fn add_comment(
        &self,
        caller_id: EntityId,
        post_id: EntityId,
        request: CommentRequest,
    ) -> ShutterResult<Comment> {
        request.validate()?;

        let stamp = now();
        let draft = Comment {
            id: 0,
            post_id,
            user_id: caller_id,
            content: request.content,
            created_at: stamp,
            updated_at: stamp,
        };
        let store = Arc::clone(&self.store);
        let comment = self
            .core
            .write_then_invalidate(EntityKind::Post, post_id, async move {
                store.add_comment(draft).await
            })
            .await?;

        info!(comment_id = comment.id, post_id, user_id = caller_id, "comment added");
        Ok(comment)
    }

    /// Comments on post `post_id`, newest first.
    ///
    /// Served from the post's cache entry when present; paced like every
    /// other post read.
    pub async fn list_comments(&self, post_id: EntityId) -> ShutterResult<CachedRead<Vec<Comment>>> {
        Ok(self.get_post(post_id).await?.map(|post| post.comments))
    }

    /// Delete comment `comment_id`. Only its author may.
    pub async fn delete_comment(&self, caller_id: EntityId, comment_id: EntityId) -> ShutterResult<()> {
        let comment = self.store.get_comment(comment_id).await?;
        ensure_owner(comment.user_id, caller_id, "delete", EntityKind::Comment, comment_id)?;

        let store = Arc::clone(&self.store);
        self.core
            .write_then_invalidate(EntityKind::Post, comment.post_id, async move {
                store.delete_comment(comment_id).await
            })
            .await?;

        info!(comment_id, post_id = comment.post_id, "comment deleted");
        Ok(())
    }
}

impl<S: ?Sized> Clone for PostService<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            store: Arc::clone(&self.store),
            listings: self.listings.clone(),
        }
    }
}
