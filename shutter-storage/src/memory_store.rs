//! In-memory durable store.
//!
//! Implements [`DurableStore`] for posts and users plus [`UserStore`] and
//! [`EngagementStore`], with the same observable contract a relational
//! backend would have: ids are assigned on create, username/email uniqueness
//! is enforced on create, a like is unique per user and post, listings come
//! back newest first and posts are read with their likes and comments.
//! Deleting a post deletes its likes and comments. Used by tests and local
//! runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use shutter_core::{
    now, Comment, EntityId, EntityKind, Identified, Like, ListFilter, Listable, NewUser, Post,
    ShutterResult, StoreError, User,
};

use crate::store::{DurableStore, EngagementStore, UserStore};

/// One table of rows keyed by id.
#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<EntityId, T>,
    next_id: EntityId,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Identified + Listable + Clone> Table<T> {
    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert with a caller-chosen id, keeping the id sequence ahead of it.
    fn seed(&mut self, row: T) {
        let id = row.id();
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.rows.insert(id, row);
    }

    fn get(&self, id: EntityId) -> ShutterResult<T> {
        self.rows.get(&id).cloned().ok_or_else(|| {
            StoreError::NotFound {
                kind: T::kind(),
                id,
            }
            .into()
        })
    }

    fn replace(&mut self, row: T) -> ShutterResult<()> {
        match self.rows.get_mut(&row.id()) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: T::kind(),
                id: row.id(),
            }
            .into()),
        }
    }

    fn remove(&mut self, id: EntityId) -> ShutterResult<()> {
        self.rows.remove(&id).map(|_| ()).ok_or_else(|| {
            StoreError::NotFound {
                kind: T::kind(),
                id,
            }
            .into()
        })
    }

    fn count(&self, filter: &ListFilter) -> u64 {
        self.rows.values().filter(|row| row.matches(filter)).count() as u64
    }

    fn list(&self, filter: &ListFilter, offset: u64, limit: u32) -> Vec<T> {
        let mut matching: Vec<&T> = self.rows.values().filter(|row| row.matches(filter)).collect();
        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect()
    }
}

/// Durable store kept in process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    posts: RwLock<Table<Post>>,
    users: RwLock<Table<User>>,
    /// Password hashes by user id; never part of the cached `User`.
    credentials: RwLock<HashMap<EntityId, String>>,
    comments: RwLock<Table<Comment>>,
    /// Keyed by (post id, user id).
    likes: RwLock<BTreeMap<(EntityId, EntityId), Like>>,
    online: AtomicBool,
    reads: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            posts: RwLock::default(),
            users: RwLock::default(),
            credentials: RwLock::default(),
            comments: RwLock::default(),
            likes: RwLock::default(),
            online: AtomicBool::new(true),
            reads: AtomicU64::new(0),
        }
    }
}

fn poisoned(kind: &str) -> StoreError {
    StoreError::Unavailable {
        reason: format!("{kind} table lock poisoned"),
    }
}

fn read_lock<'a, T>(lock: &'a RwLock<T>, kind: &str) -> ShutterResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| poisoned(kind).into())
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, kind: &str) -> ShutterResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| poisoned(kind).into())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while offline every call fails with
    /// `StoreError::Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of single-entity reads served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Insert a post with its id as given. Likes and comments on the
    /// record are ignored.
    pub fn seed_post(&self, post: Post) -> ShutterResult<()> {
        write_lock(&self.posts, "post")?.seed(bare(post));
        Ok(())
    }

    /// Insert a user with its id as given.
    pub fn seed_user(&self, user: User) -> ShutterResult<()> {
        write_lock(&self.users, "user")?.seed(user);
        Ok(())
    }

    pub fn post_count(&self) -> ShutterResult<usize> {
        Ok(read_lock(&self.posts, "post")?.rows.len())
    }

    pub fn user_count(&self) -> ShutterResult<usize> {
        Ok(read_lock(&self.users, "user")?.rows.len())
    }

    pub fn like_count(&self) -> ShutterResult<usize> {
        Ok(read_lock(&self.likes, "like")?.len())
    }

    pub fn comment_count(&self) -> ShutterResult<usize> {
        Ok(read_lock(&self.comments, "comment")?.rows.len())
    }

    /// Stored password hash of user `id`.
    pub fn credential(&self, id: EntityId) -> ShutterResult<Option<String>> {
        Ok(read_lock(&self.credentials, "credential")?.get(&id).cloned())
    }

    fn ensure_online(&self) -> ShutterResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                reason: "store is offline".to_string(),
            }
            .into())
        }
    }

    fn ensure_post_exists(&self, post_id: EntityId) -> ShutterResult<()> {
        read_lock(&self.posts, "post")?.get(post_id).map(|_| ())
    }

    fn comments_on(comments: &Table<Comment>, post_id: EntityId) -> Vec<Comment> {
        let mut on_post: Vec<Comment> = comments
            .rows
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        on_post.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        on_post
    }

    /// Attach likes and comments to posts read from the table.
    fn with_engagement(&self, mut posts: Vec<Post>) -> ShutterResult<Vec<Post>> {
        let likes = read_lock(&self.likes, "like")?;
        let comments = read_lock(&self.comments, "comment")?;
        for post in &mut posts {
            post.likes = likes
                .range((post.id, EntityId::MIN)..=(post.id, EntityId::MAX))
                .map(|(_, like)| like.clone())
                .collect();
            post.comments = Self::comments_on(&comments, post.id);
        }
        Ok(posts)
    }

    fn ensure_unique(users: &Table<User>, username: &str, email: &str) -> ShutterResult<()> {
        let taken = users
            .rows
            .values()
            .any(|u| u.username == username || u.email == email);
        if taken {
            return Err(StoreError::Conflict {
                kind: EntityKind::User,
                reason: "username or email already exists".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Post row as stored: engagement lives in its own tables.
fn bare(mut post: Post) -> Post {
    post.likes.clear();
    post.comments.clear();
    post
}

#[async_trait]
impl DurableStore<Post> for InMemoryStore {
    async fn get(&self, id: EntityId) -> ShutterResult<Post> {
        self.ensure_online()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let post = read_lock(&self.posts, "post")?.get(id)?;
        let mut hydrated = self.with_engagement(vec![post])?;
        hydrated.pop().ok_or_else(|| StoreError::NotFound { kind: EntityKind::Post, id }.into())
    }

    async fn create(&self, post: Post) -> ShutterResult<Post> {
        self.ensure_online()?;
        let mut post = bare(post);
        let mut posts = write_lock(&self.posts, "post")?;
        let stamp = now();
        post.id = posts.allocate_id();
        post.created_at = stamp;
        post.updated_at = stamp;
        posts.rows.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update(&self, post: &Post) -> ShutterResult<()> {
        self.ensure_online()?;
        let mut row = bare(post.clone());
        row.updated_at = now();
        write_lock(&self.posts, "post")?.replace(row)
    }

    async fn delete(&self, id: EntityId) -> ShutterResult<()> {
        self.ensure_online()?;
        write_lock(&self.posts, "post")?.remove(id)?;
        write_lock(&self.likes, "like")?.retain(|(post_id, _), _| *post_id != id);
        write_lock(&self.comments, "comment")?
            .rows
            .retain(|_, comment| comment.post_id != id);
        Ok(())
    }

    async fn count(&self, filter: &ListFilter) -> ShutterResult<u64> {
        self.ensure_online()?;
        Ok(read_lock(&self.posts, "post")?.count(filter))
    }

    async fn list(&self, filter: &ListFilter, offset: u64, limit: u32) -> ShutterResult<Vec<Post>> {
        self.ensure_online()?;
        let page = read_lock(&self.posts, "post")?.list(filter, offset, limit);
        self.with_engagement(page)
    }
}

#[async_trait]
impl DurableStore<User> for InMemoryStore {
    async fn get(&self, id: EntityId) -> ShutterResult<User> {
        self.ensure_online()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        read_lock(&self.users, "user")?.get(id)
    }

    async fn create(&self, mut user: User) -> ShutterResult<User> {
        self.ensure_online()?;
        let mut users = write_lock(&self.users, "user")?;
        Self::ensure_unique(&users, &user.username, &user.email)?;
        let stamp = now();
        user.id = users.allocate_id();
        user.created_at = stamp;
        user.updated_at = stamp;
        users.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> ShutterResult<()> {
        self.ensure_online()?;
        let mut row = user.clone();
        row.updated_at = now();
        write_lock(&self.users, "user")?.replace(row)
    }

    async fn delete(&self, id: EntityId) -> ShutterResult<()> {
        self.ensure_online()?;
        write_lock(&self.users, "user")?.remove(id)?;
        write_lock(&self.credentials, "credential")?.remove(&id);
        Ok(())
    }

    async fn count(&self, filter: &ListFilter) -> ShutterResult<u64> {
        self.ensure_online()?;
        Ok(read_lock(&self.users, "user")?.count(filter))
    }

    async fn list(&self, filter: &ListFilter, offset: u64, limit: u32) -> ShutterResult<Vec<User>> {
        self.ensure_online()?;
        Ok(read_lock(&self.users, "user")?.list(filter, offset, limit))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> ShutterResult<Option<User>> {
        self.ensure_online()?;
        let users = read_lock(&self.users, "user")?;
        Ok(users
            .rows
            .values()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn find_login(&self, email: &str) -> ShutterResult<Option<(User, String)>> {
        self.ensure_online()?;
        let user = read_lock(&self.users, "user")?
            .rows
            .values()
            .find(|u| u.email == email)
            .cloned();
        let Some(user) = user else {
            return Ok(None);
        };
        let credential = read_lock(&self.credentials, "credential")?.get(&user.id).cloned();
        Ok(credential.map(|hash| (user, hash)))
    }

    async fn create_user(&self, new_user: NewUser) -> ShutterResult<User> {
        self.ensure_online()?;
        let mut users = write_lock(&self.users, "user")?;
        Self::ensure_unique(&users, &new_user.username, &new_user.email)?;

        let stamp = now();
        let user = User {
            id: users.allocate_id(),
            username: new_user.username,
            email: new_user.email,
            name: new_user.name,
            bio: String::new(),
            profile_image: String::new(),
            role: new_user.role,
            created_at: stamp,
            updated_at: stamp,
        };
        users.rows.insert(user.id, user.clone());
        write_lock(&self.credentials, "credential")?.insert(user.id, new_user.password_hash);
        Ok(user)
    }
}

#[async_trait]
impl EngagementStore for InMemoryStore {
    async fn add_like(&self, post_id: EntityId, user_id: EntityId) -> ShutterResult<Like> {
        self.ensure_online()?;
        self.ensure_post_exists(post_id)?;
        let mut likes = write_lock(&self.likes, "like")?;
        if likes.contains_key(&(post_id, user_id)) {
            return Err(StoreError::Conflict {
                kind: EntityKind::Like,
                reason: "post already liked".to_string(),
            }
            .into());
        }
        let like = Like {
            user_id,
            post_id,
            created_at: now(),
        };
        likes.insert((post_id, user_id), like.clone());
        Ok(like)
    }

    async fn remove_like(&self, post_id: EntityId, user_id: EntityId) -> ShutterResult<()> {
        self.ensure_online()?;
        write_lock(&self.likes, "like")?
            .remove(&(post_id, user_id))
            .map(|_| ())
            .ok_or_else(|| {
                StoreError::NotFound {
                    kind: EntityKind::Like,
                    id: post_id,
                }
                .into()
            })
    }

    async fn add_comment(&self, mut comment: Comment) -> ShutterResult<Comment> {
        self.ensure_online()?;
        self.ensure_post_exists(comment.post_id)?;
        let mut comments = write_lock(&self.comments, "comment")?;
        let stamp = now();
        comment.id = comments.allocate_id();
        comment.created_at = stamp;
        comment.updated_at = stamp;
        comments.rows.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: EntityId) -> ShutterResult<Comment> {
        self.ensure_online()?;
        read_lock(&self.comments, "comment")?.get(id)
    }

    async fn list_comments(&self, post_id: EntityId) -> ShutterResult<Vec<Comment>> {
        self.ensure_online()?;
        self.ensure_post_exists(post_id)?;
        let comments = read_lock(&self.comments, "comment")?;
        Ok(Self::comments_on(&comments, post_id))
    }

    async fn delete_comment(&self, id: EntityId) -> ShutterResult<()> {
        self.ensure_online()?;
        write_lock(&self.comments, "comment")?.remove(id)
    }
}
