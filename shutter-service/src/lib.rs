//! Shutter Service - Caller-Facing Layer
//!
//! [`ServiceCore`] is the facade handlers build on: cache-aside reads,
//! invalidating writes, coordinated concurrent runs and paced admission.
//! [`PostService`] and [`UserService`] are the handler-level operations of
//! the backend expressed on top of it: posts with their likes and comments,
//! and accounts with registration and login.
//!
//! # Example
//!
//! ```ignore
//! let config = ShutterConfig::from_env();
//! init_tracing(&TelemetryConfig::from_config(&config));
//!
//! let core = ServiceCore::from_config(config).await?;
//! let store = Arc::new(InMemoryStore::new());
//! let posts = PostService::new(core.clone(), Arc::clone(&store));
//! let page = posts.list_posts(ListQuery::default()).await?;
//! ```

pub mod hasher;
pub mod posts;
pub mod requests;
pub mod service_core;
pub mod telemetry;
pub mod tokens;
pub mod users;
pub mod validation;

pub use hasher::{Argon2Hasher, CredentialHasher};
pub use posts::PostService;
pub use requests::{
    CommentRequest, CreatePostRequest, ListQuery, LoginRequest, LoginResponse,
    PurchaseOptionRequest, RegisterRequest,
};
pub use service_core::ServiceCore;
pub use telemetry::{init_tracing, TelemetryConfig};
pub use tokens::{Claims, JwtIssuer, TokenIssuer};
pub use users::UserService;
