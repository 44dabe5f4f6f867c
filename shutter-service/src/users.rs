//! User Service
//!
//! Profile reads and updates through the cache-aside path, registration as a
//! coordinated run of the uniqueness check and password hashing, and login.

use std::sync::Arc;

use shutter_core::constants::AUTH_GATE;
use shutter_core::{
    AuthError, EntityId, EntityKind, NewUser, ProfileUpdate, ShutterResult, StoreError, User,
};
use shutter_exec::{JoinPolicy, Task};
use shutter_storage::{CachedRead, DurableStore, UserStore};
use tracing::{debug, info, warn};

use crate::hasher::CredentialHasher;
use crate::requests::{LoginRequest, LoginResponse, RegisterRequest};
use crate::service_core::ServiceCore;
use crate::tokens::{JwtIssuer, TokenIssuer};
use crate::validation::ensure_owner;

pub struct UserService<S: ?Sized> {
    core: ServiceCore,
    store: Arc<S>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenIssuer>,
}

impl<S> UserService<S>
where
    S: UserStore + ?Sized + 'static,
{
    /// Tokens are signed with the configured JWT secret; see
    /// [`with_token_issuer`](Self::with_token_issuer) to replace that.
    pub fn new(core: ServiceCore, store: Arc<S>, hasher: Arc<dyn CredentialHasher>) -> Self {
        let tokens: Arc<dyn TokenIssuer> = Arc::new(JwtIssuer::from_settings(&core.config().auth));
        Self {
            core,
            store,
            hasher,
            tokens,
        }
    }

    pub fn with_token_issuer(mut self, tokens: Arc<dyn TokenIssuer>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Profile of user `id`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if there is no such user.
    pub async fn get_user(&self, id: EntityId) -> ShutterResult<CachedRead<User>> {
        self.core.cached_read(&self.store, id).await
    }

    /// Replace name, bio and profile image of user `id`.
    ///
    /// Only the user themselves may do this.
    pub async fn update_profile(
        &self,
        caller_id: EntityId,
        id: EntityId,
        update: ProfileUpdate,
    ) -> ShutterResult<User> {
        let mut user = DurableStore::<User>::get(&*self.store, id).await?;
        ensure_owner(user.id, caller_id, "update", EntityKind::User, id)?;

        user.name = update.name;
        user.bio = update.bio;
        user.profile_image = update.profile_image;

        let store = Arc::clone(&self.store);
        let saved = user.clone();
        self.core
            .write_then_invalidate(EntityKind::User, id, async move {
                DurableStore::<User>::update(&*store, &saved).await
            })
            .await?;

        debug!(user_id = id, "profile updated");
        Ok(user)
    }

    /// Create an account.
    ///
    /// Paced by the `auth` gate. The uniqueness check and password hashing
    /// run concurrently under first-error-wins: a conflict cancels the
    /// hashing and nothing is created.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidValue` for a malformed request
    /// - `StoreError::Conflict` if the username or email is taken
    /// - `GateError` if no admission slot was granted
    pub async fn register(&self, request: RegisterRequest) -> ShutterResult<User> {
        self.core.acquire(AUTH_GATE).await?;
        let role = request.validate()?;

        let uniqueness = {
            let store = Arc::clone(&self.store);
            let username = request.username.clone();
            let email = request.email.clone();
            Task::new(move |ctx| async move {
                let existing = ctx
                    .guard(store.find_by_username_or_email(&username, &email))
                    .await?;
                match existing {
                    Some(_) => Err(StoreError::Conflict {
                        kind: EntityKind::User,
                        reason: "username or email already exists".to_string(),
                    }
                    .into()),
                    None => Ok(()),
                }
            })
        };
        let hashing = {
            let hasher = Arc::clone(&self.hasher);
            let password = request.password.clone();
            Task::new(move |ctx| async move { hasher.hash(&password, &ctx).await })
        };

        let ((), password_hash) = self
            .core
            .coordinator()
            .run_pair(uniqueness, hashing, JoinPolicy::FirstErrorWins)
            .await?;

        // The store re-checks uniqueness, closing the window between the
        // lookup above and this insert.
        let user = self
            .store
            .create_user(NewUser {
                username: request.username,
                email: request.email,
                name: request.name,
                role,
                password_hash,
            })
            .await?;

        info!(user_id = user.id, role = ?user.role, "user registered");
        Ok(user)
    }

    /// Exchange email and password for an access token.
    ///
    /// Not paced. On success the profile is written to the cache, since a
    /// profile read usually follows.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidValue` for a malformed request
    /// - `AuthError::InvalidCredentials` for an unknown email or a wrong
    ///   password, without saying which
    pub async fn login(&self, request: LoginRequest) -> ShutterResult<LoginResponse> {
        request.validate()?;

        let Some((user, credential)) = self.store.find_login(request.email.trim()).await? else {
            debug!("login for unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };
        if !self.hasher.verify(&request.password, &credential).await? {
            debug!(user_id = user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.tokens.issue(&user)?;
        if let Err(e) = self.core.entity_cache::<User>().put(&user).await {
            warn!(user_id = user.id, error = %e, "failed to cache user after login");
        }

        info!(user_id = user.id, "user logged in");
        Ok(LoginResponse { token, user })
    }
}

impl<S: ?Sized> Clone for UserService<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            store: Arc::clone(&self.store),
            hasher: Arc::clone(&self.hasher),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Argon2Hasher;
    use shutter_core::{ShutterConfig, UserRole};
    use shutter_storage::{CacheStore, InMemoryCacheStore, InMemoryStore};

    fn fast_hasher() -> Argon2Hasher {
        Argon2Hasher::with_params(8 * 1024, 1, 1).unwrap()
    }

    fn service() -> (UserService<InMemoryStore>, Arc<InMemoryStore>) {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let core = ServiceCore::new(ShutterConfig::default(), cache);
        let store = Arc::new(InMemoryStore::new());
        let hasher: Arc<dyn CredentialHasher> = Arc::new(fast_hasher());
        (UserService::new(core, Arc::clone(&store), hasher), store)
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn request(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "secret1".to_string(),
            name: "Someone".to_string(),
            role: "buyer".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_stores_hashed_credential() {
        let (service, store) = service();
        let user = service.register(request("alice")).await.unwrap();

        assert_eq!(user.role, UserRole::Buyer);
        let credential = store.credential(user.id).unwrap().unwrap();
        assert_ne!(credential, "secret1");
        assert!(credential.starts_with("$argon2id$"));
        assert!(fast_hasher().verify("secret1", &credential).await.unwrap());
    }

    #[tokio::test]
    async fn test_login_issues_token_and_warms_cache() {
        let (service, _store) = service();
        let user = service.register(request("erin")).await.unwrap();

        let response = service.login(login("erin@example.com", "secret1")).await.unwrap();
        assert_eq!(response.user, user);

        let issuer = JwtIssuer::from_settings(&ShutterConfig::default().auth);
        let claims = issuer.validate(&response.token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, UserRole::Buyer);

        assert!(service.get_user(user.id).await.unwrap().was_cache_hit());
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let (service, _store) = service();
        service.register(request("frank")).await.unwrap();

        let wrong_password = service
            .login(login("frank@example.com", "secret2"))
            .await
            .unwrap_err();
        let unknown_email = service
            .login(login("nobody@example.com", "secret1"))
            .await
            .unwrap_err();
        assert!(wrong_password.is_invalid_credentials());
        assert_eq!(wrong_password, unknown_email);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_request_before_any_work() {
        let (service, store) = service();
        let mut bad = request("bob");
        bad.password = "123".to_string();

        assert!(service.register(bad).await.is_err());
        assert_eq!(store.user_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_profile_invalidates_cached_profile() {
        let (service, _store) = service();
        let user = service.register(request("carol")).await.unwrap();

        let cached = service.get_user(user.id).await.unwrap();
        assert!(cached.was_cache_miss());
        assert!(service.get_user(user.id).await.unwrap().was_cache_hit());

        let update = ProfileUpdate {
            name: "Carol C".to_string(),
            bio: "hello".to_string(),
            profile_image: "https://cdn/c.jpg".to_string(),
        };
        service.update_profile(user.id, user.id, update).await.unwrap();

        let fresh = service.get_user(user.id).await.unwrap();
        assert!(fresh.was_cache_miss());
        assert_eq!(fresh.value().bio, "hello");
    }

    #[tokio::test]
    async fn test_update_profile_of_someone_else_is_forbidden() {
        let (service, _store) = service();
        let user = service.register(request("dave")).await.unwrap();

        let err = service
            .update_profile(user.id + 1, user.id, ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            shutter_core::ShutterError::Validation(shutter_core::ValidationError::Forbidden { .. })
        ));
    }
}
