//! Register, login, logout and password change.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use chorus_core::config::auth::AuthConfig;
use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_core::types::UserId;
use chorus_database::UserRepository;
use chorus_entity::session::{Session, TokenPair};
use chorus_entity::user::{CreateUser, User, UserRole};

use crate::password::{PasswordHasher, PasswordValidator};
use crate::session::SessionRegistry;
use crate::token::TokenService;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Input for [`AccountService::register`]. Shape checks (email syntax,
/// username charset) happen at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// A user together with freshly issued tokens.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    sessions: Arc<SessionRegistry>,
    hasher: PasswordHasher,
    validator: PasswordValidator,
}

impl AccountService {
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            users,
            tokens,
            sessions,
            hasher: PasswordHasher::new(),
            validator: PasswordValidator::new(config),
        }
    }

    pub async fn register(&self, input: RegisterInput) -> AppResult<AuthOutcome> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        self.validator
            .validate(&input.password, &[username.as_str(), email.as_str()])?;

        let password_hash = self.hasher.hash(&input.password)?;
        let user = self
            .users
            .create(&CreateUser {
                username,
                email,
                password_hash,
                role: UserRole::Member,
            })
            .await?;

        let tokens = self.tokens.issue_token_pair(&user).await?;
        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(AuthOutcome { user, tokens })
    }

    /// Log in by username or email. Every failure reads the same to the caller.
    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<AuthOutcome> {
        let identifier = identifier.trim();
        let found = if identifier.contains('@') {
            self.users.find_by_email(identifier).await?
        } else {
            self.users.find_by_username(identifier).await?
        };

        let Some(user) = found else {
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        };
        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        }
        if !user.is_active() {
            warn!(user_id = %user.id, "Login failed: account disabled");
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        }

        let now = Utc::now();
        self.users.update_last_login(user.id, now).await?;
        let tokens = self.tokens.issue_token_pair(&user).await?;
        info!(user_id = %user.id, "User logged in");
        Ok(AuthOutcome {
            user: User {
                last_login_at: Some(now),
                ..user
            },
            tokens,
        })
    }

    /// Revoke the refresh token of this device.
    pub async fn logout(&self, user_id: UserId, refresh_token: &str) -> AppResult<()> {
        self.tokens.invalidate_one(user_id, refresh_token).await
    }

    /// Revoke every refresh token and end every session of a user. Returns
    /// the ended sessions so callers can drop their live connections.
    pub async fn logout_all(&self, user_id: UserId) -> AppResult<Vec<Session>> {
        self.tokens.invalidate_all_user_tokens(user_id).await?;
        let ended = self.sessions.end_all_user_sessions(user_id).await?;
        info!(user_id = %user_id, sessions = ended.len(), "User logged out everywhere");
        Ok(ended)
    }

    /// Change a password after verifying the current one. All refresh tokens
    /// are revoked and all sessions ended; the ended sessions are returned.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<Vec<Session>> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !self.hasher.verify(current_password, &user.password_hash)? {
            return Err(AppError::authentication("Current password is incorrect"));
        }
        self.validator
            .validate_not_same(current_password, new_password)?;
        self.validator
            .validate(new_password, &[user.username.as_str(), user.email.as_str()])?;

        let hash = self.hasher.hash(new_password)?;
        self.users.update_password(user_id, &hash).await?;
        info!(user_id = %user_id, "Password changed");

        self.logout_all(user_id).await
    }

    pub async fn find_user(&self, user_id: UserId) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_cache::CacheManager;
    use chorus_cache::memory::MemoryCacheProvider;
    use chorus_core::ErrorKind;
    use chorus_core::config::cache::MemoryCacheConfig;
    use chorus_core::config::session::SessionConfig;
    use chorus_core::types::ConnectionId;
    use chorus_database::{MemorySessionRepository, MemoryUserRepository};
    use chorus_entity::user::UserStatus;

    const PASSWORD: &str = "Tr0ub4dor&3-staple";
    const NEW_PASSWORD: &str = "N3w-Sp4rkling-Harbor!";

    struct Fixture {
        accounts: AccountService,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionRegistry>,
        users: Arc<MemoryUserRepository>,
    }

    fn fixture() -> Fixture {
        let config = AuthConfig::with_secret("0123456789abcdef0123456789abcdef");
        let cache = Arc::new(CacheManager::from_provider(Arc::new(
            MemoryCacheProvider::new(&MemoryCacheConfig { max_capacity: 10_000 }),
        )));
        let users = Arc::new(MemoryUserRepository::new());
        let tokens = Arc::new(TokenService::new(&config, cache.clone(), users.clone()));
        let sessions = Arc::new(SessionRegistry::new(
            &SessionConfig::default(),
            Arc::new(MemorySessionRepository::new()),
            cache,
        ));
        let accounts = AccountService::new(&config, users.clone(), tokens.clone(), sessions.clone());
        Fixture {
            accounts,
            tokens,
            sessions,
            users,
        }
    }

    fn alice() -> RegisterInput {
        RegisterInput {
            username: "alice".to_string(),
            email: "Alice@Example.com".to_string(),
            password: PASSWORD.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let f = fixture();
        let registered = f.accounts.register(alice()).await.unwrap();
        assert_eq!(registered.user.email, "alice@example.com");

        let by_name = f.accounts.login("alice", PASSWORD).await.unwrap();
        assert_eq!(by_name.user.id, registered.user.id);
        assert!(by_name.user.last_login_at.is_some());

        let by_email = f.accounts.login("ALICE@example.com", PASSWORD).await.unwrap();
        assert_eq!(by_email.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password_and_duplicates() {
        let f = fixture();
        let weak = RegisterInput {
            password: "password".to_string(),
            ..alice()
        };
        assert_eq!(
            f.accounts.register(weak).await.unwrap_err().kind,
            ErrorKind::Validation
        );

        f.accounts.register(alice()).await.unwrap();
        assert_eq!(
            f.accounts.register(alice()).await.unwrap_err().kind,
            ErrorKind::Conflict
        );
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let f = fixture();
        let user = f.accounts.register(alice()).await.unwrap().user;

        let unknown = f.accounts.login("bob", PASSWORD).await.unwrap_err();
        let wrong = f.accounts.login("alice", "not-the-password").await.unwrap_err();
        f.users.set_status(user.id, UserStatus::Disabled).await.unwrap();
        let disabled = f.accounts.login("alice", PASSWORD).await.unwrap_err();

        for err in [unknown, wrong, disabled] {
            assert_eq!(err.kind, ErrorKind::Authentication);
            assert_eq!(err.message, INVALID_CREDENTIALS);
        }
    }

    #[tokio::test]
    async fn test_change_password_revokes_everything() {
        let f = fixture();
        let outcome = f.accounts.register(alice()).await.unwrap();
        let user_id = outcome.user.id;
        let device_b = f.accounts.login("alice", PASSWORD).await.unwrap();
        f.sessions
            .create_session(user_id, ConnectionId::new(), None, None)
            .await
            .unwrap();

        let ended = f
            .accounts
            .change_password(user_id, PASSWORD, NEW_PASSWORD)
            .await
            .unwrap();
        assert_eq!(ended.len(), 1);

        assert!(f.tokens.refresh(&outcome.tokens.refresh_token).await.is_err());
        assert!(f.tokens.refresh(&device_b.tokens.refresh_token).await.is_err());
        assert!(f.accounts.login("alice", PASSWORD).await.is_err());
        f.accounts.login("alice", NEW_PASSWORD).await.unwrap();
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let f = fixture();
        let user_id = f.accounts.register(alice()).await.unwrap().user.id;
        let err = f
            .accounts
            .change_password(user_id, "wrong-current", NEW_PASSWORD)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);

        let err = f
            .accounts
            .change_password(user_id, PASSWORD, PASSWORD)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_logout_revokes_one_device() {
        let f = fixture();
        let a = f.accounts.register(alice()).await.unwrap();
        let b = f.accounts.login("alice", PASSWORD).await.unwrap();

        f.accounts
            .logout(a.user.id, &a.tokens.refresh_token)
            .await
            .unwrap();
        assert!(f.tokens.refresh(&a.tokens.refresh_token).await.is_err());
        f.tokens.refresh(&b.tokens.refresh_token).await.unwrap();
    }
}
