//! User service
//!
//! Accounts, login sessions and password management:
//! - registration (the first account becomes admin)
//! - login with username or email, JWT issuance and revocation
//! - admin role changes and account deletion
//! - password change and token-based password reset

use crate::db::repositories::{is_unique_violation, SessionRepository, UserRepository};
use crate::models::{now, CreateUserInput, Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::TokenIssuer;
use crate::services::with_deadline;
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a password reset token stays valid
const RESET_TOKEN_TTL_HOURS: i64 = 1;

const INVALID_CREDENTIALS: &str = "invalid credentials";
const IN_USE: &str = "username or email already in use";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Bad credentials or a rejected password
    #[error("{0}")]
    Unauthorized(String),

    /// Username or email taken
    #[error("{0}")]
    AlreadyInUse(String),

    #[error("{0}")]
    NotFound(String),

    /// Invalid input
    #[error("{0}")]
    InvalidArgument(String),

    #[error("store operation timed out after {0}s")]
    Timeout(u64),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Login request body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

/// Successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: i64,
}

/// User service for managing users and authentication
pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    tokens: Arc<TokenIssuer>,
    op_timeout: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        tokens: Arc<TokenIssuer>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            op_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, UserServiceError> {
        with_deadline(self.op_timeout, fut, UserServiceError::Timeout).await
    }

    /// Register a new account.
    ///
    /// The role is decided by the store: `admin` if no account existed yet,
    /// `user` otherwise.
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        if username.is_empty() || email.is_empty() || input.password.trim().is_empty() {
            return Err(UserServiceError::InvalidArgument(
                "username, email and password are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(UserServiceError::InvalidArgument(
                "email address is invalid".to_string(),
            ));
        }

        if self.bounded(self.users.get_by_username(&username)).await?.is_some()
            || self.bounded(self.users.get_by_email(&email)).await?.is_some()
        {
            warn!(%username, "registration rejected: username or email taken");
            return Err(UserServiceError::AlreadyInUse(IN_USE.to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let candidate = User::new(username, email, password_hash, UserRole::User);

        // A concurrent sign-up can still win the race past the pre-check.
        let user = self
            .bounded(self.users.register(&candidate))
            .await
            .map_err(|e| match e {
                UserServiceError::Store(err) if is_unique_violation(&err) => {
                    UserServiceError::AlreadyInUse(IN_USE.to_string())
                }
                other => other,
            })?;

        info!(user_id = %user.id, username = %user.username, role = %user.role, "user registered");
        Ok(user)
    }

    /// Check credentials and issue an access token.
    pub async fn login(&self, input: LoginInput) -> Result<LoginResponse, UserServiceError> {
        let login = input.login.trim();
        if login.is_empty() || input.password.is_empty() {
            return Err(UserServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let user = match self.bounded(self.users.get_by_login(login)).await? {
            Some(user) => user,
            None => {
                warn!(login, "login failed: unknown account");
                return Err(UserServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
        };

        if !verify_password(&input.password, &user.password_hash)? {
            warn!(user_id = %user.id, "login failed: wrong password");
            return Err(UserServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let issued = self
            .tokens
            .issue(user.id, user.role)
            .map_err(|e| UserServiceError::Store(e.into()))?;

        let session = Session {
            id: issued.jti.clone(),
            user_id: user.id,
            expires_at: issued.expires_at,
            created_at: issued.issued_at,
        };
        self.bounded(self.sessions.create(&session)).await?;

        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse {
            token: issued.token,
            expires_in: issued.expires_in,
        })
    }

    /// Resolve a bearer token to its user.
    ///
    /// Returns `None` for a bad signature, an expired token, a revoked
    /// session or a deleted account.
    pub async fn validate_token(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "token rejected");
                return Ok(None);
            }
        };

        let user_id = match Uuid::parse_str(&claims.sub) {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };

        let session = match self.bounded(self.sessions.get_by_id(&claims.jti)).await? {
            Some(session) => session,
            None => {
                debug!(%user_id, "token rejected: session revoked");
                return Ok(None);
            }
        };
        if session.user_id != user_id || session.is_expired() {
            return Ok(None);
        }

        self.bounded(self.users.get_by_id(user_id)).await
    }

    /// Revoke every session of the user.
    pub async fn logout(&self, user_id: Uuid) -> Result<u64, UserServiceError> {
        let removed = self.bounded(self.sessions.delete_by_user(user_id)).await?;
        info!(%user_id, sessions = removed, "user logged out");
        Ok(removed)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, UserServiceError> {
        self.bounded(self.users.get_by_id(user_id))
            .await?
            .ok_or_else(|| UserServiceError::NotFound("user not found".to_string()))
    }

    /// List all accounts, oldest first.
    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        self.bounded(self.users.list()).await
    }

    /// Set a user's role. `role` must be `admin` or `user`.
    pub async fn promote_user(&self, user_id: Uuid, role: &str) -> Result<User, UserServiceError> {
        if role.trim().is_empty() {
            return Err(UserServiceError::InvalidArgument("role is required".to_string()));
        }
        let role: UserRole = role
            .parse()
            .map_err(|_| UserServiceError::InvalidArgument("role must be admin or user".to_string()))?;

        if !self.bounded(self.users.update_role(user_id, role)).await? {
            return Err(UserServiceError::NotFound("user not found".to_string()));
        }

        info!(%user_id, %role, "user role updated");
        self.get_user(user_id).await
    }

    /// Delete an account. Its sessions go with it; its posts and reactions stay.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), UserServiceError> {
        if !self.bounded(self.users.delete(user_id)).await? {
            return Err(UserServiceError::NotFound("user not found".to_string()));
        }
        info!(%user_id, "user deleted");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        if new_password.trim().is_empty() {
            return Err(UserServiceError::InvalidArgument(
                "new password is required".to_string(),
            ));
        }

        let user = self.get_user(user_id).await?;
        if !verify_password(old_password, &user.password_hash)? {
            warn!(%user_id, "password change rejected");
            return Err(UserServiceError::Unauthorized(
                "old password is incorrect".to_string(),
            ));
        }

        let hash = hash_password(new_password)?;
        self.bounded(self.users.update_password(user_id, &hash)).await?;
        info!(%user_id, "password changed");
        Ok(())
    }

    /// Store a one-hour reset token for the account with `email`.
    ///
    /// The token is returned to the caller; delivering it is not this
    /// service's job.
    pub async fn forgot_password(&self, email: &str) -> Result<String, UserServiceError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(UserServiceError::InvalidArgument("email is required".to_string()));
        }

        let user = self
            .bounded(self.users.get_by_email(email))
            .await?
            .ok_or_else(|| UserServiceError::NotFound("user not found".to_string()))?;

        let token = Uuid::new_v4().to_string();
        let expiry = now() + ChronoDuration::hours(RESET_TOKEN_TTL_HOURS);
        self.bounded(self.users.set_reset_token(user.id, &token, expiry))
            .await?;

        info!(user_id = %user.id, "password reset requested");
        Ok(token)
    }

    /// Set a new password using a reset token, then revoke all sessions.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        if new_password.trim().is_empty() {
            return Err(UserServiceError::InvalidArgument(
                "new password is required".to_string(),
            ));
        }

        let invalid = || UserServiceError::InvalidArgument("invalid or expired reset token".to_string());

        let token = token.trim();
        if token.is_empty() {
            return Err(invalid());
        }

        let user = self
            .bounded(self.users.get_by_reset_token(token))
            .await?
            .ok_or_else(invalid)?;

        match user.reset_token_expiry {
            Some(expiry) if expiry > now() => {}
            _ => {
                warn!(user_id = %user.id, "expired reset token used");
                return Err(invalid());
            }
        }

        let hash = hash_password(new_password)?;
        self.bounded(self.users.update_password(user.id, &hash)).await?;
        self.bounded(self.sessions.delete_by_user(user.id)).await?;

        info!(user_id = %user.id, "password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            Arc::new(TokenIssuer::new("test-secret", ChronoDuration::hours(72))),
            Duration::from_secs(5),
        );
        (pool, service)
    }

    fn signup(name: &str) -> CreateUserInput {
        CreateUserInput {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "password123".to_string(),
        }
    }

    fn login(name: &str, password: &str) -> LoginInput {
        LoginInput {
            login: name.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_is_admin_second_is_user() {
        let (_pool, service) = setup().await;
        let first = service.register(signup("alice")).await.unwrap();
        let second = service.register(signup("bob")).await.unwrap();
        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_duplicate_username_or_email_rejected() {
        let (_pool, service) = setup().await;
        service.register(signup("alice")).await.unwrap();

        let same_name = CreateUserInput {
            email: "other@example.com".to_string(),
            ..signup("alice")
        };
        let err = service.register(same_name).await.unwrap_err();
        assert!(matches!(err, UserServiceError::AlreadyInUse(ref m) if m == IN_USE));

        let same_email = CreateUserInput {
            username: "alice2".to_string(),
            ..signup("alice")
        };
        assert!(matches!(
            service.register(same_email).await,
            Err(UserServiceError::AlreadyInUse(_))
        ));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup().await;
        let blank = CreateUserInput {
            username: "  ".to_string(),
            ..signup("x")
        };
        assert!(matches!(
            service.register(blank).await,
            Err(UserServiceError::InvalidArgument(_))
        ));

        let bad_email = CreateUserInput {
            email: "nope".to_string(),
            ..signup("x")
        };
        assert!(matches!(
            service.register(bad_email).await,
            Err(UserServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_validate_token() {
        let (_pool, service) = setup().await;
        let user = service.register(signup("alice")).await.unwrap();

        let by_name = service.login(login("alice", "password123")).await.unwrap();
        assert_eq!(by_name.expires_in, 72 * 3600);
        let resolved = service.validate_token(&by_name.token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        let by_email = service.login(login("alice@example.com", "password123")).await.unwrap();
        assert!(service.validate_token(&by_email.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let (_pool, service) = setup().await;
        service.register(signup("alice")).await.unwrap();

        let wrong = service.login(login("alice", "nope")).await.unwrap_err();
        assert!(matches!(wrong, UserServiceError::Unauthorized(ref m) if m == INVALID_CREDENTIALS));
        assert!(matches!(
            service.login(login("ghost", "password123")).await,
            Err(UserServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_tokens() {
        let (_pool, service) = setup().await;
        let user = service.register(signup("alice")).await.unwrap();
        let a = service.login(login("alice", "password123")).await.unwrap();
        let b = service.login(login("alice", "password123")).await.unwrap();

        assert_eq!(service.logout(user.id).await.unwrap(), 2);
        assert!(service.validate_token(&a.token).await.unwrap().is_none());
        assert!(service.validate_token(&b.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_token_is_none() {
        let (_pool, service) = setup().await;
        assert!(service.validate_token("garbage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_promote_user() {
        let (_pool, service) = setup().await;
        service.register(signup("admin")).await.unwrap();
        let bob = service.register(signup("bob")).await.unwrap();

        let promoted = service.promote_user(bob.id, "admin").await.unwrap();
        assert_eq!(promoted.role, UserRole::Admin);

        assert!(matches!(
            service.promote_user(bob.id, "").await,
            Err(UserServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.promote_user(bob.id, "superuser").await,
            Err(UserServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.promote_user(Uuid::new_v4(), "user").await,
            Err(UserServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_user_invalidates_token() {
        let (_pool, service) = setup().await;
        service.register(signup("admin")).await.unwrap();
        let bob = service.register(signup("bob")).await.unwrap();
        let session = service.login(login("bob", "password123")).await.unwrap();

        service.delete_user(bob.id).await.unwrap();
        assert!(service.validate_token(&session.token).await.unwrap().is_none());
        assert!(matches!(
            service.delete_user(bob.id).await,
            Err(UserServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_pool, service) = setup().await;
        let user = service.register(signup("alice")).await.unwrap();

        let err = service
            .change_password(user.id, "wrong", "newpass")
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::Unauthorized(ref m) if m == "old password is incorrect"));

        assert!(matches!(
            service.change_password(user.id, "password123", " ").await,
            Err(UserServiceError::InvalidArgument(_))
        ));

        service
            .change_password(user.id, "password123", "newpass")
            .await
            .unwrap();
        assert!(service.login(login("alice", "password123")).await.is_err());
        assert!(service.login(login("alice", "newpass")).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_password_flow() {
        let (_pool, service) = setup().await;
        service.register(signup("alice")).await.unwrap();
        let old_session = service.login(login("alice", "password123")).await.unwrap();

        let token = service.forgot_password("alice@example.com").await.unwrap();
        service.reset_password(&token, "fresh-pass").await.unwrap();

        assert!(service.login(login("alice", "password123")).await.is_err());
        assert!(service.login(login("alice", "fresh-pass")).await.is_ok());
        assert!(service.validate_token(&old_session.token).await.unwrap().is_none());

        // token is single use
        let reused = service.reset_password(&token, "again").await.unwrap_err();
        assert!(matches!(reused, UserServiceError::InvalidArgument(ref m) if m == "invalid or expired reset token"));
    }

    #[tokio::test]
    async fn test_expired_reset_token_rejected() {
        let (pool, service) = setup().await;
        let user = service.register(signup("alice")).await.unwrap();

        let users = SqlxUserRepository::new(pool.clone());
        users
            .set_reset_token(user.id, "stale", now() - ChronoDuration::minutes(1))
            .await
            .unwrap();

        assert!(matches!(
            service.reset_password("stale", "whatever").await,
            Err(UserServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email() {
        let (_pool, service) = setup().await;
        assert!(matches!(
            service.forgot_password("ghost@example.com").await,
            Err(UserServiceError::NotFound(_))
        ));
    }
}
