//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use super::parse_uuid;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, reset_token, \
                            reset_token_expiry, created_at, updated_at";

// The role is decided inside the INSERT so two concurrent first sign-ups
// cannot both become admin.
const REGISTER_SQL: &str = r#"
    INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
    SELECT ?, ?, ?, ?, CASE WHEN COUNT(*) = 0 THEN 'admin' ELSE 'user' END, ?, ?
    FROM users
"#;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account. The stored role is `admin` when the table was
    /// empty and `user` otherwise, regardless of `user.role`.
    async fn register(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user whose username or email equals `login`
    async fn get_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Get user holding the given reset token
    async fn get_by_reset_token(&self, token: &str) -> Result<Option<User>>;

    /// List all users, oldest first
    async fn list(&self) -> Result<Vec<User>>;

    /// Change a user's role. Returns false if no such user.
    async fn update_role(&self, id: Uuid, role: UserRole) -> Result<bool>;

    /// Replace the password hash and clear any pending reset token.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool>;

    /// Store a reset token and its expiry
    async fn set_reset_token(&self, id: Uuid, token: &str, expiry: DateTime<Utc>) -> Result<bool>;

    /// Delete a user. Returns false if no such user.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_user_sqlite(self.pool.sqlite()?, &sql, value).await,
            DatabaseDriver::Mysql => find_user_mysql(self.pool.mysql()?, &sql, value).await,
        }
    }

    async fn execute_update(&self, sql: &str, binds: &[Bind<'_>]) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql);
                for bind in binds {
                    query = match bind {
                        Bind::Text(v) => query.bind(*v),
                        Bind::OptText(v) => query.bind(*v),
                        Bind::Time(v) => query.bind(*v),
                        Bind::OptTime(v) => query.bind(*v),
                    };
                }
                Ok(query.execute(self.pool.sqlite()?).await?.rows_affected())
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql);
                for bind in binds {
                    query = match bind {
                        Bind::Text(v) => query.bind(*v),
                        Bind::OptText(v) => query.bind(*v),
                        Bind::Time(v) => query.bind(*v),
                        Bind::OptTime(v) => query.bind(*v),
                    };
                }
                Ok(query.execute(self.pool.mysql()?).await?.rows_affected())
            }
        }
    }
}

/// Positional parameter for the update statements, which are identical on
/// both backends.
enum Bind<'a> {
    Text(&'a str),
    OptText(Option<&'a str>),
    Time(DateTime<Utc>),
    OptTime(Option<DateTime<Utc>>),
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn register(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => register_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => register_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.find_one("id = ?", &id.to_string())
            .await
            .context("Failed to get user by ID")
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username = ?", username)
            .await
            .context("Failed to get user by username")
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email = ?", email)
            .await
            .context("Failed to get user by email")
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        if let Some(user) = self.get_by_username(login).await? {
            return Ok(Some(user));
        }
        self.get_by_email(login).await
    }

    async fn get_by_reset_token(&self, token: &str) -> Result<Option<User>> {
        self.find_one("reset_token = ?", token)
            .await
            .context("Failed to get user by reset token")
    }

    async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at ASC", USER_COLUMNS);
        let users = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list users")?
                .iter()
                .map(row_to_user_sqlite)
                .collect::<Result<Vec<_>>>()?,
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list users")?
                .iter()
                .map(row_to_user_mysql)
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(users)
    }

    async fn update_role(&self, id: Uuid, role: UserRole) -> Result<bool> {
        let id = id.to_string();
        let role = role.to_string();
        let affected = self
            .execute_update(
                "UPDATE users SET role = ?, updated_at = ? WHERE id = ?",
                &[Bind::Text(&role), Bind::Time(crate::models::now()), Bind::Text(&id)],
            )
            .await
            .context("Failed to update user role")?;
        Ok(affected > 0)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let id = id.to_string();
        let affected = self
            .execute_update(
                "UPDATE users SET password_hash = ?, reset_token = ?, reset_token_expiry = ?, \
                 updated_at = ? WHERE id = ?",
                &[
                    Bind::Text(password_hash),
                    Bind::OptText(None),
                    Bind::OptTime(None),
                    Bind::Time(crate::models::now()),
                    Bind::Text(&id),
                ],
            )
            .await
            .context("Failed to update password")?;
        Ok(affected > 0)
    }

    async fn set_reset_token(&self, id: Uuid, token: &str, expiry: DateTime<Utc>) -> Result<bool> {
        let id = id.to_string();
        let affected = self
            .execute_update(
                "UPDATE users SET reset_token = ?, reset_token_expiry = ?, updated_at = ? \
                 WHERE id = ?",
                &[
                    Bind::OptText(Some(token)),
                    Bind::OptTime(Some(expiry)),
                    Bind::Time(crate::models::now()),
                    Bind::Text(&id),
                ],
            )
            .await
            .context("Failed to store reset token")?;
        Ok(affected > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let id = id.to_string();
        let affected = self
            .execute_update("DELETE FROM users WHERE id = ?", &[Bind::Text(&id)])
            .await
            .context("Failed to delete user")?;
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn register_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(REGISTER_SQL)
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    find_user_sqlite(pool, &sql, &user.id.to_string())
        .await?
        .context("User not found after insert")
}

async fn find_user_sqlite(pool: &SqlitePool, sql: &str, value: &str) -> Result<Option<User>> {
    let row = sqlx::query(sql).bind(value).fetch_optional(pool).await?;
    row.as_ref().map(row_to_user_sqlite).transpose()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let id: String = row.get("id");
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: parse_uuid(&id)?,
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        reset_token: row.get("reset_token"),
        reset_token_expiry: row.get("reset_token_expiry"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn register_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(REGISTER_SQL)
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    find_user_mysql(pool, &sql, &user.id.to_string())
        .await?
        .context("User not found after insert")
}

async fn find_user_mysql(pool: &MySqlPool, sql: &str, value: &str) -> Result<Option<User>> {
    let row = sqlx::query(sql).bind(value).fetch_optional(pool).await?;
    row.as_ref().map(row_to_user_mysql).transpose()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let id: String = row.get("id");
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: parse_uuid(&id)?,
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        reset_token: row.get("reset_token"),
        reset_token_expiry: row.get("reset_token_expiry"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
