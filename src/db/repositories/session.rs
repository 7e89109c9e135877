//! Session repository
//!
//! Server-side records of issued access tokens. A token is honoured only while
//! its row exists, so deleting rows is how tokens are revoked.

use super::parse_uuid;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token `jti`)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete all sessions for a user, returning how many were removed
    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64>;

    /// Delete expired sessions
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id.to_string())
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id.to_string())
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };
        result.context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_session_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE user_id = ?";
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(user_id.to_string())
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(user_id.to_string())
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };
        result.context("Failed to delete sessions by user")
    }

    async fn delete_expired(&self) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let now = crate::models::now();
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(now)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(now)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };
        result.context("Failed to delete expired sessions")
    }
}

async fn get_session_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    match row {
        Some(row) => {
            let user_id: String = row.get("user_id");
            Ok(Some(Session {
                id: row.get("id"),
                user_id: parse_uuid(&user_id)?,
                expires_at: row.get("expires_at"),
                created_at: row.get("created_at"),
            }))
        }
        None => Ok(None),
    }
}

async fn get_session_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    match row {
        Some(row) => {
            let user_id: String = row.get("user_id");
            Ok(Some(Session {
                id: row.get("id"),
                user_id: parse_uuid(&user_id)?,
                expires_at: row.get("expires_at"),
                created_at: row.get("created_at"),
            }))
        }
        None => Ok(None),
    }
}
