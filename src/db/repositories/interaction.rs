//! Interaction repository
//!
//! Owns the `blog_interactions` table and the like/dislike counters on
//! `blogs`. A reaction is applied as one transaction:
//!
//! 1. lock the post row (and fail with `BlogNotFound` if there is none)
//! 2. read the user's current reaction
//! 3. stop with `AlreadyReacted` if it equals the requested one
//! 4. otherwise remove the opposite reaction and decrement its counter
//! 5. insert the new reaction and increment its counter
//!
//! The lock serializes concurrent reactions on the same post. On SQLite it is
//! the database write lock taken by a no-op UPDATE; on MySQL it is a
//! `SELECT ... FOR UPDATE` row lock.

use super::parse_uuid;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Interaction, ReactionKind, ReactionOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

const FIND_SQL: &str = "SELECT id, blog_id, user_id, action, created_at FROM blog_interactions \
                        WHERE user_id = ? AND blog_id = ?";
const DELETE_SQL: &str = "DELETE FROM blog_interactions WHERE user_id = ? AND blog_id = ?";
const INSERT_SQL: &str = "INSERT INTO blog_interactions (id, blog_id, user_id, action, created_at) \
                          VALUES (?, ?, ?, ?, ?)";
const COUNTERS_SQL: &str = "SELECT likes, dislikes FROM blogs WHERE id = ?";

fn decrement_sql(kind: ReactionKind) -> String {
    let col = kind.counter_column();
    format!("UPDATE blogs SET {col} = {col} - 1 WHERE id = ? AND {col} > 0")
}

fn increment_sql(kind: ReactionKind) -> String {
    let col = kind.counter_column();
    format!("UPDATE blogs SET {col} = {col} + 1 WHERE id = ?")
}

/// Interaction repository trait
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// The user's current reaction to a post, if any
    async fn find(&self, user_id: Uuid, blog_id: Uuid) -> Result<Option<Interaction>>;

    /// Apply a reaction atomically; see the module docs for the sequence.
    async fn apply_reaction(
        &self,
        user_id: Uuid,
        blog_id: Uuid,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome>;

    /// Number of stored reactions of `kind` on a post
    async fn count_for_blog(&self, blog_id: Uuid, kind: ReactionKind) -> Result<i64>;
}

/// SQLx-based interaction repository implementation
pub struct SqlxInteractionRepository {
    pool: DynDatabasePool,
}

impl SqlxInteractionRepository {
    /// Create a new SQLx interaction repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn InteractionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl InteractionRepository for SqlxInteractionRepository {
    async fn find(&self, user_id: Uuid, blog_id: Uuid) -> Result<Option<Interaction>> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => find_sqlite(self.pool.sqlite()?, user_id, blog_id).await,
            DatabaseDriver::Mysql => find_mysql(self.pool.mysql()?, user_id, blog_id).await,
        };
        result.context("Failed to find interaction")
    }

    async fn apply_reaction(
        &self,
        user_id: Uuid,
        blog_id: Uuid,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                apply_reaction_sqlite(self.pool.sqlite()?, user_id, blog_id, kind).await
            }
            DatabaseDriver::Mysql => {
                apply_reaction_mysql(self.pool.mysql()?, user_id, blog_id, kind).await
            }
        };
        result.with_context(|| format!("Failed to apply {} on blog {}", kind, blog_id))
    }

    async fn count_for_blog(&self, blog_id: Uuid, kind: ReactionKind) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM blog_interactions WHERE blog_id = ? AND action = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(blog_id.to_string())
                    .bind(kind.as_str())
                    .fetch_one(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(blog_id.to_string())
                    .bind(kind.as_str())
                    .fetch_one(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to count interactions")?;
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_sqlite(pool: &SqlitePool, user_id: Uuid, blog_id: Uuid) -> Result<Option<Interaction>> {
    let row = sqlx::query(FIND_SQL)
        .bind(user_id.to_string())
        .bind(blog_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_interaction_sqlite).transpose()
}

async fn apply_reaction_sqlite(
    pool: &SqlitePool,
    user_id: Uuid,
    blog_id: Uuid,
    kind: ReactionKind,
) -> Result<ReactionOutcome> {
    let blog = blog_id.to_string();
    let user = user_id.to_string();
    let mut tx = pool.begin().await?;

    let locked = sqlx::query("UPDATE blogs SET likes = likes WHERE id = ?")
        .bind(&blog)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if locked == 0 {
        return Ok(ReactionOutcome::BlogNotFound);
    }

    let current = sqlx::query(FIND_SQL)
        .bind(&user)
        .bind(&blog)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(row_to_interaction_sqlite)
        .transpose()?
        .map(|i| i.action);

    if current == Some(kind) {
        return Ok(ReactionOutcome::AlreadyReacted);
    }

    if let Some(previous) = current {
        sqlx::query(DELETE_SQL)
            .bind(&user)
            .bind(&blog)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&decrement_sql(previous))
            .bind(&blog)
            .execute(&mut *tx)
            .await?;
    }

    let interaction = Interaction::new(blog_id, user_id, kind);
    sqlx::query(INSERT_SQL)
        .bind(interaction.id.to_string())
        .bind(&blog)
        .bind(&user)
        .bind(kind.as_str())
        .bind(interaction.created_at)
        .execute(&mut *tx)
        .await?;
    sqlx::query(&increment_sql(kind))
        .bind(&blog)
        .execute(&mut *tx)
        .await?;

    let (likes, dislikes) = sqlx::query_as::<_, (i64, i64)>(COUNTERS_SQL)
        .bind(&blog)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ReactionOutcome::Applied {
        previous: current,
        likes,
        dislikes,
    })
}

fn row_to_interaction_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Interaction> {
    let id: String = row.get("id");
    let blog_id: String = row.get("blog_id");
    let user_id: String = row.get("user_id");
    let action: String = row.get("action");
    Ok(Interaction {
        id: parse_uuid(&id)?,
        blog_id: parse_uuid(&blog_id)?,
        user_id: parse_uuid(&user_id)?,
        action: ReactionKind::from_str(&action)?,
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn find_mysql(pool: &MySqlPool, user_id: Uuid, blog_id: Uuid) -> Result<Option<Interaction>> {
    let row = sqlx::query(FIND_SQL)
        .bind(user_id.to_string())
        .bind(blog_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_interaction_mysql).transpose()
}

async fn apply_reaction_mysql(
    pool: &MySqlPool,
    user_id: Uuid,
    blog_id: Uuid,
    kind: ReactionKind,
) -> Result<ReactionOutcome> {
    let blog = blog_id.to_string();
    let user = user_id.to_string();
    let mut tx = pool.begin().await?;

    let locked = sqlx::query("SELECT id FROM blogs WHERE id = ? FOR UPDATE")
        .bind(&blog)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Ok(ReactionOutcome::BlogNotFound);
    }

    let current = sqlx::query(FIND_SQL)
        .bind(&user)
        .bind(&blog)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(row_to_interaction_mysql)
        .transpose()?
        .map(|i| i.action);

    if current == Some(kind) {
        return Ok(ReactionOutcome::AlreadyReacted);
    }

    if let Some(previous) = current {
        sqlx::query(DELETE_SQL)
            .bind(&user)
            .bind(&blog)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&decrement_sql(previous))
            .bind(&blog)
            .execute(&mut *tx)
            .await?;
    }

    let interaction = Interaction::new(blog_id, user_id, kind);
    sqlx::query(INSERT_SQL)
        .bind(interaction.id.to_string())
        .bind(&blog)
        .bind(&user)
        .bind(kind.as_str())
        .bind(interaction.created_at)
        .execute(&mut *tx)
        .await?;
    sqlx::query(&increment_sql(kind))
        .bind(&blog)
        .execute(&mut *tx)
        .await?;

    let (likes, dislikes) = sqlx::query_as::<_, (i64, i64)>(COUNTERS_SQL)
        .bind(&blog)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ReactionOutcome::Applied {
        previous: current,
        likes,
        dislikes,
    })
}

fn row_to_interaction_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Interaction> {
    let id: String = row.get("id");
    let blog_id: String = row.get("blog_id");
    let user_id: String = row.get("user_id");
    let action: String = row.get("action");
    Ok(Interaction {
        id: parse_uuid(&id)?,
        blog_id: parse_uuid(&blog_id)?,
        user_id: parse_uuid(&user_id)?,
        action: ReactionKind::from_str(&action)?,
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{BlogRepository, SqlxBlogRepository};
    use crate::config::DatabaseConfig;
    use crate::db::{create_pool, create_test_pool, migrations};
    use crate::models::Blog;
    use proptest::prelude::*;

    async fn setup() -> (SqlxBlogRepository, SqlxInteractionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (
            SqlxBlogRepository::new(pool.clone()),
            SqlxInteractionRepository::new(pool),
        )
    }

    async fn create_blog(blogs: &SqlxBlogRepository) -> Blog {
        let blog = Blog::new(
            Uuid::new_v4(),
            "Post".to_string(),
            "Body".to_string(),
            vec![],
        );
        blogs.create(&blog).await.expect("Failed to create blog")
    }

    async fn counters(blogs: &SqlxBlogRepository, id: Uuid) -> (i64, i64, i64) {
        let blog = blogs.get_by_id(id).await.unwrap().unwrap();
        (blog.likes, blog.dislikes, blog.view_count)
    }

    #[tokio::test]
    async fn test_first_like_creates_interaction() {
        let (blogs, repo) = setup().await;
        let blog = create_blog(&blogs).await;
        let user = Uuid::new_v4();

        let outcome = repo
            .apply_reaction(user, blog.id, ReactionKind::Like)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReactionOutcome::Applied {
                previous: None,
                likes: 1,
                dislikes: 0
            }
        );

        let stored = repo.find(user, blog.id).await.unwrap().unwrap();
        assert_eq!(stored.action, ReactionKind::Like);
        assert_eq!(counters(&blogs, blog.id).await, (1, 0, 0));
    }

    #[tokio::test]
    async fn test_repeated_reaction_is_rejected_without_changes() {
        let (blogs, repo) = setup().await;
        let blog = create_blog(&blogs).await;
        let user = Uuid::new_v4();

        repo.apply_reaction(user, blog.id, ReactionKind::Dislike)
            .await
            .unwrap();
        let before = repo.find(user, blog.id).await.unwrap().unwrap();

        let outcome = repo
            .apply_reaction(user, blog.id, ReactionKind::Dislike)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::AlreadyReacted);

        let after = repo.find(user, blog.id).await.unwrap().unwrap();
        assert_eq!(before.id, after.id);
        assert_eq!(counters(&blogs, blog.id).await, (0, 1, 0));
    }

    #[tokio::test]
    async fn test_flip_replaces_interaction() {
        let (blogs, repo) = setup().await;
        let blog = create_blog(&blogs).await;
        let user = Uuid::new_v4();

        repo.apply_reaction(user, blog.id, ReactionKind::Like)
            .await
            .unwrap();
        let first = repo.find(user, blog.id).await.unwrap().unwrap();

        let outcome = repo
            .apply_reaction(user, blog.id, ReactionKind::Dislike)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReactionOutcome::Applied {
                previous: Some(ReactionKind::Like),
                likes: 0,
                dislikes: 1
            }
        );

        let second = repo.find(user, blog.id).await.unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.action, ReactionKind::Dislike);
        assert_eq!(
            repo.count_for_blog(blog.id, ReactionKind::Like).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_missing_blog_writes_nothing() {
        let (_blogs, repo) = setup().await;
        let user = Uuid::new_v4();
        let ghost = Uuid::new_v4();

        let outcome = repo
            .apply_reaction(user, ghost, ReactionKind::Like)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::BlogNotFound);
        assert!(repo.find(user, ghost).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_likes_from_same_user() {
        let (blogs, repo) = setup().await;
        let blog = create_blog(&blogs).await;
        let user = Uuid::new_v4();
        let repo = Arc::new(repo);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let blog_id = blog.id;
                tokio::spawn(async move {
                    repo.apply_reaction(user, blog_id, ReactionKind::Like).await
                })
            })
            .collect();

        let mut applied = 0;
        let mut rejected = 0;
        for task in futures::future::join_all(tasks).await {
            match task.unwrap().unwrap() {
                ReactionOutcome::Applied { .. } => applied += 1,
                ReactionOutcome::AlreadyReacted => rejected += 1,
                ReactionOutcome::BlogNotFound => panic!("blog should exist"),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(rejected, 7);
        assert_eq!(counters(&blogs, blog.id).await, (1, 0, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reactions_on_file_database() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: dir.path().join("reactions.db").to_string_lossy().to_string(),
            ..DatabaseConfig::default()
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let blogs = SqlxBlogRepository::new(pool.clone());
        let repo = Arc::new(SqlxInteractionRepository::new(pool));
        let blog = create_blog(&blogs).await;
        let blog_id = blog.id;

        let flipper = Uuid::new_v4();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            let kind = if i % 2 == 0 {
                ReactionKind::Like
            } else {
                ReactionKind::Dislike
            };
            tasks.push(tokio::spawn(async move {
                repo.apply_reaction(flipper, blog_id, kind).await
            }));
        }
        for _ in 0..6 {
            let repo = repo.clone();
            let user = Uuid::new_v4();
            tasks.push(tokio::spawn(async move {
                repo.apply_reaction(user, blog_id, ReactionKind::Like).await
            }));
        }

        for task in futures::future::join_all(tasks).await {
            let outcome = task.unwrap().expect("reaction should not fail");
            assert_ne!(outcome, ReactionOutcome::BlogNotFound);
        }

        let current = repo.find(flipper, blog.id).await.unwrap().unwrap().action;
        let expected = match current {
            ReactionKind::Like => (7, 0, 0),
            ReactionKind::Dislike => (6, 1, 0),
        };
        assert_eq!(counters(&blogs, blog.id).await, expected);
        assert_eq!(
            repo.count_for_blog(blog.id, ReactionKind::Like).await.unwrap(),
            expected.0
        );
        assert_eq!(
            repo.count_for_blog(blog.id, ReactionKind::Dislike).await.unwrap(),
            expected.1
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// After any sequence of reactions from any users, the counters equal
        /// the stored interaction rows and views are untouched.
        #[test]
        fn counters_match_interactions(
            ops in proptest::collection::vec((0usize..3, any::<bool>()), 1..30)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (blogs, repo) = setup().await;
                let blog = create_blog(&blogs).await;
                let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
                let mut model: Vec<Option<ReactionKind>> = vec![None; 3];

                for (who, like) in ops {
                    let kind = if like { ReactionKind::Like } else { ReactionKind::Dislike };
                    let outcome = repo.apply_reaction(users[who], blog.id, kind).await.unwrap();
                    if model[who] == Some(kind) {
                        assert_eq!(outcome, ReactionOutcome::AlreadyReacted);
                    } else {
                        assert!(matches!(outcome, ReactionOutcome::Applied { .. }));
                        model[who] = Some(kind);
                    }
                }

                let expected_likes = model.iter().filter(|m| **m == Some(ReactionKind::Like)).count() as i64;
                let expected_dislikes = model.iter().filter(|m| **m == Some(ReactionKind::Dislike)).count() as i64;

                assert_eq!(counters(&blogs, blog.id).await, (expected_likes, expected_dislikes, 0));
                assert_eq!(repo.count_for_blog(blog.id, ReactionKind::Like).await.unwrap(), expected_likes);
                assert_eq!(repo.count_for_blog(blog.id, ReactionKind::Dislike).await.unwrap(), expected_dislikes);
            });
        }
    }
}
