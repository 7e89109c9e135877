//! Blog repository
//!
//! Database operations for blog posts and their tag sets.
//!
//! Tags live in `blog_tags`, one row per (post, tag). A post's tag list is
//! always returned sorted. Counter columns are only ever changed with
//! relative updates (`col = col + 1`); the reaction counters are owned by
//! the interaction repository.

use super::parse_uuid;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Blog, BlogFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const BLOG_COLUMNS: &str =
    "id, title, content, user_id, likes, dislikes, view_count, created_at, updated_at";

/// Blog repository trait
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Insert a post together with its tags
    async fn create(&self, blog: &Blog) -> Result<Blog>;

    /// Get post by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Blog>>;

    /// All posts, newest first
    async fn list(&self) -> Result<Vec<Blog>>;

    /// Persist title, content and tags. Counters on `blog` are ignored.
    /// Returns false if the post does not exist.
    async fn update(&self, blog: &Blog) -> Result<bool>;

    /// Delete a post with its tags and interactions. Returns false if absent.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Add one to the view counter. Returns false if the post does not exist.
    async fn increment_views(&self, id: Uuid) -> Result<bool>;

    /// Posts matching every criterion of `filter`, in its sort order
    async fn filter(&self, filter: &BlogFilter) -> Result<Vec<Blog>>;

    /// Most recently created post whose title contains `needle`, ignoring case
    async fn search_by_title(&self, needle: &str) -> Result<Option<Blog>>;
}

/// SQLx-based blog repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    /// Create a new SQLx blog repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, blog: &Blog) -> Result<Blog> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_blog_sqlite(self.pool.sqlite()?, blog).await,
            DatabaseDriver::Mysql => create_blog_mysql(self.pool.mysql()?, blog).await,
        };
        result.context("Failed to create blog")?;
        Ok(blog.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs WHERE id = ?", BLOG_COLUMNS);
        let binds = [QueryArg::Text(id.to_string())];
        let mut blogs = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_blogs_sqlite(self.pool.sqlite()?, &sql, &binds).await,
            DatabaseDriver::Mysql => fetch_blogs_mysql(self.pool.mysql()?, &sql, &binds).await,
        }
        .context("Failed to get blog by ID")?;
        Ok(blogs.pop())
    }

    async fn list(&self) -> Result<Vec<Blog>> {
        let sql = format!("SELECT {} FROM blogs ORDER BY created_at DESC", BLOG_COLUMNS);
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_blogs_sqlite(self.pool.sqlite()?, &sql, &[]).await,
            DatabaseDriver::Mysql => fetch_blogs_mysql(self.pool.mysql()?, &sql, &[]).await,
        };
        result.context("Failed to list blogs")
    }

    async fn update(&self, blog: &Blog) -> Result<bool> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => update_blog_sqlite(self.pool.sqlite()?, blog).await,
            DatabaseDriver::Mysql => update_blog_mysql(self.pool.mysql()?, blog).await,
        };
        result.context("Failed to update blog")
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_blog_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_blog_mysql(self.pool.mysql()?, id).await,
        };
        result.context("Failed to delete blog")
    }

    async fn increment_views(&self, id: Uuid) -> Result<bool> {
        let sql = "UPDATE blogs SET view_count = view_count + 1 WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id.to_string())
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id.to_string())
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to record view")?;
        Ok(affected > 0)
    }

    async fn filter(&self, filter: &BlogFilter) -> Result<Vec<Blog>> {
        let (sql, binds) = build_filter_query(filter);
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_blogs_sqlite(self.pool.sqlite()?, &sql, &binds).await,
            DatabaseDriver::Mysql => fetch_blogs_mysql(self.pool.mysql()?, &sql, &binds).await,
        };
        result.context("Failed to filter blogs")
    }

    async fn search_by_title(&self, needle: &str) -> Result<Option<Blog>> {
        let sql = format!(
            "SELECT {} FROM blogs WHERE LOWER(title) LIKE LOWER(?) ESCAPE '!' \
             ORDER BY created_at DESC LIMIT 1",
            BLOG_COLUMNS
        );
        let binds = [QueryArg::Text(like_pattern(needle))];
        let mut blogs = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_blogs_sqlite(self.pool.sqlite()?, &sql, &binds).await,
            DatabaseDriver::Mysql => fetch_blogs_mysql(self.pool.mysql()?, &sql, &binds).await,
        }
        .context("Failed to search blogs")?;
        Ok(blogs.pop())
    }
}

/// Bound parameter for the dynamically built SELECT statements
#[derive(Debug, Clone, PartialEq)]
enum QueryArg {
    Text(String),
    Int(i64),
    Time(chrono::DateTime<chrono::Utc>),
}

/// `%needle%` with LIKE metacharacters escaped by `!`. Case folding is left
/// to SQL so the column and the pattern fold the same way.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '!') {
            pattern.push('!');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn build_filter_query(filter: &BlogFilter) -> (String, Vec<QueryArg>) {
    let mut sql = format!("SELECT {} FROM blogs WHERE 1 = 1", BLOG_COLUMNS);
    let mut binds = Vec::new();

    if !filter.tags.is_empty() {
        let placeholders = vec!["?"; filter.tags.len()].join(", ");
        sql.push_str(&format!(
            " AND id IN (SELECT blog_id FROM blog_tags WHERE tag IN ({}) \
             GROUP BY blog_id HAVING COUNT(DISTINCT tag) = ?)",
            placeholders
        ));
        binds.extend(filter.tags.iter().cloned().map(QueryArg::Text));
        binds.push(QueryArg::Int(filter.tags.len() as i64));
    }
    if let Some(start) = filter.start {
        sql.push_str(" AND created_at >= ?");
        binds.push(QueryArg::Time(start));
    }
    if let Some(end) = filter.end {
        sql.push_str(" AND created_at <= ?");
        binds.push(QueryArg::Time(end));
    }

    sql.push_str(" ORDER BY ");
    sql.push_str(filter.sort.order_clause());
    (sql, binds)
}

fn group_tags(rows: Vec<(String, String)>) -> HashMap<String, Vec<String>> {
    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    for (blog_id, tag) in rows {
        tags.entry(blog_id).or_default().push(tag);
    }
    tags
}

fn tag_query(count: usize) -> String {
    format!(
        "SELECT blog_id, tag FROM blog_tags WHERE blog_id IN ({}) ORDER BY tag",
        vec!["?"; count].join(", ")
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_blog_sqlite(pool: &SqlitePool, blog: &Blog) -> Result<()> {
    let mut tx = pool.begin().await?;
    let id = blog.id.to_string();

    sqlx::query(
        r#"
        INSERT INTO blogs (id, title, content, user_id, likes, dislikes, view_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, 0, 0, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(blog.user_id.to_string())
    .bind(blog.created_at)
    .bind(blog.updated_at)
    .execute(&mut *tx)
    .await?;

    for tag in &blog.tags {
        sqlx::query("INSERT INTO blog_tags (blog_id, tag) VALUES (?, ?)")
            .bind(&id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn update_blog_sqlite(pool: &SqlitePool, blog: &Blog) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let id = blog.id.to_string();

    let affected = sqlx::query("UPDATE blogs SET title = ?, content = ?, updated_at = ? WHERE id = ?")
        .bind(&blog.title)
        .bind(&blog.content)
        .bind(blog.updated_at)
        .bind(&id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if affected == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM blog_tags WHERE blog_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    for tag in &blog.tags {
        sqlx::query("INSERT INTO blog_tags (blog_id, tag) VALUES (?, ?)")
            .bind(&id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(true)
}

async fn delete_blog_sqlite(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let id = id.to_string();

    sqlx::query("DELETE FROM blog_interactions WHERE blog_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM blog_tags WHERE blog_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    let affected = sqlx::query("DELETE FROM blogs WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(affected > 0)
}

async fn fetch_blogs_sqlite(pool: &SqlitePool, sql: &str, binds: &[QueryArg]) -> Result<Vec<Blog>> {
    let mut query = sqlx::query(sql);
    for arg in binds {
        query = match arg {
            QueryArg::Text(v) => query.bind(v.clone()),
            QueryArg::Int(v) => query.bind(*v),
            QueryArg::Time(v) => query.bind(*v),
        };
    }
    let rows = query.fetch_all(pool).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|row| row.get("id")).collect();
    let tag_sql = tag_query(ids.len());
    let mut tag_rows = sqlx::query_as::<_, (String, String)>(&tag_sql);
    for id in &ids {
        tag_rows = tag_rows.bind(id.clone());
    }
    let mut tags = group_tags(tag_rows.fetch_all(pool).await?);

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let tags = tags.remove(&id).unwrap_or_default();
            row_to_blog_sqlite(row, tags)
        })
        .collect()
}

fn row_to_blog_sqlite(row: &sqlx::sqlite::SqliteRow, tags: Vec<String>) -> Result<Blog> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    Ok(Blog {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        content: row.get("content"),
        user_id: parse_uuid(&user_id)?,
        tags,
        likes: row.get("likes"),
        dislikes: row.get("dislikes"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_blog_mysql(pool: &MySqlPool, blog: &Blog) -> Result<()> {
    let mut tx = pool.begin().await?;
    let id = blog.id.to_string();

    sqlx::query(
        r#"
        INSERT INTO blogs (id, title, content, user_id, likes, dislikes, view_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, 0, 0, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(blog.user_id.to_string())
    .bind(blog.created_at)
    .bind(blog.updated_at)
    .execute(&mut *tx)
    .await?;

    for tag in &blog.tags {
        sqlx::query("INSERT INTO blog_tags (blog_id, tag) VALUES (?, ?)")
            .bind(&id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn update_blog_mysql(pool: &MySqlPool, blog: &Blog) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let id = blog.id.to_string();

    // MySQL reports changed rows, not matched rows, so existence is checked
    // with a locking read instead of rows_affected.
    let exists = sqlx::query("SELECT id FROM blogs WHERE id = ? FOR UPDATE")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
    if !exists {
        return Ok(false);
    }

    sqlx::query("UPDATE blogs SET title = ?, content = ?, updated_at = ? WHERE id = ?")
        .bind(&blog.title)
        .bind(&blog.content)
        .bind(blog.updated_at)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM blog_tags WHERE blog_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    for tag in &blog.tags {
        sqlx::query("INSERT INTO blog_tags (blog_id, tag) VALUES (?, ?)")
            .bind(&id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(true)
}

async fn delete_blog_mysql(pool: &MySqlPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let id = id.to_string();

    sqlx::query("DELETE FROM blog_interactions WHERE blog_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM blog_tags WHERE blog_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    let affected = sqlx::query("DELETE FROM blogs WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(affected > 0)
}

async fn fetch_blogs_mysql(pool: &MySqlPool, sql: &str, binds: &[QueryArg]) -> Result<Vec<Blog>> {
    let mut query = sqlx::query(sql);
    for arg in binds {
        query = match arg {
            QueryArg::Text(v) => query.bind(v.clone()),
            QueryArg::Int(v) => query.bind(*v),
            QueryArg::Time(v) => query.bind(*v),
        };
    }
    let rows = query.fetch_all(pool).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|row| row.get("id")).collect();
    let tag_sql = tag_query(ids.len());
    let mut tag_rows = sqlx::query_as::<_, (String, String)>(&tag_sql);
    for id in &ids {
        tag_rows = tag_rows.bind(id.clone());
    }
    let mut tags = group_tags(tag_rows.fetch_all(pool).await?);

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let tags = tags.remove(&id).unwrap_or_default();
            row_to_blog_mysql(row, tags)
        })
        .collect()
}

fn row_to_blog_mysql(row: &sqlx::mysql::MySqlRow, tags: Vec<String>) -> Result<Blog> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    Ok(Blog {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        content: row.get("content"),
        user_id: parse_uuid(&user_id)?,
        tags,
        likes: row.get("likes"),
        dislikes: row.get("dislikes"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
