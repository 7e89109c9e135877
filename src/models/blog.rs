//! Blog model
//!
//! This module provides:
//! - `Blog` entity with its tag set and aggregate counters
//! - Input types for creating and updating posts
//! - `BlogFilter` and `SortBy` for tag/date queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A blog post.
///
/// `likes` and `dislikes` always equal the number of interaction rows with
/// the matching action for this post. They are never set directly by edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blog {
    /// Unique identifier
    pub id: Uuid,
    /// Post title
    pub title: String,
    /// Post body
    pub content: String,
    /// Author user ID
    pub user_id: Uuid,
    /// Tag set, sorted and free of duplicates
    #[serde(default)]
    pub tags: Vec<String>,
    /// Like count
    #[serde(default)]
    pub likes: i64,
    /// Dislike count
    #[serde(default)]
    pub dislikes: i64,
    /// View count
    #[serde(default)]
    pub view_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Blog {
    /// Create a new post with zeroed counters
    pub fn new(user_id: Uuid, title: String, content: String, tags: Vec<String>) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            title,
            content,
            user_id,
            tags: normalize_tags(tags),
            likes: 0,
            dislikes: 0,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trim tags, drop empty ones and collapse duplicates.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlogInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for editing a post. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlogInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Ordering for filtered post lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// likes desc, then view_count desc, then created_at desc
    Popularity,
    /// created_at desc
    #[default]
    Date,
}

impl SortBy {
    /// `"popularity"` selects popularity order; any other value means date order.
    pub fn from_param(value: &str) -> Self {
        if value == "popularity" {
            SortBy::Popularity
        } else {
            SortBy::Date
        }
    }

    pub(crate) fn order_clause(self) -> &'static str {
        match self {
            SortBy::Popularity => "likes DESC, view_count DESC, created_at DESC",
            SortBy::Date => "created_at DESC",
        }
    }
}

/// Criteria for `FilterBlogs`
#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    /// Posts must carry every one of these tags. Empty means no tag criterion.
    pub tags: Vec<String>,
    /// Inclusive lower bound on creation time
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time
    pub end: Option<DateTime<Utc>>,
    pub sort: SortBy,
}
