//! Reaction (like/dislike) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The two reactions a user can hold on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Dislike => "dislike",
        }
    }

    /// Name of the counter column on `blogs` this reaction feeds.
    pub(crate) fn counter_column(self) -> &'static str {
        match self {
            ReactionKind::Like => "likes",
            ReactionKind::Dislike => "dislikes",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ReactionKind::Like),
            "dislike" => Ok(ReactionKind::Dislike),
            _ => Err(anyhow::anyhow!("Invalid reaction: {}", s)),
        }
    }
}

/// A user's current reaction to a post. At most one exists per (user, post).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub blog_id: Uuid,
    pub user_id: Uuid,
    pub action: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(blog_id: Uuid, user_id: Uuid, action: ReactionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            blog_id,
            user_id,
            action,
            created_at: super::now(),
        }
    }
}

/// Result of applying a reaction inside one store transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// The post does not exist; nothing was written.
    BlogNotFound,
    /// The user already holds this reaction; nothing was written.
    AlreadyReacted,
    /// The reaction was recorded.
    Applied {
        /// Reaction that was replaced, if the user flipped.
        previous: Option<ReactionKind>,
        likes: i64,
        dislikes: i64,
    },
}
