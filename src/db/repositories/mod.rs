//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity and dispatches on the
//! configured driver.

pub mod blog;
pub mod interaction;
pub mod session;
pub mod user;

pub use blog::{BlogRepository, SqlxBlogRepository};
pub use interaction::{InteractionRepository, SqlxInteractionRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use uuid::Uuid;

/// Ids are stored as their hyphenated text form.
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid id in database: {}", value))
}

/// Whether a repository error was caused by a UNIQUE constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}
