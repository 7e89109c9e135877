//! Data models
//!
//! This module contains the data structures shared by the store, service and
//! HTTP layers:
//! - Database entities (Blog, Interaction, User, Session)
//! - Input types for create/update operations
//! - Query types for filtering

mod blog;
mod interaction;
mod session;
mod user;

pub use blog::{normalize_tags, Blog, BlogFilter, CreateBlogInput, SortBy, UpdateBlogInput};
pub use interaction::{Interaction, ReactionKind, ReactionOutcome};
pub use session::Session;
pub use user::{CreateUserInput, User, UserRole};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at millisecond precision.
///
/// Stored timestamps never carry more precision than this, so values read
/// back compare equal to the ones written and text ordering in SQLite stays
/// chronological.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
