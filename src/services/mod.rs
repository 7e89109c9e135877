//! Services layer - Business logic
//!
//! Services validate input, enforce ownership rules and map store failures
//! into typed errors. Every store call they make runs under the configured
//! per-operation deadline.

pub mod ai;
pub mod blog;
pub mod password;
pub mod token;
pub mod user;

pub use ai::{AiError, AiService, HttpAiService, MockAiService, FALLBACK_SUGGESTION};
pub use blog::{BlogService, BlogServiceError, ReactionSummary};
pub use password::{hash_password, verify_password};
pub use token::{Claims, IssuedToken, TokenError, TokenIssuer};
pub use user::{LoginInput, LoginResponse, UserService, UserServiceError};

use std::future::Future;
use std::time::Duration;

/// Run a store call under `limit`.
///
/// Store failures convert through `E: From<anyhow::Error>`; expiry becomes
/// `on_timeout(limit_in_seconds)`.
pub(crate) async fn with_deadline<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: fn(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = anyhow::Result<T>>,
    E: From<anyhow::Error>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(E::from),
        Err(_) => {
            tracing::warn!(timeout_secs = limit.as_secs(), "store operation timed out");
            Err(on_timeout(limit.as_secs()))
        }
    }
}
