//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side record of an issued access token.
///
/// The id is the token's `jti` claim. Deleting the row revokes the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Token id (`jti`)
    pub id: String,
    /// Associated user ID
    pub user_id: Uuid,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let mut session = Session {
            id: "jti".to_string(),
            user_id: Uuid::new_v4(),
            expires_at: now + Duration::hours(1),
            created_at: now,
        };
        assert!(!session.is_expired());

        session.expires_at = now - Duration::seconds(1);
        assert!(session.is_expired());
    }
}
