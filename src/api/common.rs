//! Common API utilities and shared types

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::middleware::ApiError;

/// Parse a path or body id, naming the entity in the error
pub fn parse_id(raw: &str, entity: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::validation_error(format!("invalid {} id", entity)))
}

/// Parse an optional RFC 3339 timestamp. Blank counts as absent.
pub fn parse_optional_date(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| ApiError::validation_error(format!("invalid {} date", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "blog").unwrap(), id);

        let err = parse_id("42", "blog").unwrap_err();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.error.message, "invalid blog id");
    }

    #[test]
    fn test_parse_optional_date() {
        assert!(parse_optional_date(None, "start").unwrap().is_none());
        assert!(parse_optional_date(Some("  "), "start").unwrap().is_none());

        let parsed = parse_optional_date(Some("2024-03-01T10:00:00+02:00"), "start")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T08:00:00+00:00");

        let err = parse_optional_date(Some("yesterday"), "end").unwrap_err();
        assert_eq!(err.error.message, "invalid end date");
    }
}
