//! Small helpers shared by the HTTP handlers.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::warn;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Whether an ordinary recovery token with the given generated-at value has
/// expired. Durable policy tokens never carry a generated-at value and never
/// reach this check.
///
/// The value is unix seconds; anything unparseable is treated as expired
/// rather than as valid.
pub(super) fn recovery_token_expired(generated_at: &str, ttl_seconds: i64) -> bool {
    let Ok(generated_at) = generated_at.trim().parse::<i64>() else {
        warn!(generated_at, "unparseable recovery token timestamp");
        return true;
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX));

    now.saturating_sub(generated_at) > ttl_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn fresh_token_is_not_expired() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        assert!(!recovery_token_expired(&now.to_string(), 3600));
    }

    #[test]
    fn old_token_is_expired() {
        assert!(recovery_token_expired("1000", 3600));
    }

    #[test]
    fn unparseable_timestamp_is_expired() {
        assert!(recovery_token_expired("yesterday", 3600));
        assert!(recovery_token_expired("", 3600));
    }
}
