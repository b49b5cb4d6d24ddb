//! The cached credential pair and its freshness arithmetic.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Short-lived credential pair required on every upstream request.
///
/// Records are never mutated in place; a refresh produces a new record.
/// Both secrets are redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    csrf_token: String,
    cookie: String,
    /// Unix timestamp (seconds) at which the record was minted.
    issued_at: u64,
}

impl TokenRecord {
    /// Creates a record issued at `issued_at` (unix seconds).
    #[must_use]
    pub fn new(csrf_token: impl Into<String>, cookie: impl Into<String>, issued_at: u64) -> Self {
        Self {
            csrf_token: csrf_token.into(),
            cookie: cookie.into(),
            issued_at,
        }
    }

    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn issued_now(csrf_token: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self::new(csrf_token, cookie, unix_now())
    }

    /// Returns a copy of this record stamped with a new issue time.
    #[must_use]
    pub fn reissued(&self, issued_at: u64) -> Self {
        Self {
            issued_at,
            ..self.clone()
        }
    }

    /// CSRF token value (sensitive, never log).
    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Cookie header value (sensitive, never log).
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Issue time in unix seconds.
    #[must_use]
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Age of the record relative to `now`. Records from the future are age zero.
    #[must_use]
    pub fn age(&self, now: u64) -> Duration {
        Duration::from_secs(now.saturating_sub(self.issued_at))
    }

    /// `now - issued_at < ttl`.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: u64) -> bool {
        self.age(now) < ttl
    }

    /// Both secrets present and non-blank.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.csrf_token.trim().is_empty() && !self.cookie.trim().is_empty()
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("csrf_token", &"[REDACTED]")
            .field("cookie", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let record = TokenRecord::new("csrf-secret", "session=abc", 10);
        let debug = format!("{record:?}");
        assert!(!debug.contains("csrf-secret"));
        assert!(!debug.contains("session=abc"));
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("10"));
    }

    #[test]
    fn test_freshness_boundary() {
        let record = TokenRecord::new("t", "c", 1_000);
        let ttl = Duration::from_secs(60);
        assert!(record.is_fresh(ttl, 1_000));
        assert!(record.is_fresh(ttl, 1_059));
        assert!(!record.is_fresh(ttl, 1_060));
    }

    #[test]
    fn test_future_record_has_zero_age() {
        let record = TokenRecord::new("t", "c", 5_000);
        assert_eq!(record.age(1_000), Duration::ZERO);
    }

    #[test]
    fn test_reissued_keeps_secrets() {
        let record = TokenRecord::new("t", "c", 1);
        let refreshed = record.reissued(99);
        assert_eq!(refreshed.issued_at(), 99);
        assert_eq!(refreshed.csrf_token(), "t");
        assert_eq!(refreshed.cookie(), "c");
        assert_eq!(record.issued_at(), 1);
    }

    #[test]
    fn test_well_formed() {
        assert!(TokenRecord::new("t", "c", 0).is_well_formed());
        assert!(!TokenRecord::new(" ", "c", 0).is_well_formed());
        assert!(!TokenRecord::new("t", "", 0).is_well_formed());
    }

    #[test]
    fn test_serde_round_trip_field_names() {
        let record = TokenRecord::new("t", "c", 7);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["csrf_token"], "t");
        assert_eq!(json["cookie"], "c");
        assert_eq!(json["issued_at"], 7);
    }
}
