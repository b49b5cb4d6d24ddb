//! Resource identifier extraction from company page URLs.
//!
//! Upstream company pages embed the numeric employer identifier as an
//! `E<digits>` token in the path, e.g.
//! `https://www.glassdoor.com/Reviews/Acme-Reviews-E12345.htm`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::instrument;

#[allow(clippy::expect_used)]
static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"E(\d+)").expect("identifier pattern is valid"));

/// Numeric identifier of the upstream resource being harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input rejected before any work begins.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Input was empty or whitespace.
    #[error("resource URL is empty")]
    EmptyInput,

    /// No `E<digits>` token was found.
    #[error("no resource identifier found in {input}")]
    MissingIdentifier {
        /// The offending input.
        input: String,
    },

    /// The digits do not fit a 64-bit identifier.
    #[error("resource identifier in {input} is out of range")]
    OutOfRange {
        /// The offending input.
        input: String,
    },
}

/// Extracts the resource identifier from a company URL.
///
/// The first `E<digits>` token wins. Plain URLs and bare paths are both
/// accepted since only the token matters.
///
/// # Errors
///
/// Returns [`ValidationError`] when the input is empty, carries no token, or
/// the token overflows.
///
/// # Examples
///
/// ```
/// use harvester_core::extract_resource_id;
///
/// let id = extract_resource_id("https://www.glassdoor.com/Reviews/Acme-Reviews-E12345.htm")
///     .unwrap();
/// assert_eq!(id.get(), 12345);
/// assert!(extract_resource_id("https://example.com/no-id").is_err());
/// ```
#[instrument(level = "debug")]
pub fn extract_resource_id(input: &str) -> Result<ResourceId, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    let digits = ID_PATTERN
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ValidationError::MissingIdentifier {
            input: trimmed.to_string(),
        })?;

    digits
        .as_str()
        .parse::<u64>()
        .map(ResourceId)
        .map_err(|_| ValidationError::OutOfRange {
            input: trimmed.to_string(),
        })
}
