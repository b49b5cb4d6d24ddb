//! Netscape cookie export parsing for captured browser sessions.
//!
//! Parses the Netscape HTTP cookie file format (7 TAB-separated fields per line)
//! and flattens the live cookies into a single `Cookie` request header value.

use std::fmt;
use std::io::BufRead;

use tracing::{debug, instrument, warn};

/// Prefix browsers put on HttpOnly cookies in Netscape exports.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single parsed cookie from a Netscape-format export.
///
/// The value field is redacted in Debug output.
#[derive(Clone)]
pub struct CookieLine {
    /// The domain the cookie belongs to (e.g., `.example.com`).
    pub domain: String,
    /// Unix timestamp for expiry (0 = session cookie).
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive, never log).
    value: String,
}

impl CookieLine {
    /// Creates a new cookie entry.
    #[must_use]
    pub fn new(domain: String, expires: u64, name: String, value: String) -> Self {
        Self {
            domain,
            expires,
            name,
            value,
        }
    }

    /// Returns the cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Session cookies (expires = 0) never expire here.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires > 0 && self.expires <= now
    }
}

impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while parsing a cookie export.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line has an invalid format.
    #[error("line {line_number}: {reason} (got: {content})")]
    InvalidLine {
        /// 1-based line number.
        line_number: usize,
        /// The offending line content, value redacted.
        content: String,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the export.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty export.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

/// Parses a Netscape-format cookie export.
///
/// Blank lines and `#` comments are skipped, except for `#HttpOnly_` entries
/// which are real cookies. Malformed lines are warned about and skipped.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or
/// [`CookieError::NoCookiesFound`] when a non-empty export yields zero cookies.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<Vec<CookieLine>, CookieError> {
    let mut cookies = Vec::new();
    let mut malformed_count = 0;
    let mut data_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let line = line.trim_end();

        let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => rest,
            None if line.is_empty() || line.starts_with('#') => continue,
            None => line,
        };

        data_lines += 1;

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(line = line_number, domain = %cookie.domain, name = %cookie.name, "parsed cookie");
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                malformed_count += 1;
            }
        }
    }

    if cookies.is_empty() && data_lines > 0 {
        return Err(CookieError::NoCookiesFound { malformed_count });
    }

    Ok(cookies)
}

/// Joins live cookies into a `Cookie` header value (`name=value; ...`).
///
/// Expired cookies and cookies with empty values are dropped.
#[must_use]
pub fn cookie_header(cookies: &[CookieLine], now: u64) -> String {
    cookies
        .iter()
        .filter(|cookie| {
            if cookie.is_expired(now) {
                debug!(name = %cookie.name, domain = %cookie.domain, "dropping expired cookie");
                return false;
            }
            !cookie.value().is_empty()
        })
        .map(|cookie| format!("{}={}", cookie.name, cookie.value()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn parse_cookie_line(line: &str, line_number: usize) -> Result<CookieLine, CookieError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        content: redact_line_for_error(line),
        reason,
    };

    if fields.len() != 7 {
        return Err(invalid(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        )));
    }

    let expires = fields[4].parse::<u64>().map_err(|_| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{}'",
            fields[4]
        ))
    })?;

    if fields[0].is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }
    if fields[5].is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    Ok(CookieLine::new(
        fields[0].to_string(),
        expires,
        fields[5].to_string(),
        fields[6].to_string(),
    ))
}

/// Redacts the value (7th field) from a line for safe error messages.
///
/// Short lines keep only their first field, since the value's position is unknown.
fn redact_line_for_error(line: &str) -> String {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() >= 7 {
        let mut redacted = fields[..6].join("\t");
        redacted.push_str("\t[REDACTED]");
        redacted
    } else if fields.len() > 1 {
        format!("{}\t[REDACTED]", fields[0])
    } else {
        "[REDACTED]".to_string()
    }
}
