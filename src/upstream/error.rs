//! Error types for upstream calls.

use thiserror::Error;

/// Errors from a single upstream request.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {url}: {source}")]
    Network {
        /// Endpoint that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout calling {url}")]
    Timeout {
        /// Endpoint that timed out.
        url: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Endpoint that answered.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// 2xx response whose body is not usable.
    #[error("malformed payload from {url}: {reason}")]
    MalformedPayload {
        /// Endpoint that answered.
        url: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// The configured endpoint is not a usable URL.
    #[error("invalid endpoint URL: {url}")]
    InvalidEndpoint {
        /// The rejected URL string.
        url: String,
    },

    /// A credential value cannot be sent as an HTTP header.
    #[error("credential value for header {name} contains invalid characters")]
    InvalidHeader {
        /// Header that could not be built.
        name: &'static str,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamError {
    /// Creates a network error, promoting timeouts to [`UpstreamError::Timeout`].
    pub fn from_transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a malformed payload error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Returns the HTTP status code, if this is a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the Retry-After header value carried by a status error.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_accessors() {
        let err = UpstreamError::http_status_with_retry_after(
            "https://x.test/graph",
            429,
            Some("7".to_string()),
        );
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after(), Some("7"));
        assert_eq!(err.to_string(), "HTTP 429 from https://x.test/graph");
    }

    #[test]
    fn test_non_status_errors_have_no_status() {
        let err = UpstreamError::timeout("https://x.test/graph");
        assert_eq!(err.status(), None);
        assert_eq!(err.retry_after(), None);

        let err = UpstreamError::malformed("https://x.test/graph", "not JSON");
        assert!(err.to_string().contains("not JSON"));
    }
}
