//! Credential acquisition.
//!
//! The [`Authenticator`] trait is the seam to whatever mints raw credentials
//! (an interactive browser login, a secrets manager, a captured session).
//! [`CapturedSessionAuthenticator`] is the shipped implementation: it builds a
//! record from a CSRF token and a cookie export captured out of band.

use std::fs;
use std::io::BufReader;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::cookies::{CookieError, cookie_header, parse_netscape_cookies};
use super::{TokenRecord, unix_now};

/// Credential acquisition failure. Fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No CSRF token was supplied.
    #[error("no CSRF token available; pass --csrf-token or set HARVESTER_CSRF_TOKEN")]
    MissingCsrfToken,

    /// No cookie source was supplied or it produced an empty header.
    #[error("no usable session cookie; pass --cookie / --cookie-file or set HARVESTER_COOKIE_FILE")]
    MissingCookie,

    /// The cookie export could not be read.
    #[error("cannot read cookie file {path}: {source}")]
    CookieFile {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The cookie export could not be parsed.
    #[error("invalid cookie export: {0}")]
    Cookie(#[from] CookieError),

    /// The authenticator ran but could not produce credentials.
    #[error("credential acquisition failed: {reason}")]
    Acquisition {
        /// What went wrong.
        reason: String,
    },
}

impl AuthError {
    /// Creates a generic acquisition failure.
    pub fn acquisition(reason: impl Into<String>) -> Self {
        Self::Acquisition {
            reason: reason.into(),
        }
    }
}

/// Mints fresh credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Produces a new credential pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when credentials cannot be acquired.
    async fn acquire_credentials(&self) -> Result<TokenRecord, AuthError>;
}

/// Where the captured session cookie comes from.
#[derive(Debug, Clone)]
pub enum CookieSource {
    /// A ready-made `Cookie` header value.
    Header(String),
    /// A Netscape-format cookie export on disk.
    NetscapeFile(PathBuf),
}

/// Builds credentials from a captured CSRF token and cookie source.
#[derive(Debug, Clone, Default)]
pub struct CapturedSessionAuthenticator {
    csrf_token: Option<String>,
    cookie: Option<CookieSource>,
}

impl CapturedSessionAuthenticator {
    /// Creates an authenticator from optional captured inputs.
    ///
    /// Missing inputs only fail when a refresh is actually needed.
    #[must_use]
    pub fn new(csrf_token: Option<String>, cookie: Option<CookieSource>) -> Self {
        Self {
            csrf_token: csrf_token.filter(|token| !token.trim().is_empty()),
            cookie,
        }
    }

    fn resolve_cookie(&self) -> Result<String, AuthError> {
        let header = match &self.cookie {
            None => return Err(AuthError::MissingCookie),
            Some(CookieSource::Header(raw)) => raw.trim().to_string(),
            Some(CookieSource::NetscapeFile(path)) => {
                let file = fs::File::open(path).map_err(|source| AuthError::CookieFile {
                    path: path.clone(),
                    source,
                })?;
                let cookies = parse_netscape_cookies(BufReader::new(file))?;
                cookie_header(&cookies, unix_now())
            }
        };

        if header.is_empty() {
            return Err(AuthError::MissingCookie);
        }
        Ok(header)
    }
}

#[async_trait]
impl Authenticator for CapturedSessionAuthenticator {
    #[instrument(level = "debug", skip(self))]
    async fn acquire_credentials(&self) -> Result<TokenRecord, AuthError> {
        let csrf_token = self
            .csrf_token
            .clone()
            .ok_or(AuthError::MissingCsrfToken)?;
        let cookie = self.resolve_cookie()?;

        info!(
            cookie_pairs = cookie.split(';').count(),
            "minted credentials from captured session"
        );
        Ok(TokenRecord::issued_now(csrf_token, cookie))
    }
}
