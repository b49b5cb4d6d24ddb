//! Credential management.
//!
//! This module owns the short-lived CSRF token and cookie pair that every
//! upstream request carries: the durable store it lives in, the cache that
//! decides between reuse and refresh, and the seams to whatever mints and
//! validates credentials.

mod authenticator;
mod cache;
mod cookies;
mod store;
mod token;
mod validator;

pub use authenticator::{AuthError, Authenticator, CapturedSessionAuthenticator, CookieSource};
pub use cache::{CachedTokens, DEFAULT_TOKEN_TTL, TokenCache};
pub use cookies::{CookieError, CookieLine, cookie_header, parse_netscape_cookies};
pub use store::{StoreError, TokenStore, default_token_path};
pub use token::{TokenRecord, unix_now};
pub use validator::{AcceptWellFormed, ProbeOutcome, TokenValidator};
