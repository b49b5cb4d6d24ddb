//! Harvester Core Library
//!
//! Bulk ingestion of a paginated upstream API under two constraints: stay
//! below the upstream's abuse defenses, and never lose or duplicate a page
//! despite transient failures.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`identifier`] - Resource identifier extraction from company URLs
//! - [`auth`] - Credential record, durable store and reuse-or-refresh cache
//! - [`upstream`] - HTTP client, batched queries and the live credential probe
//! - [`harvest`] - Retry policy, cooldown gate, work queue, worker pool and
//!   run orchestration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod harvest;
pub mod identifier;
pub mod upstream;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use auth::{AuthError, TokenCache, TokenRecord};
pub use harvest::{HarvestConfig, Harvester, RunError, RunSummary};
pub use identifier::{ResourceId, ValidationError, extract_resource_id};
pub use upstream::{PageSource, UpstreamClient, UpstreamError};
