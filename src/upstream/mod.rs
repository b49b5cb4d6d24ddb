//! Upstream API access: batched queries, the shared HTTP client and the
//! live credential probe.

mod client;
mod error;
mod query;

pub use client::{
    BROWSER_USER_AGENT, CONNECT_TIMEOUT, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT, PageSource,
    UpstreamClient, UpstreamProbe,
};
pub use error::UpstreamError;
pub use query::{
    PAGE_COUNT_POINTER, ParseError, extract_page_count, page_batch, parse_page_count,
    record_view_batch,
};
