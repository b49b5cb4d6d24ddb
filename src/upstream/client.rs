//! HTTP client for the upstream GraphQL endpoint.
//!
//! [`UpstreamClient`] is created once per run and shared by every worker, so
//! all page fetches reuse one connection pool. Every request carries the
//! browser-like header template plus the current CSRF token and cookie.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, ORIGIN,
    REFERER, RETRY_AFTER, USER_AGENT,
};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::error::UpstreamError;
use super::query::{page_batch, record_view_batch};
use crate::auth::{ProbeOutcome, TokenRecord, TokenValidator};
use crate::identifier::ResourceId;

/// Default upstream endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.glassdoor.com/graph";

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connect timeout applied to every request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser User-Agent presented to the upstream.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

const CSRF_HEADER: &str = "gd-csrf-token";
const SITE_ORIGIN: &str = "https://www.glassdoor.com";
const SITE_REFERER: &str = "https://www.glassdoor.com/";

/// Fetches one page of records.
///
/// The seam between the worker pool and the network; tests substitute
/// scripted sources.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns the raw payload of `page`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] for transport failures, non-2xx statuses and
    /// payloads that are not JSON.
    async fn fetch_page(
        &self,
        resource: ResourceId,
        page: u32,
        tokens: &TokenRecord,
    ) -> Result<String, UpstreamError>;
}

/// Shared client for the upstream endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    endpoint: Url,
}

impl UpstreamClient {
    /// Creates a client for `endpoint` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidEndpoint`] for unusable URLs and
    /// [`UpstreamError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, UpstreamError> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with an explicit whole-request timeout.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    #[instrument(level = "debug")]
    pub fn with_timeout(endpoint: &str, request_timeout: Duration) -> Result<Self, UpstreamError> {
        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| UpstreamError::InvalidEndpoint {
                url: endpoint.to_string(),
            })?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .gzip(true)
            .default_headers(header_template())
            .build()
            .map_err(|source| UpstreamError::ClientBuild { source })?;

        Ok(Self { client, endpoint })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Posts a batch and returns the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport failure or non-2xx status.
    #[instrument(level = "debug", skip(self, batch, tokens))]
    pub async fn post_batch(
        &self,
        batch: &Value,
        tokens: &TokenRecord,
    ) -> Result<String, UpstreamError> {
        let url = self.endpoint.as_str();
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(credential_headers(tokens)?)
            .json(batch)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(UpstreamError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_transport(url, e))?;
        debug!(status = status.as_u16(), bytes = body.len(), "upstream response");
        Ok(body)
    }

    /// Sends a view-signal-only batch to check whether `tokens` are accepted.
    ///
    /// 2xx with a JSON array body is valid; anything else is rejected.
    #[instrument(level = "debug", skip(self, tokens), fields(resource_id = %resource))]
    pub async fn probe(&self, resource: ResourceId, tokens: &TokenRecord) -> ProbeOutcome {
        match self.post_batch(&record_view_batch(resource), tokens).await {
            Ok(body) => match serde_json::from_str::<Value>(&body) {
                Ok(Value::Array(_)) => ProbeOutcome::Valid,
                Ok(_) => ProbeOutcome::rejected("probe response is not a JSON array"),
                Err(_) => ProbeOutcome::rejected("probe response is not JSON"),
            },
            Err(UpstreamError::HttpStatus {
                status: status @ (401 | 403),
                ..
            }) => ProbeOutcome::rejected(format!("credentials refused (HTTP {status})")),
            Err(error) => ProbeOutcome::rejected(error.to_string()),
        }
    }
}

#[async_trait]
impl PageSource for UpstreamClient {
    #[instrument(level = "debug", skip(self, tokens), fields(resource_id = %resource))]
    async fn fetch_page(
        &self,
        resource: ResourceId,
        page: u32,
        tokens: &TokenRecord,
    ) -> Result<String, UpstreamError> {
        let body = self.post_batch(&page_batch(resource, page), tokens).await?;
        if let Err(error) = serde_json::from_str::<serde::de::IgnoredAny>(&body) {
            return Err(UpstreamError::malformed(
                self.endpoint.as_str(),
                format!("page {page} body is not JSON: {error}"),
            ));
        }
        Ok(body)
    }
}

/// Live credential probe against a known resource.
#[derive(Debug, Clone)]
pub struct UpstreamProbe {
    client: UpstreamClient,
    resource: ResourceId,
}

impl UpstreamProbe {
    /// Creates a probe that records a view of `resource`.
    #[must_use]
    pub fn new(client: UpstreamClient, resource: ResourceId) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl TokenValidator for UpstreamProbe {
    async fn validate(&self, record: &TokenRecord) -> ProbeOutcome {
        self.client.probe(self.resource, record).await
    }
}

fn header_template() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
    );
    headers.insert(
        HeaderName::from_static("apollographql-client-name"),
        HeaderValue::from_static("ei-reviews-next"),
    );
    headers.insert(
        HeaderName::from_static("apollographql-client-version"),
        HeaderValue::from_static("1.93.0"),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ORIGIN, HeaderValue::from_static(SITE_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static(SITE_REFERER));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

fn credential_headers(tokens: &TokenRecord) -> Result<HeaderMap, UpstreamError> {
    let mut csrf = HeaderValue::from_str(tokens.csrf_token())
        .map_err(|_| UpstreamError::InvalidHeader { name: CSRF_HEADER })?;
    csrf.set_sensitive(true);
    let mut cookie = HeaderValue::from_str(tokens.cookie())
        .map_err(|_| UpstreamError::InvalidHeader { name: "cookie" })?;
    cookie.set_sensitive(true);

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(HeaderName::from_static(CSRF_HEADER), csrf);
    headers.insert(COOKIE, cookie);
    Ok(headers)
}
