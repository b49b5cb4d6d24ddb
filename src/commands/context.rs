//! Shared construction of the upstream client and credential cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use harvester_core::ResourceId;
use harvester_core::auth::{
    AcceptWellFormed, CapturedSessionAuthenticator, CookieSource, TokenCache, TokenStore,
    TokenValidator,
};
use harvester_core::upstream::{UpstreamClient, UpstreamProbe};
use tracing::debug;

use crate::cli::{CredentialArgs, UpstreamArgs};

pub(crate) fn upstream_client(args: &UpstreamArgs) -> Result<UpstreamClient> {
    let client =
        UpstreamClient::with_timeout(&args.endpoint, Duration::from_secs(args.request_timeout_secs))?;
    debug!(endpoint = %client.endpoint(), "upstream client ready");
    Ok(client)
}

pub(crate) fn token_store(args: &CredentialArgs) -> Result<TokenStore> {
    match &args.token_store {
        Some(path) => Ok(TokenStore::at(path)),
        None => TokenStore::default_location().context("cannot locate the token store"),
    }
}

/// Cache that validates against `resource` when given, otherwise only checks
/// that the stored record is well formed.
pub(crate) fn token_cache(
    args: &CredentialArgs,
    client: &UpstreamClient,
    resource: Option<ResourceId>,
) -> Result<TokenCache> {
    let cookie = match (&args.cookie, &args.cookie_file) {
        (Some(header), _) => Some(CookieSource::Header(header.clone())),
        (None, Some(path)) => Some(CookieSource::NetscapeFile(path.clone())),
        (None, None) => None,
    };
    let authenticator = Arc::new(CapturedSessionAuthenticator::new(
        args.csrf_token.clone(),
        cookie,
    ));
    let validator: Arc<dyn TokenValidator> = match resource {
        Some(resource) => Arc::new(UpstreamProbe::new(client.clone(), resource)),
        None => Arc::new(AcceptWellFormed),
    };

    Ok(
        TokenCache::new(token_store(args)?, authenticator, validator)
            .with_ttl(Duration::from_secs(args.token_ttl_secs)),
    )
}
