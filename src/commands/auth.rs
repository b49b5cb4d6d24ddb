//! `auth`: obtain usable credentials and report their age.
//!
//! The raw token and cookie never reach stdout.

use anyhow::Result;
use harvester_core::auth::unix_now;
use harvester_core::extract_resource_id;
use serde_json::json;
use tracing::info;

use super::context::{token_cache, token_store, upstream_client};
use super::print_json;
use crate::cli::AuthArgs;

pub(crate) async fn run_auth_command(args: &AuthArgs) -> Result<()> {
    let resource = args.url.as_deref().map(extract_resource_id).transpose()?;
    let client = upstream_client(&args.upstream)?;
    let cache = token_cache(&args.credentials, &client, resource)?;
    let store = token_store(&args.credentials)?;

    let tokens = cache.acquire().await?;
    let issued_at = tokens.record.issued_at();
    let age_secs = tokens.record.age(unix_now()).as_secs();
    info!(
        refreshed = tokens.refreshed,
        age_secs,
        live_validation = resource.is_some(),
        "credentials ready"
    );

    print_json(&json!({
        "issued_at": issued_at,
        "age_secs": age_secs,
        "refreshed": tokens.refreshed,
        "token_store": store.path(),
    }))
}
