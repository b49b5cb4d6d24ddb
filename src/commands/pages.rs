//! `pages`: discover the page count of a resource.

use std::sync::Arc;

use anyhow::Result;
use harvester_core::extract_resource_id;
use harvester_core::harvest::{HarvestConfig, Harvester, RetryPolicy};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::context::{token_cache, upstream_client};
use super::print_json;
use crate::cli::PagesArgs;

pub(crate) async fn run_pages_command(args: &PagesArgs, cancel: &CancellationToken) -> Result<()> {
    let resource = extract_resource_id(&args.url)?;
    let client = upstream_client(&args.upstream)?;
    let cache = token_cache(&args.credentials, &client, Some(resource))?;

    let config = HarvestConfig {
        retry: RetryPolicy::with_max_attempts(args.max_attempts),
        ..HarvestConfig::default()
    };
    let harvester = Harvester::new(config, Arc::new(client), Arc::new(cache))?;
    let total_pages = harvester.discover(resource, cancel).await?;

    print_json(&json!({
        "resource_id": resource,
        "total_pages": total_pages,
    }))
}
