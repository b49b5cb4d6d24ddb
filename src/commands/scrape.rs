//! `scrape`: harvest every page of a resource.

use std::sync::Arc;

use anyhow::Result;
use harvester_core::extract_resource_id;
use harvester_core::harvest::{DelayRange, HarvestConfig, Harvester, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::context::{token_cache, upstream_client};
use super::print_json;
use crate::cli::ScrapeArgs;

pub(crate) async fn run_scrape_command(args: &ScrapeArgs, cancel: &CancellationToken) -> Result<()> {
    let resource = extract_resource_id(&args.url)?;
    let config = harvest_config(args);
    config.validate()?;

    let client = upstream_client(&args.upstream)?;
    let cache = token_cache(&args.credentials, &client, Some(resource))?;
    let harvester = Harvester::new(config, Arc::new(client), Arc::new(cache))?;

    let summary = harvester.run(resource, cancel).await?;
    if summary.cancelled {
        warn!(
            unprocessed = summary.failed.len(),
            "run cancelled; summary lists untouched pages as unprocessed"
        );
    }
    print_json(&summary)
}

fn harvest_config(args: &ScrapeArgs) -> HarvestConfig {
    HarvestConfig {
        workers: args.workers,
        retry: RetryPolicy::with_max_attempts(args.max_attempts),
        cooldown_every: args.cooldown_every,
        cooldown: DelayRange::from_millis(args.cooldown_min_ms, args.cooldown_max_ms),
        task_jitter: DelayRange::from_millis(args.jitter_min_ms, args.jitter_max_ms),
        batch_size: args.batch_size,
        batch_delay: DelayRange::from_millis(args.batch_delay_min_ms, args.batch_delay_max_ms),
        page_limit: args.pages,
        output_dir: args.output_dir.clone(),
    }
}
