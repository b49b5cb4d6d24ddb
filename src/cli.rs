//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use harvester_core::auth::DEFAULT_TOKEN_TTL;
use harvester_core::harvest::{
    DEFAULT_BATCH_SIZE, DEFAULT_COOLDOWN_EVERY, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS,
};
use harvester_core::upstream::DEFAULT_ENDPOINT;

/// Rate-limited bulk harvesting of a paginated upstream API.
///
/// Every command prints JSON on stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resource identifier embedded in a company URL
    Id(IdArgs),
    /// Obtain valid credentials, refreshing them from the captured session if needed
    Auth(AuthArgs),
    /// Discover how many pages a resource has
    Pages(PagesArgs),
    /// Harvest every page of a resource into a new output directory
    Scrape(ScrapeArgs),
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Company page URL containing an `E<digits>` identifier
    #[arg(long)]
    pub url: String,
}

/// Captured-session inputs and the durable token store.
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// CSRF token captured from a logged-in session
    #[arg(long, env = "HARVESTER_CSRF_TOKEN", hide_env_values = true)]
    pub csrf_token: Option<String>,

    /// Raw `Cookie` header captured from a logged-in session
    #[arg(long, env = "HARVESTER_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Netscape-format cookie export (used when --cookie is absent)
    #[arg(long, env = "HARVESTER_COOKIE_FILE")]
    pub cookie_file: Option<PathBuf>,

    /// Token store file [default: <config dir>/harvester/token.json]
    #[arg(long, env = "HARVESTER_TOKEN_STORE")]
    pub token_store: Option<PathBuf>,

    /// Seconds a stored token stays fresh
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL.as_secs())]
    pub token_ttl_secs: u64,
}

/// Upstream connection settings.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Upstream GraphQL endpoint
    #[arg(long, env = "HARVESTER_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Whole-request timeout in seconds (1-600)
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub request_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Validate stored credentials live against this company URL
    #[arg(long)]
    pub url: Option<String>,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

#[derive(Args, Debug)]
pub struct PagesArgs {
    /// Company page URL
    #[arg(long)]
    pub url: String,

    /// Total attempts for the discovery request (1-10)
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: u32,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Company page URL
    #[arg(long)]
    pub url: String,

    /// Only harvest the first N pages
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: Option<u32>,

    /// Parent directory for the run's output directory
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Concurrent workers (1-1000)
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Total attempts per page, including the first (1-10)
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: u32,

    /// Completed pages between global cooldowns
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_EVERY)]
    pub cooldown_every: u64,

    /// Minimum global cooldown in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub cooldown_min_ms: u64,

    /// Maximum global cooldown in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub cooldown_max_ms: u64,

    /// Minimum per-task jitter in milliseconds
    #[arg(long, default_value_t = 100)]
    pub jitter_min_ms: u64,

    /// Maximum per-task jitter in milliseconds
    #[arg(long, default_value_t = 300)]
    pub jitter_max_ms: u64,

    /// Consecutive tasks per worker between batch delays
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u32,

    /// Minimum batch delay in milliseconds
    #[arg(long, default_value_t = 500)]
    pub batch_delay_min_ms: u64,

    /// Maximum batch delay in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub batch_delay_max_ms: u64,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}
