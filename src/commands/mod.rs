//! CLI command handlers.

mod auth;
mod context;
mod id;
mod pages;
mod scrape;

use std::process::ExitCode;

use anyhow::Result;
use harvester_core::ValidationError;
use harvester_core::auth::AuthError;
use harvester_core::harvest::ConfigError;
use harvester_core::upstream::UpstreamError;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::Command;

/// Exit code for input and precondition failures.
pub(crate) const EXIT_PRECONDITION: u8 = 2;

/// Exit code for upstream, authentication and environment failures.
pub(crate) const EXIT_FAILURE: u8 = 1;

/// Runs `command`, printing its JSON result to stdout.
pub(crate) async fn dispatch(command: &Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Id(args) => id::run_id_command(args),
        Command::Auth(args) => auth::run_auth_command(args).await,
        Command::Pages(args) => pages::run_pages_command(args, cancel).await,
        Command::Scrape(args) => scrape::run_scrape_command(args, cancel).await,
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Maps a command failure to the process exit code.
pub(crate) fn exit_code(error: &anyhow::Error) -> ExitCode {
    ExitCode::from(exit_status(error))
}

fn exit_status(error: &anyhow::Error) -> u8 {
    if error.chain().any(is_precondition) {
        EXIT_PRECONDITION
    } else {
        EXIT_FAILURE
    }
}

fn is_precondition(cause: &(dyn std::error::Error + 'static)) -> bool {
    if cause.is::<ValidationError>() || cause.is::<ConfigError>() {
        return true;
    }
    if let Some(error) = cause.downcast_ref::<AuthError>() {
        return matches!(
            error,
            AuthError::MissingCsrfToken
                | AuthError::MissingCookie
                | AuthError::CookieFile { .. }
                | AuthError::Cookie(_)
        );
    }
    matches!(
        cause.downcast_ref::<UpstreamError>(),
        Some(UpstreamError::InvalidEndpoint { .. })
    )
}
