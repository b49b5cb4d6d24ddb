//! `id`: print the resource identifier of a company URL.

use anyhow::Result;
use harvester_core::extract_resource_id;
use serde_json::json;

use super::print_json;
use crate::cli::IdArgs;

pub(crate) fn run_id_command(args: &IdArgs) -> Result<()> {
    let resource = extract_resource_id(&args.url)?;
    print_json(&json!({ "resource_id": resource }))
}
