//! CLI command implementations.

pub mod jobs;
pub mod worker;

use anyhow::{Context, Result};
use commitdrip_core::JobId;

fn parse_id(id: &str) -> Result<JobId> {
    id.parse::<JobId>()
        .with_context(|| format!("Invalid job id: {}", id))
}
