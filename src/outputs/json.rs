//! JSON output of a harvest result.

use crate::models::HarvestResult;
use crate::utils::thread_slug;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `result` to `{json_output_dir}/{thread-slug}.json` and return the path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_result(
    result: &HarvestResult,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(result)?;

    if let Err(e) = fs::create_dir_all(json_output_dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = PathBuf::from(json_output_dir).join(format!("{}.json", thread_slug(&result.thread_url)));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote harvest JSON");

    Ok(path)
}
