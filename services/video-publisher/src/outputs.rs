use crate::models::UploadResult;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Render run outputs as `key=value` lines: `results` (JSON array) and `count`
pub fn render_outputs(results: &[UploadResult]) -> Result<String> {
    let json = serde_json::to_string(results).context("Failed to serialize upload results")?;
    Ok(format!("results={json}\ncount={}\n", results.len()))
}

/// Append run outputs to `path` (the `GITHUB_OUTPUT` file), or log them when
/// no output file is configured
pub fn write_outputs(results: &[UploadResult], path: Option<&Path>) -> Result<()> {
    let rendered = render_outputs(results)?;

    let Some(path) = path else {
        info!(count = results.len(), outputs = %rendered.trim_end(), "Run outputs");
        return Ok(());
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output file {}", path.display()))?;

    file.write_all(rendered.as_bytes())
        .with_context(|| format!("Failed to write output file {}", path.display()))?;

    info!(count = results.len(), path = %path.display(), "Run outputs written");
    Ok(())
}
