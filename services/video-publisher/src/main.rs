use anyhow::{Context, Result};
use pr_video_publisher::outputs::write_outputs;
use pr_video_publisher::{Config, GitHubClient, Publisher, S3ObjectStore};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level, config.service.json_logs);

    if let Err(e) = run(&config).await {
        error!(error = %format!("{e:#}"), "Video publishing failed");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

async fn run(config: &Config) -> Result<()> {
    let pr = config
        .pull_request()
        .context("Failed to resolve pull request")?;

    info!(
        service = %config.service.name,
        pr = %pr,
        videos_root = %config.videos.root,
        "Starting video publishing"
    );

    let github = Arc::new(
        GitHubClient::new(&config.github).context("Failed to initialize GitHub client")?,
    );

    let store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize S3 object store")?,
    );

    let publisher = Publisher::from_config(config, github.clone(), store, github);
    let report = publisher.run(&pr).await?;

    write_outputs(
        &report.results,
        config.output.path.as_deref().map(Path::new),
    )?;

    info!(
        uploaded = report.uploaded_count(),
        unmatched = report.unmatched.len(),
        "Video publishing finished"
    );

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}
