use crate::comment::DisplayMode;
use crate::models::PullRequestRef;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest expiry a SigV4 presigned URL accepts (7 days)
const MAX_PRESIGN_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Smallest part size S3 accepts for every part but the last (5MB)
const MIN_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Errors found while validating a loaded configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read pull request event {path}: {message}")]
    EventPayload { path: String, message: String },
}

/// Main configuration for the video publisher
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// GitHub configuration
    pub github: GitHubConfig,
    /// Recorded video location
    #[serde(default)]
    pub videos: VideosConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Pull request comment configuration
    #[serde(default)]
    pub comment: CommentConfig,
    /// Run output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

/// GitHub API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Token used for API calls
    pub token: String,
    /// Repository in `owner/repo` form
    pub repository: String,
    /// Pull request number; read from the event payload when unset
    pub pull_request: Option<u64>,
    /// Glob selecting spec files among the changed files
    #[serde(default = "default_spec_pattern")]
    pub spec_pattern: String,
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Path to the triggering event payload (`GITHUB_EVENT_PATH`)
    pub event_path: Option<String>,
}

/// Recorded video location
#[derive(Debug, Clone, Deserialize)]
pub struct VideosConfig {
    /// Directory the test runner writes videos into
    #[serde(default = "default_videos_root")]
    pub root: String,
    /// Suffix identifying video files
    #[serde(default = "default_video_suffix")]
    pub suffix: String,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket receiving the videos
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, R2, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// First segment of every object key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Upload concurrency limit
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    /// Multipart upload threshold in bytes (64MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (8MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Pull request comment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CommentConfig {
    /// Heading rendered under the marker
    #[serde(default = "default_comment_header")]
    pub header: String,
    /// How each video is rendered
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Comments requested per page while searching for the marked comment
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on pages scanned
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Run output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// File receiving `key=value` outputs (`GITHUB_OUTPUT`)
    pub path: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "pr-video-publisher".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_spec_pattern() -> String {
    "**/*.cy.{js,jsx,ts,tsx}".to_string()
}

fn default_user_agent() -> String {
    concat!("pr-video-publisher/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_videos_root() -> String {
    "cypress/videos".to_string()
}

fn default_video_suffix() -> String {
    crate::video_index::VIDEO_SUFFIX.to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_key_prefix() -> String {
    "cypress".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    259_200 // 72 hours
}

fn default_upload_concurrency() -> usize {
    5
}

fn default_multipart_threshold() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_part_size() -> usize {
    8 * 1024 * 1024 // 8MB
}

fn default_comment_header() -> String {
    "## 🎬 Cypress test videos".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    50
}

impl Config {
    /// Load configuration from defaults, config files and environment
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?;

        // Standard GitHub Actions variables seed the defaults
        for (env_var, key) in [
            ("GITHUB_TOKEN", "github.token"),
            ("GITHUB_REPOSITORY", "github.repository"),
            ("GITHUB_API_URL", "github.api_url"),
            ("GITHUB_EVENT_PATH", "github.event_path"),
            ("GITHUB_OUTPUT", "output.path"),
        ] {
            if let Ok(value) = std::env::var(env_var) {
                builder = builder.set_default(key, value)?;
            }
        }

        let config = builder
            .add_source(config::File::with_name("config/video-publisher").required(false))
            // PUBLISHER__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("PUBLISHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.token.trim().is_empty() {
            return Err(ConfigError::MissingRequired("github.token".to_string()));
        }

        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigError::MissingRequired("s3.bucket".to_string()));
        }

        if PullRequestRef::from_repository(&self.github.repository, 0).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "github.repository".to_string(),
                message: format!("expected owner/repo, got {:?}", self.github.repository),
            });
        }

        if self.s3.presigned_url_expiry_secs == 0
            || self.s3.presigned_url_expiry_secs > MAX_PRESIGN_EXPIRY_SECS
        {
            return Err(ConfigError::InvalidValue {
                key: "s3.presigned_url_expiry_secs".to_string(),
                message: format!("must be between 1 and {MAX_PRESIGN_EXPIRY_SECS}"),
            });
        }

        if self.s3.part_size_bytes < MIN_PART_SIZE_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "s3.part_size_bytes".to_string(),
                message: format!("must be at least {MIN_PART_SIZE_BYTES}"),
            });
        }

        if self.comment.page_size == 0 || self.comment.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "comment.page_size".to_string(),
                message: "page size and page count must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Resolve the pull request this run publishes for
    pub fn pull_request(&self) -> Result<PullRequestRef, ConfigError> {
        let number = match self.github.pull_request {
            Some(number) => number,
            None => {
                let path = self.github.event_path.as_deref().ok_or_else(|| {
                    ConfigError::MissingRequired("github.pull_request".to_string())
                })?;
                pull_request_number_from_event(Path::new(path))?
            }
        };

        PullRequestRef::from_repository(&self.github.repository, number).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "github.repository".to_string(),
                message: format!("expected owner/repo, got {:?}", self.github.repository),
            }
        })
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }

    pub fn videos_root(&self) -> PathBuf {
        PathBuf::from(&self.videos.root)
    }
}

/// Read the pull request number from a webhook event payload
fn pull_request_number_from_event(path: &Path) -> Result<u64, ConfigError> {
    let payload_error = |message: String| ConfigError::EventPayload {
        path: path.display().to_string(),
        message,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| payload_error(e.to_string()))?;
    let event: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| payload_error(e.to_string()))?;

    event
        .pointer("/pull_request/number")
        .or_else(|| event.get("number"))
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| payload_error("no pull request number in event".to_string()))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Default for VideosConfig {
    fn default() -> Self {
        Self {
            root: default_videos_root(),
            suffix: default_video_suffix(),
        }
    }
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            header: default_comment_header(),
            display_mode: DisplayMode::default(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}
