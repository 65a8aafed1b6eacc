//! Pull request summary comment.
//!
//! Every body this module renders starts with [`COMMENT_MARKER`]. The marker
//! is the only thing used to find the comment again on later runs, so each
//! pull request carries a single comment that is updated in place.

use crate::models::{PullRequestRef, UploadResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

/// Hidden token identifying comments written by this service
pub const COMMENT_MARKER: &str = "<!-- pr-video-publisher -->";

/// How each uploaded video is rendered in the comment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// One expanded `<details>` block per video with the raw link
    #[default]
    Inline,
    /// A two-column markdown table with "Watch" links
    Table,
}

/// A pull request comment as seen by the upserter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
}

/// Store of comments on a pull request
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommentHost: Send + Sync {
    /// One page of comments, oldest first. Pages start at 1.
    async fn list_comments(
        &self,
        pr: &PullRequestRef,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Comment>>;

    /// Create a comment and return its id
    async fn create_comment(&self, pr: &PullRequestRef, body: &str) -> Result<u64>;

    async fn update_comment(
        &self,
        pr: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> Result<()>;
}

/// What the upserter did with the pull request comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Nothing was uploaded; the host was not contacted
    Skipped,
    Created { comment_id: u64 },
    Updated { comment_id: u64 },
    /// `pages` full comment pages were scanned without finding the marker;
    /// nothing was written
    PageLimitReached { pages: u32 },
    /// The comment host failed; uploads are unaffected
    Failed { reason: String },
}

/// Rendering and lookup settings for the summary comment
#[derive(Debug, Clone)]
pub struct CommentSettings {
    pub header: String,
    pub display_mode: DisplayMode,
    pub page_size: u32,
    pub max_pages: u32,
}

/// Result of scanning comment pages for the marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerLookup {
    Found(u64),
    /// Every comment was scanned and none carries the marker
    Absent,
    /// The page bound was hit before the last page
    Truncated,
}

/// Finds-or-creates the single marked comment on a pull request
pub struct CommentUpserter {
    host: Arc<dyn CommentHost>,
    settings: CommentSettings,
}

impl CommentUpserter {
    pub fn new(host: Arc<dyn CommentHost>, settings: CommentSettings) -> Self {
        Self { host, settings }
    }

    /// Publish `results` on the pull request.
    ///
    /// Empty results leave the pull request untouched. Host errors are logged
    /// and returned as [`UpsertOutcome::Failed`] instead of failing the run.
    #[instrument(skip_all, fields(pr = %pr, results = results.len()))]
    pub async fn upsert(
        &self,
        pr: &PullRequestRef,
        results: &[UploadResult],
        expiry_secs: u64,
    ) -> UpsertOutcome {
        if results.is_empty() {
            info!("No videos uploaded, leaving pull request comments untouched");
            return UpsertOutcome::Skipped;
        }

        let body = render_comment_body(
            results,
            &self.settings.header,
            expiry_secs,
            self.settings.display_mode,
        );

        match self.try_upsert(pr, &body).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to publish pull request comment");
                UpsertOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }

    async fn try_upsert(&self, pr: &PullRequestRef, body: &str) -> Result<UpsertOutcome> {
        match self.find_marked_comment(pr).await? {
            MarkerLookup::Found(comment_id) => {
                self.host.update_comment(pr, comment_id, body).await?;
                info!(comment_id, "Updated video comment");
                Ok(UpsertOutcome::Updated { comment_id })
            }
            MarkerLookup::Absent => {
                let comment_id = self.host.create_comment(pr, body).await?;
                info!(comment_id, "Created video comment");
                Ok(UpsertOutcome::Created { comment_id })
            }
            MarkerLookup::Truncated => Ok(UpsertOutcome::PageLimitReached {
                pages: self.settings.max_pages,
            }),
        }
    }

    /// Scan comment pages until the marker is found, a page comes back empty
    /// or short, or `max_pages` is reached.
    async fn find_marked_comment(&self, pr: &PullRequestRef) -> Result<MarkerLookup> {
        let page_size = self.settings.page_size.max(1);

        for page in 1..=self.settings.max_pages {
            let comments = self.host.list_comments(pr, page, page_size).await?;
            debug!(page, comments = comments.len(), "Fetched comment page");

            if let Some(comment) = comments.iter().find(|c| c.body.contains(COMMENT_MARKER)) {
                return Ok(MarkerLookup::Found(comment.id));
            }

            if comments.len() < page_size as usize {
                return Ok(MarkerLookup::Absent);
            }
        }

        warn!(
            max_pages = self.settings.max_pages,
            "Comment page limit reached without finding the video comment, not posting"
        );
        Ok(MarkerLookup::Truncated)
    }
}

/// Render the comment body: marker, header, one block per result, expiry
/// trailer. The same input always renders the same body.
pub fn render_comment_body(
    results: &[UploadResult],
    header: &str,
    expiry_secs: u64,
    mode: DisplayMode,
) -> String {
    let mut body = format!("{COMMENT_MARKER}\n{header}\n\n");

    match mode {
        DisplayMode::Inline => {
            for result in results {
                body.push_str(&format!(
                    "<details open>\n<summary>{name}</summary>\n\n{url}\n\n</details>\n\n",
                    name = escape_html(&display_name(&result.spec)),
                    url = result.url,
                ));
            }
        }
        DisplayMode::Table => {
            body.push_str("| Spec | Video |\n| --- | --- |\n");
            for result in results {
                body.push_str(&format!(
                    "| `{name}` | [Watch]({url}) |\n",
                    name = display_name(&result.spec),
                    url = result.url,
                ));
            }
            body.push('\n');
        }
    }

    body.push_str(&format!(
        "---\n_Video links expire in {} hours._\n",
        expiry_hours(expiry_secs)
    ));

    body
}

fn expiry_hours(expiry_secs: u64) -> u64 {
    (expiry_secs as f64 / 3600.0).round() as u64
}

/// Escape text placed inside an HTML element
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Last two path segments of a spec path
fn display_name(spec_path: &str) -> String {
    let segments: Vec<&str> = spec_path
        .split(|c: char| c == '/' || c == '\\')
        .filter(|s| !s.is_empty())
        .collect();
    let start = segments.len().saturating_sub(2);
    segments[start..].join("/")
}
