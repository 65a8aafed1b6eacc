//! PR Video Publisher
//!
//! Links the test specs changed by a pull request to the videos recorded for
//! them in CI, uploads those videos to S3-compatible storage, and keeps a
//! single comment on the pull request with time-limited playback links.
//!
//! ## Pipeline
//!
//! ```text
//! GitHub PR files        Video root (disk)
//! ┌──────────────┐       ┌──────────────┐
//! │ Changed      │       │ Video        │
//! │ Specs        │       │ Index        │
//! └──────────────┘       └──────────────┘
//!        │                      │
//!        └──────────┬───────────┘
//!                   ▼
//!            ┌──────────────┐           S3 Bucket
//!            │ Spec/Video   │          ┌──────────────────────┐
//!            │ Matcher      │          │ cypress/{owner}/     │
//!            └──────────────┘          │   {repo}/pr-{n}/     │
//!                   │                  │   {video_key}.mp4    │
//!                   ▼                  └──────────────────────┘
//!            ┌──────────────┐                  ▲
//!            │ Upload       │──────────────────┘
//!            │ Orchestrator │
//!            └──────────────┘
//!                   │ presigned URLs
//!                   ▼
//!            ┌──────────────┐
//!            │ Comment      │──────▶ one marked PR comment
//!            │ Upserter     │
//!            └──────────────┘
//! ```
//!
//! A failure to list the changed specs aborts the run. Missing videos,
//! failed uploads and comment errors are logged and never fail the run.

pub mod comment;
pub mod config;
pub mod diff;
pub mod github;
pub mod matcher;
pub mod models;
pub mod object_store;
pub mod outputs;
pub mod run;
pub mod uploader;
pub mod video_index;

pub use comment::{render_comment_body, CommentHost, CommentUpserter, DisplayMode, UpsertOutcome};
pub use config::Config;
pub use diff::{DiffProvider, SpecFilter};
pub use github::{GitHubClient, GitHubError};
pub use matcher::{match_spec, match_specs, MatchReport};
pub use models::{ChangedSpec, Match, PullRequestRef, UploadResult};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use run::{Publisher, RunReport};
pub use uploader::{stored_object_key, UploadOrchestrator};
pub use video_index::VideoIndex;
