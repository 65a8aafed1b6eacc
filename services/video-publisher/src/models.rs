use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pull request a run publishes for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Pull request number
    pub number: u64,
}

impl PullRequestRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// Build from an `owner/repo` string such as `GITHUB_REPOSITORY`
    pub fn from_repository(repository: &str, number: u64) -> Option<Self> {
        let (owner, repo) = repository.trim().split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo, number))
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// A spec file changed in the pull request, as reported by the diff provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedSpec {
    /// Repository-relative path
    pub path: String,
}

impl ChangedSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Pairing of one changed spec with one indexed video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub spec_path: String,
    pub video_key: String,
    pub video_path: PathBuf,
}

/// A successfully uploaded video and its playback link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub spec: String,
    pub url: String,
}
