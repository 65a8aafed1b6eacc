use crate::models::{ChangedSpec, PullRequestRef};
use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};

/// Source of the spec files changed by a pull request.
///
/// Implementations exclude removed files and keep only paths matching
/// `pattern`, in the order the host reports them.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    async fn list_changed_specs(
        &self,
        pr: &PullRequestRef,
        pattern: &str,
    ) -> Result<Vec<ChangedSpec>>;
}

/// Glob filter for repository paths.
///
/// `*` stays within one path segment; `**/` spans any number of directories,
/// including none.
#[derive(Debug, Clone)]
pub struct SpecFilter {
    matcher: GlobMatcher,
}

impl SpecFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid spec pattern {pattern:?}"))?;

        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn is_spec(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}
