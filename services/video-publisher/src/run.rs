use crate::comment::{CommentHost, CommentSettings, CommentUpserter, UpsertOutcome};
use crate::config::Config;
use crate::diff::DiffProvider;
use crate::matcher::match_specs;
use crate::models::{PullRequestRef, UploadResult};
use crate::object_store::ObjectStore;
use crate::uploader::UploadOrchestrator;
use crate::video_index::VideoIndex;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Outcome of one publishing run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Uploaded videos in changed-spec order
    pub results: Vec<UploadResult>,
    /// Changed specs without a recorded video
    pub unmatched: Vec<String>,
    pub comment: UpsertOutcome,
}

impl RunReport {
    pub fn uploaded_count(&self) -> usize {
        self.results.len()
    }
}

/// Inputs of a run that do not come from a collaborator
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub spec_pattern: String,
    pub videos_root: PathBuf,
    pub video_suffix: String,
    pub url_expiry: Duration,
}

/// Index → match → upload → comment pipeline for one pull request
pub struct Publisher {
    diff: Arc<dyn DiffProvider>,
    uploader: UploadOrchestrator,
    upserter: CommentUpserter,
    settings: PublisherSettings,
}

impl Publisher {
    pub fn new(
        diff: Arc<dyn DiffProvider>,
        uploader: UploadOrchestrator,
        upserter: CommentUpserter,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            diff,
            uploader,
            upserter,
            settings,
        }
    }

    /// Wire a publisher from configuration and collaborators
    pub fn from_config(
        config: &Config,
        diff: Arc<dyn DiffProvider>,
        store: Arc<dyn ObjectStore>,
        comments: Arc<dyn CommentHost>,
    ) -> Self {
        let uploader = UploadOrchestrator::new(
            store,
            config.s3.upload_concurrency,
            config.presigned_url_expiry(),
            config.s3.key_prefix.clone(),
        );

        let upserter = CommentUpserter::new(
            comments,
            CommentSettings {
                header: config.comment.header.clone(),
                display_mode: config.comment.display_mode,
                page_size: config.comment.page_size,
                max_pages: config.comment.max_pages,
            },
        );

        Self::new(
            diff,
            uploader,
            upserter,
            PublisherSettings {
                spec_pattern: config.github.spec_pattern.clone(),
                videos_root: config.videos_root(),
                video_suffix: config.videos.suffix.clone(),
                url_expiry: config.presigned_url_expiry(),
            },
        )
    }

    /// Run the pipeline for `pr`.
    ///
    /// Only a failure to list the changed specs is returned as an error; it
    /// happens before any upload or comment work. Everything after that is
    /// reported in the [`RunReport`].
    #[instrument(skip_all, fields(pr = %pr))]
    pub async fn run(&self, pr: &PullRequestRef) -> Result<RunReport> {
        let specs = self
            .diff
            .list_changed_specs(pr, &self.settings.spec_pattern)
            .await
            .context("Failed to list changed specs")?;

        if specs.is_empty() {
            info!(pattern = %self.settings.spec_pattern, "No changed specs in pull request");
        }

        let root = self.settings.videos_root.clone();
        let suffix = self.settings.video_suffix.clone();
        let index = tokio::task::spawn_blocking(move || VideoIndex::build(&root, &suffix))
            .await
            .context("Video indexing task failed")?;

        let report = match_specs(&specs, &index);
        let results = self.uploader.upload(pr, &report.matches).await;
        let comment = self
            .upserter
            .upsert(pr, &results, self.settings.url_expiry.as_secs())
            .await;

        info!(
            changed_specs = specs.len(),
            matched = report.matches.len(),
            uploaded = results.len(),
            unmatched = report.unmatched.len(),
            comment = ?comment,
            "Run finished"
        );

        Ok(RunReport {
            results,
            unmatched: report.unmatched,
            comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comment::{MockCommentHost, COMMENT_MARKER};
    use crate::models::ChangedSpec;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StaticDiff(Option<Vec<ChangedSpec>>);

    #[async_trait]
    impl DiffProvider for StaticDiff {
        async fn list_changed_specs(
            &self,
            _pr: &PullRequestRef,
            _pattern: &str,
        ) -> Result<Vec<ChangedSpec>> {
            match &self.0 {
                Some(specs) => Ok(specs.clone()),
                None => bail!("GitHub API returned 500"),
            }
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> Result<()> {
            assert!(path.is_file());
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn presign_get(&self, key: &str, _expiry: Duration) -> Result<String> {
            Ok(format!("https://s3.test/{key}"))
        }
    }

    fn pr() -> PullRequestRef {
        PullRequestRef::new("acme", "web", 3)
    }

    fn publisher(
        diff: StaticDiff,
        store: Arc<RecordingStore>,
        host: MockCommentHost,
        videos_root: &Path,
    ) -> Publisher {
        Publisher::new(
            Arc::new(diff),
            UploadOrchestrator::new(store, 5, Duration::from_secs(259_200), "cypress"),
            CommentUpserter::new(
                Arc::new(host),
                CommentSettings {
                    header: "## Videos".to_string(),
                    display_mode: Default::default(),
                    page_size: 100,
                    max_pages: 10,
                },
            ),
            PublisherSettings {
                spec_pattern: "**/*.cy.ts".to_string(),
                videos_root: videos_root.to_path_buf(),
                video_suffix: ".mp4".to_string(),
                url_expiry: Duration::from_secs(259_200),
            },
        )
    }

    fn record_video(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"mp4").unwrap();
    }

    #[tokio::test]
    async fn test_full_run() {
        let videos = TempDir::new().unwrap();
        record_video(videos.path(), "auth/login.cy.ts.mp4");
        record_video(videos.path(), "cart.cy.ts.mp4");

        let diff = StaticDiff(Some(vec![
            ChangedSpec::new("cypress/e2e/cart.cy.ts"),
            ChangedSpec::new("cypress/e2e/unrecorded.cy.ts"),
            ChangedSpec::new("cypress/e2e/auth/login.cy.ts"),
        ]));

        let mut host = MockCommentHost::new();
        host.expect_list_comments()
            .times(1)
            .returning(|_, _, _| Ok(vec![]));
        host.expect_create_comment()
            .withf(|_, body| body.starts_with(COMMENT_MARKER) && body.contains("72 hours"))
            .times(1)
            .returning(|_, _| Ok(11));

        let store = Arc::new(RecordingStore::default());
        let report = publisher(diff, store.clone(), host, videos.path())
            .run(&pr())
            .await
            .unwrap();

        assert_eq!(report.uploaded_count(), 2);
        assert_eq!(report.results[0].spec, "cypress/e2e/cart.cy.ts");
        assert_eq!(
            report.results[0].url,
            "https://s3.test/cypress/acme/web/pr-3/cart.cy.ts.mp4"
        );
        assert_eq!(report.results[1].spec, "cypress/e2e/auth/login.cy.ts");
        assert_eq!(report.unmatched, vec!["cypress/e2e/unrecorded.cy.ts"]);
        assert_eq!(report.comment, UpsertOutcome::Created { comment_id: 11 });
        assert_eq!(store.keys.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_diff_failure_is_fatal_and_does_no_work() {
        let videos = TempDir::new().unwrap();
        record_video(videos.path(), "cart.cy.ts.mp4");

        let mut host = MockCommentHost::new();
        host.expect_list_comments().never();
        host.expect_create_comment().never();
        host.expect_update_comment().never();

        let store = Arc::new(RecordingStore::default());
        let err = publisher(StaticDiff(None), store.clone(), host, videos.path())
            .run(&pr())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("GitHub API returned 500"));
        assert!(store.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_video_root_skips_comment() {
        let videos = TempDir::new().unwrap();

        let mut host = MockCommentHost::new();
        host.expect_list_comments().never();
        host.expect_create_comment().never();

        let store = Arc::new(RecordingStore::default());
        let diff = StaticDiff(Some(vec![ChangedSpec::new("cypress/e2e/cart.cy.ts")]));
        let report = publisher(diff, store, host, &videos.path().join("missing"))
            .run(&pr())
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.comment, UpsertOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_comment_failure_keeps_results() {
        let videos = TempDir::new().unwrap();
        record_video(videos.path(), "cart.cy.ts.mp4");

        let mut host = MockCommentHost::new();
        host.expect_list_comments()
            .returning(|_, _, _| Err(anyhow::anyhow!("Resource not accessible by integration")));

        let store = Arc::new(RecordingStore::default());
        let diff = StaticDiff(Some(vec![ChangedSpec::new("cypress/e2e/cart.cy.ts")]));
        let report = publisher(diff, store, host, videos.path())
            .run(&pr())
            .await
            .unwrap();

        assert_eq!(report.uploaded_count(), 1);
        assert!(matches!(report.comment, UpsertOutcome::Failed { .. }));
    }
}
