use crate::models::{Match, PullRequestRef, UploadResult};
use crate::object_store::{ObjectStore, VIDEO_CONTENT_TYPE};
use anyhow::Result;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Object key for a video: `{prefix}/{owner}/{repo}/pr-{number}/{video_key}.mp4`.
///
/// Stable across re-runs, so a new recording overwrites the previous one.
pub fn stored_object_key(prefix: &str, pr: &PullRequestRef, video_key: &str) -> String {
    format!(
        "{prefix}/{owner}/{repo}/pr-{number}/{video_key}.mp4",
        prefix = prefix.trim_end_matches('/'),
        owner = pr.owner,
        repo = pr.repo,
        number = pr.number,
    )
}

/// Uploads matched videos with a bounded number of uploads in flight
pub struct UploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
    url_expiry: Duration,
    key_prefix: String,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        concurrency: usize,
        url_expiry: Duration,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            url_expiry,
            key_prefix: key_prefix.into(),
        }
    }

    /// Upload every match and return the successes in input order.
    ///
    /// `min(concurrency, matches.len())` workers pull positions from a shared
    /// cursor and write each success into the slot of its input position.
    /// A failed item is logged and left out; it never stops its siblings.
    #[instrument(skip_all, fields(pr = %pr, matches = matches.len()))]
    pub async fn upload(&self, pr: &PullRequestRef, matches: &[Match]) -> Vec<UploadResult> {
        if matches.is_empty() {
            return Vec::new();
        }

        let worker_count = self.concurrency.min(matches.len());
        let cursor = AtomicUsize::new(0);
        let slots: Vec<OnceLock<UploadResult>> = matches.iter().map(|_| OnceLock::new()).collect();

        let (cursor_ref, slots_ref) = (&cursor, &slots);
        let workers = (0..worker_count).map(|_| async move {
            loop {
                let position = cursor_ref.fetch_add(1, Ordering::Relaxed);
                let Some(item) = matches.get(position) else {
                    break;
                };

                match self.upload_one(pr, item).await {
                    Ok(result) => {
                        // Each position is handed out exactly once
                        let _ = slots_ref[position].set(result);
                    }
                    Err(e) => {
                        warn!(
                            spec = %item.spec_path,
                            video = %item.video_path.display(),
                            error = %format!("{e:#}"),
                            "Video upload failed, skipping"
                        );
                    }
                }
            }
        });

        join_all(workers).await;

        let results: Vec<UploadResult> = slots
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect();

        info!(
            uploaded = results.len(),
            failed = matches.len() - results.len(),
            workers = worker_count,
            "Video uploads finished"
        );

        results
    }

    async fn upload_one(&self, pr: &PullRequestRef, item: &Match) -> Result<UploadResult> {
        let key = stored_object_key(&self.key_prefix, pr, &item.video_key);

        self.store
            .put_file(&key, &item.video_path, VIDEO_CONTENT_TYPE)
            .await?;
        let url = self.store.presign_get(&key, self.url_expiry).await?;

        Ok(UploadResult {
            spec: item.spec_path.clone(),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Store stub that records peak concurrency and can fail chosen keys
    #[derive(Default)]
    struct InstrumentedStore {
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        puts: Mutex<Vec<String>>,
        failing_keys: Vec<String>,
        delays_ms: Vec<(String, u64)>,
    }

    impl InstrumentedStore {
        fn delay_for(&self, key: &str) -> u64 {
            self.delays_ms
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, d)| *d)
                .unwrap_or(10)
        }
    }

    #[async_trait]
    impl ObjectStore for InstrumentedStore {
        async fn put_file(&self, key: &str, _path: &Path, content_type: &str) -> Result<()> {
            assert_eq!(content_type, "video/mp4");
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(self.delay_for(key))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.puts.lock().unwrap().push(key.to_string());

            if self.failing_keys.iter().any(|k| k == key) {
                bail!("simulated store failure");
            }
            Ok(())
        }

        async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String> {
            Ok(format!("https://store.test/{key}?expires={}", expiry.as_secs()))
        }
    }

    fn pr() -> PullRequestRef {
        PullRequestRef::new("acme", "web", 12)
    }

    fn matches(n: usize) -> Vec<Match> {
        (0..n)
            .map(|i| Match {
                spec_path: format!("cypress/e2e/spec{i}.cy.ts"),
                video_key: format!("spec{i}.cy.ts"),
                video_path: PathBuf::from(format!("/videos/spec{i}.cy.ts.mp4")),
            })
            .collect()
    }

    fn key(i: usize) -> String {
        format!("cypress/acme/web/pr-12/spec{i}.cy.ts.mp4")
    }

    #[test]
    fn test_stored_object_key() {
        assert_eq!(
            stored_object_key("cypress", &pr(), "auth/login.cy.ts"),
            "cypress/acme/web/pr-12/auth/login.cy.ts.mp4"
        );
        assert_eq!(
            stored_object_key("cypress/", &pr(), "a.cy.ts"),
            "cypress/acme/web/pr-12/a.cy.ts.mp4"
        );
    }

    #[tokio::test]
    async fn test_bounded_concurrency_and_input_order() {
        // Later items finish first, so completion order differs from input order
        let store = Arc::new(InstrumentedStore {
            delays_ms: (0..7).map(|i| (key(i), 70 - 10 * i as u64)).collect(),
            ..Default::default()
        });
        let orchestrator =
            UploadOrchestrator::new(store.clone(), 5, Duration::from_secs(3600), "cypress");

        let results = orchestrator.upload(&pr(), &matches(7)).await;

        assert_eq!(store.peak_in_flight.load(Ordering::SeqCst), 5);
        assert_eq!(results.len(), 7);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.spec, format!("cypress/e2e/spec{i}.cy.ts"));
            assert_eq!(
                result.url,
                format!("https://store.test/{}?expires=3600", key(i))
            );
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let store = Arc::new(InstrumentedStore {
            failing_keys: vec![key(2)],
            ..Default::default()
        });
        let orchestrator =
            UploadOrchestrator::new(store.clone(), 5, Duration::from_secs(60), "cypress");

        let results = orchestrator.upload(&pr(), &matches(7)).await;

        let specs: Vec<&str> = results.iter().map(|r| r.spec.as_str()).collect();
        assert_eq!(
            specs,
            vec![
                "cypress/e2e/spec0.cy.ts",
                "cypress/e2e/spec1.cy.ts",
                "cypress/e2e/spec3.cy.ts",
                "cypress/e2e/spec4.cy.ts",
                "cypress/e2e/spec5.cy.ts",
                "cypress/e2e/spec6.cy.ts",
            ]
        );
        assert_eq!(store.puts.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_fewer_matches_than_limit() {
        let store = Arc::new(InstrumentedStore::default());
        let orchestrator =
            UploadOrchestrator::new(store.clone(), 10, Duration::from_secs(60), "cypress");

        let results = orchestrator.upload(&pr(), &matches(3)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(store.peak_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_uploads() {
        let store = Arc::new(InstrumentedStore::default());
        let orchestrator =
            UploadOrchestrator::new(store.clone(), 0, Duration::from_secs(60), "cypress");

        let results = orchestrator.upload(&pr(), &matches(2)).await;

        assert_eq!(results.len(), 2);
        assert_eq!(store.peak_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_matches_do_not_touch_store() {
        let store = Arc::new(InstrumentedStore::default());
        let orchestrator =
            UploadOrchestrator::new(store.clone(), 5, Duration::from_secs(60), "cypress");

        let results = orchestrator.upload(&pr(), &[]).await;

        assert!(results.is_empty());
        assert!(store.puts.lock().unwrap().is_empty());
    }
}
