use crate::models::{ChangedSpec, Match};
use crate::video_index::VideoIndex;
use tracing::{debug, warn};

/// Outcome of matching every changed spec against the video index
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    /// Matches in changed-spec order
    pub matches: Vec<Match>,
    /// Spec paths with no recorded video
    pub unmatched: Vec<String>,
}

/// Resolve the video recorded for `spec_path`.
///
/// A key matches when it equals the spec path or is a `/`-delimited suffix of
/// it, so spec and video roots may differ (standard, monorepo and custom
/// layouts). The longest matching key wins, which keeps `auth/login.cy.ts`
/// ahead of `login.cy.ts` for `cypress/e2e/auth/login.cy.ts`.
pub fn match_spec(spec_path: &str, index: &VideoIndex) -> Option<Match> {
    let spec = normalize_separators(spec_path);

    index
        .iter()
        .filter(|(key, _)| is_suffix_match(&spec, key))
        .max_by_key(|(key, _)| key.len())
        .map(|(key, path)| Match {
            spec_path: spec_path.to_string(),
            video_key: key.to_string(),
            video_path: path.to_path_buf(),
        })
}

/// Match every spec in order, reporting specs without a recorded video.
pub fn match_specs(specs: &[ChangedSpec], index: &VideoIndex) -> MatchReport {
    let mut report = MatchReport::default();

    for spec in specs {
        match match_spec(&spec.path, index) {
            Some(m) => {
                debug!(spec = %m.spec_path, video_key = %m.video_key, "Matched spec to video");
                report.matches.push(m);
            }
            None => {
                warn!(spec = %spec.path, "No recorded video found for spec");
                report.unmatched.push(spec.path.clone());
            }
        }
    }

    report
}

fn is_suffix_match(spec: &str, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    let key = normalize_separators(key);
    spec == key
        || spec
            .strip_suffix(key.as_str())
            .is_some_and(|head| head.ends_with('/'))
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
