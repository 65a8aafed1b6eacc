use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default suffix of recorded video files
pub const VIDEO_SUFFIX: &str = ".mp4";

/// In-memory index of recorded videos keyed by their root-relative path
/// with the video suffix stripped.
///
/// `root/auth/login.cy.ts.mp4` is indexed as `auth/login.cy.ts`. Keys always
/// use `/` as separator regardless of platform.
#[derive(Debug, Clone, Default)]
pub struct VideoIndex {
    entries: HashMap<String, PathBuf>,
}

impl VideoIndex {
    /// Walk `root` once and index every regular file ending with `suffix`.
    ///
    /// A missing or empty root yields an empty index; a run without recorded
    /// videos is legitimate.
    pub fn build(root: &Path, suffix: &str) -> Self {
        let mut entries = HashMap::new();

        if !root.is_dir() {
            info!(root = %root.display(), "Video root not found, no videos indexed");
            return Self { entries };
        }

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry under video root");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };

            if let Some(key) = video_key(relative, suffix) {
                debug!(key = %key, path = %entry.path().display(), "Indexed video");
                entries.insert(key, entry.path().to_path_buf());
            }
        }

        info!(
            root = %root.display(),
            videos = entries.len(),
            "Video index built"
        );

        Self { entries }
    }

    pub fn from_entries<I, K, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.entries.get(key).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(k, p)| (k.as_str(), p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive the index key for a root-relative file path, or `None` if the file
/// is not a video.
fn video_key(relative: &Path, suffix: &str) -> Option<String> {
    let segments: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    let joined = segments.join("/");
    let key = joined.strip_suffix(suffix)?;
    let file_stem = key.rsplit('/').next().unwrap_or(key);

    if file_stem.is_empty() {
        return None;
    }

    Some(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"video").unwrap();
        path
    }

    #[test]
    fn test_indexes_mp4_files_by_relative_key() {
        let dir = TempDir::new().unwrap();
        let ab = touch(dir.path(), "a/b.ext.mp4");
        let xy = touch(dir.path(), "x/y.ext.mp4");
        touch(dir.path(), "a/b.ext.png");
        touch(dir.path(), "notes.txt");

        let index = VideoIndex::build(dir.path(), VIDEO_SUFFIX);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a/b.ext"), Some(ab.as_path()));
        assert_eq!(index.get("x/y.ext"), Some(xy.as_path()));
    }

    #[test]
    fn test_nested_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "e2e/auth/deep/login.cy.ts.mp4");
        touch(dir.path(), "top.cy.js.mp4");

        let index = VideoIndex::build(dir.path(), VIDEO_SUFFIX);

        let mut keys: Vec<&str> = index.iter().map(|(k, _)| k).collect();
        keys.sort();
        assert_eq!(keys, vec!["e2e/auth/deep/login.cy.ts", "top.cy.js"]);
    }

    #[test]
    fn test_directory_named_like_video_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("fake.cy.ts.mp4")).unwrap();

        let index = VideoIndex::build(dir.path(), VIDEO_SUFFIX);
        assert!(index.is_empty());
    }

    #[test]
    fn test_missing_root_returns_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = VideoIndex::build(&dir.path().join("does-not-exist"), VIDEO_SUFFIX);
        assert!(index.is_empty());
    }

    #[test]
    fn test_empty_root_returns_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = VideoIndex::build(dir.path(), VIDEO_SUFFIX);
        assert!(index.is_empty());
    }

    #[test]
    fn test_video_key() {
        assert_eq!(
            video_key(Path::new("a/b/c.ext.mp4"), ".mp4"),
            Some("a/b/c.ext".to_string())
        );
        assert_eq!(video_key(Path::new("a/b/c.ext.webm"), ".mp4"), None);
        assert_eq!(video_key(Path::new("a/.mp4"), ".mp4"), None);
    }
}
