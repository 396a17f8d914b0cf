//! Version stream backed by a checked-out versions directory.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{PromoteError, Result};
use crate::version::VersionStream;

/// Reads `charts/<prefix>/<app>.yml` files from a version-stream checkout.
///
/// An application name of the form `prefix/app` selects the prefix
/// directory directly; a bare name searches every prefix directory in
/// sorted order and takes the first hit.
#[derive(Debug, Clone)]
pub struct FileVersionStream {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    #[serde(default)]
    version: Option<String>,
}

impl FileVersionStream {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn charts_dir(&self) -> PathBuf {
        self.root.join("charts")
    }

    fn read_version(path: &Path) -> Result<Option<String>> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PromoteError::VersionStreamUnavailable {
                message: format!("failed to read {}: {}", path.display(), e),
            })?;
        let file: VersionFile =
            serde_yaml::from_str(&content).map_err(|e| PromoteError::VersionStreamUnavailable {
                message: format!("failed to parse {}: {}", path.display(), e),
            })?;
        Ok(file.version.filter(|v| !v.trim().is_empty()))
    }

    fn candidate(dir: &Path, app: &str) -> Option<PathBuf> {
        ["yml", "yaml"]
            .iter()
            .map(|ext| dir.join(format!("{}.{}", app, ext)))
            .find(|p| p.is_file())
    }
}

#[async_trait]
impl VersionStream for FileVersionStream {
    async fn resolve_latest(&self, application: &str) -> Result<Option<String>> {
        let charts = self.charts_dir();
        if !charts.is_dir() {
            return Err(PromoteError::VersionStreamUnavailable {
                message: format!("{} is not a directory", charts.display()),
            });
        }

        if let Some((prefix, app)) = application.split_once('/') {
            return match Self::candidate(&charts.join(prefix), app) {
                Some(path) => Self::read_version(&path),
                None => Ok(None),
            };
        }

        let mut prefixes = Vec::new();
        for entry in walkdir::WalkDir::new(&charts)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| PromoteError::VersionStreamUnavailable {
                message: format!("failed to list {}: {}", charts.display(), e),
            })?;
            if entry.file_type().is_dir() {
                prefixes.push(entry.into_path());
            }
        }

        for dir in prefixes {
            if let Some(path) = Self::candidate(&dir, application) {
                return Self::read_version(&path);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn versions_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let charts = dir.path().join("charts");
        std::fs::create_dir_all(charts.join("jenkins-x")).unwrap();
        std::fs::create_dir_all(charts.join("acme")).unwrap();
        std::fs::write(charts.join("jenkins-x/myapp.yml"), "version: 1.2.3\n").unwrap();
        std::fs::write(charts.join("acme/myapp.yml"), "version: 9.9.9\n").unwrap();
        std::fs::write(charts.join("acme/empty.yml"), "gitUrl: https://example.com\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_prefixed_lookup() {
        let dir = versions_dir();
        let stream = FileVersionStream::new(dir.path());
        assert_eq!(
            stream.resolve_latest("jenkins-x/myapp").await.unwrap(),
            Some("1.2.3".into())
        );
    }

    #[tokio::test]
    async fn test_bare_name_takes_first_sorted_prefix() {
        let dir = versions_dir();
        let stream = FileVersionStream::new(dir.path());
        assert_eq!(
            stream.resolve_latest("myapp").await.unwrap(),
            Some("9.9.9".into())
        );
    }

    #[tokio::test]
    async fn test_not_found_vs_unavailable() {
        let dir = versions_dir();
        let stream = FileVersionStream::new(dir.path());
        assert_eq!(stream.resolve_latest("missing").await.unwrap(), None);
        assert_eq!(stream.resolve_latest("empty").await.unwrap(), None);

        let stream = FileVersionStream::new(dir.path().join("nope"));
        let err = stream.resolve_latest("myapp").await.unwrap_err();
        assert!(matches!(err, PromoteError::VersionStreamUnavailable { .. }));
    }
}
