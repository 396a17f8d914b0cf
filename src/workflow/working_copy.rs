//! Ephemeral checkouts of environment repositories.

use std::path::Path;
use tempfile::TempDir;

use crate::error::Result;

/// A scratch directory holding one clone.
///
/// The directory is removed when the value is dropped, whatever the
/// workflow's outcome.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
}

impl WorkingCopy {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("promote-").tempdir()?;
        Ok(Self { dir })
    }

    /// Directory the repository is cloned into; empty until then.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Deterministic branch name for promoting `application` to `version`.
///
/// Characters git does not accept in ref names are replaced with `-`, so
/// repeated runs for the same pair always converge on one branch.
pub fn branch_name(prefix: &str, application: &str, version: &str) -> String {
    let raw = format!("{}-{}-{}", prefix, application, version);
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '-'
        };
        // no "..", no "--" runs
        if (c == '-' || c == '.') && name.ends_with(c) {
            continue;
        }
        name.push(c);
    }
    name.trim_matches(|c| c == '-' || c == '.')
        .trim_end_matches(".lock")
        .to_string()
}
