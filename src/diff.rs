//! Diff rendering for declaration changes.

use similar::{ChangeTag, TextDiff};
use std::fmt::Write;
use std::path::Path;

/// Generates a unified diff between two strings.
///
/// `path` is rendered repository-relative in the `---`/`+++` headers; a file
/// that did not exist before is diffed against `/dev/null`.
pub fn unified_diff(original: Option<&str>, modified: &str, path: &Path) -> String {
    let before = original.unwrap_or("");
    let diff = TextDiff::from_lines(before, modified);
    let mut output = String::new();

    match original {
        Some(_) => {
            writeln!(&mut output, "--- a/{}", path.display()).unwrap();
        }
        None => {
            writeln!(&mut output, "--- /dev/null").unwrap();
        }
    }
    writeln!(&mut output, "+++ b/{}", path.display()).unwrap();

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            writeln!(&mut output).unwrap();
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                write!(&mut output, "{}{}", sign, change.value()).unwrap();
                if change.missing_newline() {
                    writeln!(&mut output).unwrap();
                }
            }
        }
    }

    output
}

/// Line counts of a change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffSummary {
    /// Creates a summary from original and modified content.
    pub fn from_diff(original: &str, modified: &str) -> Self {
        let diff = TextDiff::from_lines(original, modified);
        let mut insertions = 0;
        let mut deletions = 0;

        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => insertions += 1,
                ChangeTag::Delete => deletions += 1,
                ChangeTag::Equal => {}
            }
        }

        Self {
            files_changed: if insertions > 0 || deletions > 0 { 1 } else { 0 },
            insertions,
            deletions,
        }
    }

    /// Combines two summaries.
    pub fn merge(&mut self, other: &DiffSummary) {
        self.files_changed += other.files_changed;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} file(s) changed, {} insertions(+), {} deletions(-)",
            self.files_changed, self.insertions, self.deletions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_diff_marks_version_change() {
        let diff = unified_diff(
            Some("apps:\n- name: dev/myapp\n  version: 1.0.0\n"),
            "apps:\n- name: dev/myapp\n  version: 1.2.3\n",
            Path::new("jx-apps.yml"),
        );
        assert!(diff.starts_with("--- a/jx-apps.yml\n+++ b/jx-apps.yml\n"));
        assert!(diff.contains("-  version: 1.0.0\n"));
        assert!(diff.contains("+  version: 1.2.3\n"));
    }

    #[test]
    fn test_new_file_diffs_against_dev_null() {
        let diff = unified_diff(None, "releases: []\n", Path::new("helmfiles/jx/helmfile.yaml"));
        assert!(diff.starts_with("--- /dev/null\n"));
        assert!(diff.contains("+releases: []\n"));
    }

    #[test]
    fn test_summary() {
        let mut summary = DiffSummary::from_diff("a\nb\n", "a\nc\n");
        assert_eq!(summary.insertions, 1);
        assert_eq!(summary.deletions, 1);
        summary.merge(&DiffSummary::from_diff("", "x\n"));
        assert_eq!(summary.to_string(), "2 file(s) changed, 2 insertions(+), 1 deletions(-)");
    }
}
