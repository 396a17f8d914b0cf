//! Detection of the declaration format a GitOps repository uses.
//!
//! Three mutually exclusive on-disk shapes are supported. Each one is
//! recognised by a marker file; markers are probed in a fixed priority order
//! and the first one present wins.

pub(crate) mod declaration;

pub use declaration::ApplicationDeclaration;
pub(crate) use declaration::{DeclarationDocument, Schema};

use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Root helmfile of a templated values layout.
pub const HELMFILE: &str = "helmfile.yaml";
/// Flat application manifest list.
pub const JX_APPS: &str = "jx-apps.yml";
/// Pinned chart versions rendered by a separate helm step.
pub const REQUIREMENTS: &str = "env/requirements.yaml";

/// The declaration format found in a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// `jx-apps.yml` with an `apps:` list.
    FlatManifestList,
    /// `helmfile.yaml` with a `releases:` list, optionally split into
    /// per-namespace helmfiles.
    TemplatedValues,
    /// `env/requirements.yaml` with a `dependencies:` list.
    PinnedVersionFile,
    /// No supported marker present.
    Unknown,
}

/// Markers in detection priority order, most specific first.
const PRIORITY: [(LayoutKind, &str); 3] = [
    (LayoutKind::TemplatedValues, HELMFILE),
    (LayoutKind::FlatManifestList, JX_APPS),
    (LayoutKind::PinnedVersionFile, REQUIREMENTS),
];

impl LayoutKind {
    /// Repository-relative marker file, `None` for [`LayoutKind::Unknown`].
    pub fn marker(self) -> Option<&'static str> {
        PRIORITY
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, marker)| *marker)
    }

    pub(crate) fn schema(self) -> Option<&'static Schema> {
        match self {
            Self::TemplatedValues => Some(&declaration::HELMFILE_SCHEMA),
            Self::FlatManifestList => Some(&declaration::JX_APPS_SCHEMA),
            Self::PinnedVersionFile => Some(&declaration::REQUIREMENTS_SCHEMA),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FlatManifestList => "flat manifest list",
            Self::TemplatedValues => "templated values",
            Self::PinnedVersionFile => "pinned version file",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Every layout whose marker exists under `root`, in priority order.
pub fn detect_all(root: &Path) -> Vec<LayoutKind> {
    PRIORITY
        .iter()
        .filter(|(_, marker)| root.join(marker).is_file())
        .map(|(kind, _)| *kind)
        .collect()
}

/// Determine the layout of the working copy at `root`.
///
/// Never fails: a repository with no marker is [`LayoutKind::Unknown`].
pub fn detect(root: &Path) -> LayoutKind {
    let found = detect_all(root);
    if found.len() > 1 {
        warn!(
            root = %root.display(),
            markers = ?found.iter().filter_map(|k| k.marker()).collect::<Vec<_>>(),
            "multiple layout markers present, using the highest priority one"
        );
    }
    let kind = found.first().copied().unwrap_or(LayoutKind::Unknown);
    debug!(root = %root.display(), layout = %kind, "detected repository layout");
    kind
}
