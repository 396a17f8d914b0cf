//! Version resolution against a version stream.
//!
//! An explicit version always wins. Without one, the application's latest
//! version is looked up in a [`VersionStream`], keeping "not in the stream"
//! separate from "the stream could not be read" so callers only retry the
//! latter.

mod stream;

pub use stream::FileVersionStream;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::error::{PromoteError, Result};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?[0-9]+(\.[0-9]+)*(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$")
        .expect("version pattern is valid")
});

/// A catalog mapping application names to their latest known version.
#[async_trait]
pub trait VersionStream: Send + Sync {
    /// Latest version of `application`, `Ok(None)` when it is not listed.
    ///
    /// Implementations return [`PromoteError::VersionStreamUnavailable`] when
    /// the catalog itself cannot be read.
    async fn resolve_latest(&self, application: &str) -> Result<Option<String>>;
}

/// Where a resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionProvenance {
    Explicit,
    VersionStream,
}

impl fmt::Display for VersionProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::VersionStream => write!(f, "version stream"),
        }
    }
}

/// The version a promotion pins, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub version: String,
    pub provenance: VersionProvenance,
}

impl ResolvedVersion {
    pub fn explicit(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            provenance: VersionProvenance::Explicit,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Check that a string looks like a semantic version.
pub fn validate_version(version: &str) -> Result<()> {
    if VERSION_RE.is_match(version) {
        Ok(())
    } else {
        Err(PromoteError::invalid(format!(
            "'{}' is not a valid version",
            version
        )))
    }
}

/// Resolves the version to promote.
#[derive(Clone)]
pub struct VersionResolver {
    stream: Arc<dyn VersionStream>,
}

impl VersionResolver {
    pub fn new(stream: Arc<dyn VersionStream>) -> Self {
        Self { stream }
    }

    /// Resolve `application`'s version. A non-empty `explicit` version is
    /// returned verbatim without consulting the stream.
    pub async fn resolve(&self, application: &str, explicit: &str) -> Result<ResolvedVersion> {
        let explicit = explicit.trim();
        if !explicit.is_empty() {
            return Ok(ResolvedVersion::explicit(explicit));
        }

        let version = self
            .stream
            .resolve_latest(application)
            .await?
            .ok_or_else(|| PromoteError::VersionNotFound {
                application: application.to_string(),
            })?;
        debug!(application, version = %version, "resolved version from stream");

        Ok(ResolvedVersion {
            version,
            provenance: VersionProvenance::VersionStream,
        })
    }
}
