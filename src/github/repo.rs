//! Repository coordinates parsed from clone URLs.

use serde::Serialize;
use std::fmt;

use crate::error::{PromoteError, Result};

/// A repository on a source-control host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub host: String,
}

impl RepoRef {
    pub fn new(
        host: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            host: host.into(),
        }
    }

    /// Parse `https://host/owner/name(.git)`, `ssh://git@host/owner/name`
    /// or the scp-like `git@host:owner/name(.git)`.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        let (host, path) = match url::Url::parse(source) {
            Ok(url) => (url.host_str().unwrap_or_default().to_string(), url.path().to_string()),
            Err(_) => {
                let (user_host, path) = source
                    .split_once(':')
                    .ok_or_else(|| unparseable(source))?;
                let host = user_host.rsplit_once('@').map_or(user_host, |(_, h)| h);
                (host.to_string(), path.to_string())
            }
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let [.., owner, name] = segments.as_slice() else {
            return Err(unparseable(source));
        };
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            return Err(unparseable(source));
        }

        Ok(Self::new(host, *owner, name))
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn unparseable(source: &str) -> PromoteError {
    PromoteError::invalid(format!(
        "cannot determine repository owner and name from '{}'",
        source
    ))
}
