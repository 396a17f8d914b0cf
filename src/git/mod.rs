//! Git operations on environment working copies.
//!
//! [`GitOps`] wraps a `git2::Repository` with the branch, commit and push
//! operations a promotion needs. The workflow reaches git through the
//! [`GitClient`] capability so tests can substitute an in-memory fake;
//! [`Git2Client`] is the real implementation.

mod auth;
mod branch;
mod client;
mod commit;
mod push;

pub use auth::GitAuth;
pub use branch::BranchOps;
pub use client::Git2Client;
pub use commit::CommitOps;
pub use push::PushOps;

use crate::error::{PromoteError, Result};
use async_trait::async_trait;
use git2::{FetchOptions, Repository};
use serde::Serialize;
use std::path::Path;

/// Name of the remote a cloned working copy pushes to.
pub const REMOTE: &str = "origin";

/// How [`GitClient::checkout_branch`] obtained the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchOrigin {
    /// Already present in the working copy.
    Local,
    /// Tracks a branch that already exists on the remote.
    Remote,
    /// Newly created from the checked out base.
    Created,
}

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    /// The remote refused the update, typically a non-fast-forward.
    Rejected(String),
}

/// Git primitives the promotion workflow depends on.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Clone `url` into `dest`, checking out `git_ref` when given.
    ///
    /// Returns the checked out branch. Transport failures are
    /// [`PromoteError::RepositoryUnavailable`].
    async fn clone_repo(&self, url: &str, git_ref: Option<&str>, dest: &Path) -> Result<String>;

    /// Check out `branch`, tracking an existing remote branch of the same name.
    async fn checkout_branch(
        &self,
        dir: &Path,
        branch: &str,
        create_if_absent: bool,
    ) -> Result<BranchOrigin>;

    /// Stage everything and commit. Returns the commit id.
    async fn commit(&self, dir: &Path, message: &str) -> Result<String>;

    /// Push `branch` to the clone's remote without forcing.
    async fn push(&self, dir: &Path, branch: &str) -> Result<PushStatus>;
}

/// Git operations wrapper with write capabilities.
///
/// # Example
///
/// ```rust,no_run
/// use gitops_promote::git::{BranchOps, CommitOps, GitAuth, GitOps, PushOps, REMOTE};
///
/// let git = GitOps::open("./environment-staging")?
///     .with_auth(GitAuth::github_token()?);
///
/// git.checkout_or_track("promote-myapp-1.2.3", true)?;
/// // ... rewrite declarations ...
/// git.stage_all()?;
/// git.commit("chore: promote myapp to 1.2.3 in staging")?;
/// git.push(REMOTE, "promote-myapp-1.2.3")?;
/// # Ok::<(), gitops_promote::error::PromoteError>(())
/// ```
pub struct GitOps {
    repo: Repository,
    auth: GitAuth,
}

impl GitOps {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::open(path.as_ref())?;
        Ok(Self {
            repo,
            auth: GitAuth::None,
        })
    }

    /// Clone `url` into `dest`, optionally checking out branch `git_ref`.
    pub fn clone_repo(url: &str, git_ref: Option<&str>, dest: &Path, auth: GitAuth) -> Result<Self> {
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(auth.callbacks());

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(git_ref) = git_ref {
            builder.branch(git_ref);
        }

        let repo = builder
            .clone(url, dest)
            .map_err(|e| PromoteError::RepositoryUnavailable {
                url: url.to_string(),
                message: e.message().to_string(),
            })?;
        Ok(Self { repo, auth })
    }

    /// Set authentication method for remote operations.
    pub fn with_auth(mut self, auth: GitAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Get a reference to the underlying git2::Repository.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}
