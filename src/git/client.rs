//! [`GitClient`] backed by libgit2.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::error::{PromoteError, Result};
use crate::git::{
    BranchOps, BranchOrigin, CommitOps, GitAuth, GitClient, GitOps, PushOps, PushStatus, REMOTE,
};

/// Runs [`GitOps`] on the blocking thread pool.
///
/// Each call reopens the repository by path, so the client itself holds no
/// repository handles and can be shared across concurrent workflows.
#[derive(Debug, Clone, Default)]
pub struct Git2Client {
    auth: GitAuth,
}

impl Git2Client {
    pub fn new(auth: GitAuth) -> Self {
        Self { auth }
    }

    fn open(&self, dir: &Path) -> Result<GitOps> {
        Ok(GitOps::open(dir)?.with_auth(self.auth.clone()))
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PromoteError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl GitClient for Git2Client {
    async fn clone_repo(&self, url: &str, git_ref: Option<&str>, dest: &Path) -> Result<String> {
        let url = url.to_string();
        let git_ref = git_ref.map(String::from);
        let dest = dest.to_path_buf();
        let auth = self.auth.clone();

        blocking(move || {
            debug!(url = %url, git_ref = ?git_ref, "cloning repository");
            let git = GitOps::clone_repo(&url, git_ref.as_deref(), &dest, auth)?;
            git.current_branch()
        })
        .await
    }

    async fn checkout_branch(
        &self,
        dir: &Path,
        branch: &str,
        create_if_absent: bool,
    ) -> Result<BranchOrigin> {
        let client = self.clone();
        let dir = dir.to_path_buf();
        let branch = branch.to_string();
        blocking(move || client.open(&dir)?.checkout_or_track(&branch, create_if_absent)).await
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<String> {
        let client = self.clone();
        let dir = dir.to_path_buf();
        let message = message.to_string();
        blocking(move || {
            let git = client.open(&dir)?;
            git.stage_all()?;
            Ok(git.commit(&message)?.to_string())
        })
        .await
    }

    async fn push(&self, dir: &Path, branch: &str) -> Result<PushStatus> {
        let client = self.clone();
        let dir = dir.to_path_buf();
        let branch = branch.to_string();
        blocking(move || client.open(&dir)?.push(REMOTE, &branch)).await
    }
}
