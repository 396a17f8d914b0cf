//! Git push operations with authentication.

use crate::error::{PromoteError, Result};
use crate::git::{GitOps, PushStatus};
use git2::{ErrorCode, PushOptions};

/// Push operations for GitOps.
pub trait PushOps {
    /// Push a branch to a remote without forcing.
    ///
    /// A non-fast-forward update is reported as [`PushStatus::Rejected`]
    /// rather than an error; transport failures are errors.
    fn push(&self, remote_name: &str, branch: &str) -> Result<PushStatus>;

    /// Get the URL for a remote.
    fn remote_url(&self, remote_name: &str) -> Result<String>;
}

impl PushOps for GitOps {
    fn push(&self, remote_name: &str, branch: &str) -> Result<PushStatus> {
        let mut remote = self.repo.find_remote(remote_name).map_err(|_| {
            PromoteError::Git(git2::Error::from_str(&format!(
                "remote '{}' not found",
                remote_name
            )))
        })?;

        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        let mut rejection: Option<String> = None;

        let result = {
            let mut callbacks = self.auth.callbacks();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    rejection = Some(message.to_string());
                }
                Ok(())
            });

            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);
            remote.push(&[&refspec], Some(&mut push_options))
        };

        match result {
            Ok(()) => Ok(match rejection {
                Some(message) => PushStatus::Rejected(message),
                None => PushStatus::Pushed,
            }),
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                Ok(PushStatus::Rejected(e.message().to_string()))
            }
            Err(e) => Err(PromoteError::RepositoryUnavailable {
                url: self.remote_url(remote_name).unwrap_or_default(),
                message: format!("push failed: {}", e),
            }),
        }
    }

    fn remote_url(&self, remote_name: &str) -> Result<String> {
        let remote = self.repo.find_remote(remote_name)?;
        remote.url().map(String::from).ok_or_else(|| {
            PromoteError::InvalidConfig(format!("remote '{}' has no URL", remote_name))
        })
    }
}
