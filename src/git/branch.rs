//! Git branch operations.

use crate::error::{PromoteError, Result};
use crate::git::{BranchOrigin, GitOps, REMOTE};
use git2::BranchType;
use git2::build::CheckoutBuilder;

/// Branch operations for GitOps.
pub trait BranchOps {
    /// Create a new branch at HEAD.
    fn create_branch(&self, name: &str) -> Result<()>;

    /// Checkout an existing local branch.
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Checkout `name`, tracking the remote branch of the same name when
    /// there is no local one, and creating it at HEAD as a last resort.
    fn checkout_or_track(&self, name: &str, create_if_absent: bool) -> Result<BranchOrigin>;

    /// Check if a branch exists locally.
    fn branch_exists(&self, name: &str) -> bool;

    /// Check if the remote has a branch of this name.
    fn remote_branch_exists(&self, name: &str) -> bool;

    /// Get the current branch name.
    fn current_branch(&self) -> Result<String>;
}

impl BranchOps for GitOps {
    fn create_branch(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", name);

        let reference = self.repo.find_reference(&refname).map_err(|_| {
            PromoteError::Git(git2::Error::from_str(&format!(
                "branch '{}' not found",
                name
            )))
        })?;

        let obj = reference.peel(git2::ObjectType::Commit)?;
        // The working copy is private to one workflow, nothing to preserve
        self.repo
            .checkout_tree(&obj, Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head(&refname)?;

        Ok(())
    }

    fn checkout_or_track(&self, name: &str, create_if_absent: bool) -> Result<BranchOrigin> {
        if self.branch_exists(name) {
            self.checkout_branch(name)?;
            return Ok(BranchOrigin::Local);
        }

        if self.remote_branch_exists(name) {
            let remote_name = format!("{}/{}", REMOTE, name);
            let commit = self
                .repo
                .find_branch(&remote_name, BranchType::Remote)?
                .get()
                .peel_to_commit()?;
            let mut branch = self.repo.branch(name, &commit, false)?;
            branch.set_upstream(Some(&remote_name))?;
            self.checkout_branch(name)?;
            return Ok(BranchOrigin::Remote);
        }

        if !create_if_absent {
            return Err(PromoteError::Git(git2::Error::from_str(&format!(
                "branch '{}' exists neither locally nor on {}",
                name, REMOTE
            ))));
        }

        self.create_branch(name)?;
        self.checkout_branch(name)?;
        Ok(BranchOrigin::Created)
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    fn remote_branch_exists(&self, name: &str) -> bool {
        self.repo
            .find_branch(&format!("{}/{}", REMOTE, name), BranchType::Remote)
            .is_ok()
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;

        if head.is_branch() {
            head.shorthand().map(String::from).ok_or_else(|| {
                PromoteError::Git(git2::Error::from_str(
                    "HEAD is detached or has no shorthand name",
                ))
            })
        } else {
            Err(PromoteError::Git(git2::Error::from_str(
                "HEAD is not pointing to a branch (detached HEAD state)",
            )))
        }
    }
}
