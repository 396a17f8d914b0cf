//! Committing declaration changes in a working copy.

use crate::error::{PromoteError, Result};
use crate::git::GitOps;
use git2::{IndexAddOption, Signature};

/// Author used when the repository has no `user.name`/`user.email`.
const BOT_NAME: &str = "gitops-promote";
const BOT_EMAIL: &str = "gitops-promote@automated.local";

pub trait CommitOps {
    /// Stage new, modified and deleted files.
    fn stage_all(&self) -> Result<()>;

    /// Commit the index on top of `HEAD`. An index identical to `HEAD` is an
    /// error; promotions never create empty commits.
    fn commit(&self, message: &str) -> Result<git2::Oid>;

    fn has_staged_changes(&self) -> Result<bool>;
}

impl CommitOps for GitOps {
    fn stage_all(&self) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<git2::Oid> {
        if !self.has_staged_changes()? {
            return Err(PromoteError::Git(git2::Error::from_str(
                "nothing staged to commit",
            )));
        }

        let author = self.signature()?;
        let parent = self.repo.head()?.peel_to_commit()?;
        let tree = self.repo.find_tree(self.repo.index()?.write_tree()?)?;
        Ok(self
            .repo
            .commit(Some("HEAD"), &author, &author, message, &tree, &[&parent])?)
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let head = self.repo.head()?.peel_to_tree()?;
        let staged = self.repo.diff_tree_to_index(Some(&head), None, None)?;
        Ok(staged.deltas().len() > 0)
    }
}

impl GitOps {
    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now(BOT_NAME, BOT_EMAIL)?),
        }
    }
}
