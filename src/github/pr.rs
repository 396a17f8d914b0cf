//! Pull request records and the host capability that manages them.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::github::RepoRef;

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Merged,
    /// Closed without being merged.
    Closed,
}

/// A pull request as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub link: String,
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub state: PullRequestState,
}

/// Request body for creating a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

impl CreatePullRequest {
    /// Create a new pull request.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        head: impl Into<String>,
        base: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            head: head.into(),
            base: base.into(),
        }
    }
}

/// Pull request operations on a source-control host.
///
/// Host API failures are reported as [`crate::error::PromoteError::Host`].
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// The open pull request from `head` into `base`, if any.
    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRecord>>;

    /// Look a pull request up by number.
    async fn find_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<PullRequestRecord>>;

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &CreatePullRequest,
    ) -> Result<PullRequestRecord>;

    async fn update_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRecord>;

    async fn pull_request_state(&self, repo: &RepoRef, number: u64) -> Result<PullRequestState>;

    /// Ask the host to merge the pull request once its checks pass.
    async fn request_auto_merge(&self, repo: &RepoRef, number: u64) -> Result<()>;
}
