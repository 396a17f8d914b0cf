//! [`PullRequestHost`] over the GitHub API using octocrab.

use async_trait::async_trait;
use octocrab::Octocrab;
use octocrab::models::IssueState;
use octocrab::models::pulls::PullRequest as OctocrabPR;
use tracing::debug;

use crate::error::{PromoteError, Result};
use crate::github::{
    CreatePullRequest, PullRequestHost, PullRequestRecord, PullRequestState, RepoRef,
};

const DEFAULT_AUTO_MERGE_LABEL: &str = "updatebot";

/// Client for the GitHub pull request API.
///
/// Auto-merge is requested by labelling the pull request; a merge bot
/// watching that label performs the merge.
#[derive(Clone)]
pub struct GitHubHost {
    octocrab: Octocrab,
    auto_merge_label: String,
}

impl GitHubHost {
    /// Create a client for github.com with the given token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(|e| PromoteError::host(format!("failed to build GitHub client: {}", e)))?;
        Ok(Self::from_octocrab(octocrab))
    }

    /// Create a client for GitHub Enterprise with a custom API base URL.
    pub fn with_enterprise(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(token.into())
            .base_uri(base_url.trim_end_matches('/'))
            .map_err(|e| PromoteError::InvalidConfig(format!("invalid GitHub URL: {}", e)))?
            .build()
            .map_err(|e| PromoteError::host(format!("failed to build GitHub client: {}", e)))?;
        Ok(Self::from_octocrab(octocrab))
    }

    /// Create a client using the GITHUB_TOKEN environment variable.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").map_err(|_| {
            PromoteError::InvalidConfig("GITHUB_TOKEN environment variable not set".into())
        })?;
        Self::new(token)
    }

    pub fn from_octocrab(octocrab: Octocrab) -> Self {
        Self {
            octocrab,
            auto_merge_label: DEFAULT_AUTO_MERGE_LABEL.into(),
        }
    }

    /// Label that asks the merge bot to merge.
    pub fn with_auto_merge_label(mut self, label: impl Into<String>) -> Self {
        self.auto_merge_label = label.into();
        self
    }

    async fn get(&self, repo: &RepoRef, number: u64) -> Result<OctocrabPR> {
        self.octocrab
            .pulls(&repo.owner, &repo.name)
            .get(number)
            .await
            .map_err(|e| api_error(&format!("get pull request #{} of {}", number, repo), e))
    }
}

fn api_error(action: &str, e: octocrab::Error) -> PromoteError {
    PromoteError::host(format!("failed to {}: {}", action, e))
}

fn is_not_found(e: &octocrab::Error) -> bool {
    matches!(e, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

fn state_of(pr: &OctocrabPR) -> PullRequestState {
    if pr.merged_at.is_some() || pr.merged == Some(true) {
        PullRequestState::Merged
    } else if matches!(pr.state, Some(IssueState::Open)) {
        PullRequestState::Open
    } else {
        PullRequestState::Closed
    }
}

impl From<OctocrabPR> for PullRequestRecord {
    fn from(pr: OctocrabPR) -> Self {
        let state = state_of(&pr);
        Self {
            number: pr.number,
            link: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
            title: pr.title.unwrap_or_default(),
            body: pr.body.unwrap_or_default(),
            head: pr.head.ref_field,
            base: pr.base.ref_field,
            state,
        }
    }
}

#[async_trait]
impl PullRequestHost for GitHubHost {
    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRecord>> {
        let page = self
            .octocrab
            .pulls(&repo.owner, &repo.name)
            .list()
            .state(octocrab::params::State::Open)
            .head(format!("{}:{}", repo.owner, head))
            .base(base)
            .per_page(100)
            .send()
            .await
            .map_err(|e| api_error(&format!("list pull requests of {}", repo), e))?;

        Ok(page
            .items
            .into_iter()
            .find(|pr| pr.head.ref_field == head)
            .map(PullRequestRecord::from))
    }

    async fn find_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<PullRequestRecord>> {
        match self
            .octocrab
            .pulls(&repo.owner, &repo.name)
            .get(number)
            .await
        {
            Ok(pr) => Ok(Some(pr.into())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(api_error(
                &format!("get pull request #{} of {}", number, repo),
                e,
            )),
        }
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &CreatePullRequest,
    ) -> Result<PullRequestRecord> {
        let pr = self
            .octocrab
            .pulls(&repo.owner, &repo.name)
            .create(&request.title, &request.head, &request.base)
            .body(&request.body)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("422") || msg.contains("Validation Failed") {
                    PromoteError::host(format!(
                        "failed to create pull request in {} (branch may not exist or a pull request already exists): {}",
                        repo, msg
                    ))
                } else {
                    PromoteError::host(format!(
                        "failed to create pull request in {}: {}",
                        repo, msg
                    ))
                }
            })?;

        debug!(repository = %repo, pr = pr.number, "created pull request");
        Ok(pr.into())
    }

    async fn update_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRecord> {
        let pr = self
            .octocrab
            .pulls(&repo.owner, &repo.name)
            .update(number)
            .title(title)
            .body(body)
            .send()
            .await
            .map_err(|e| api_error(&format!("update pull request #{} of {}", number, repo), e))?;
        Ok(pr.into())
    }

    async fn pull_request_state(&self, repo: &RepoRef, number: u64) -> Result<PullRequestState> {
        let pr = self.get(repo, number).await?;
        Ok(state_of(&pr))
    }

    async fn request_auto_merge(&self, repo: &RepoRef, number: u64) -> Result<()> {
        self.octocrab
            .issues(&repo.owner, &repo.name)
            .add_labels(number, &[self.auto_merge_label.clone()])
            .await
            .map_err(|e| api_error(&format!("label pull request #{} of {}", number, repo), e))?;
        debug!(
            repository = %repo,
            pr = number,
            label = %self.auto_merge_label,
            "requested auto-merge"
        );
        Ok(())
    }
}
