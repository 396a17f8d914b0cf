//! Source-control host integration.
//!
//! The workflow talks to the host through [`PullRequestHost`]; [`GitHubHost`]
//! implements it over the GitHub REST API.
//!
//! # Example
//!
//! ```rust,no_run
//! use gitops_promote::github::{GitHubHost, PullRequestHost, RepoRef};
//!
//! # async fn run() -> gitops_promote::error::Result<()> {
//! let host = GitHubHost::from_env()?;
//! let repo = RepoRef::parse("https://github.com/jenkins-x/default-environment-helmfile.git")?;
//!
//! if let Some(pr) = host
//!     .find_open_pull_request(&repo, "promote-myapp-1.2.3", "master")
//!     .await?
//! {
//!     println!("#{} {}", pr.number, pr.link);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod pr;
mod repo;

pub use client::GitHubHost;
pub use pr::{CreatePullRequest, PullRequestHost, PullRequestRecord, PullRequestState};
pub use repo::RepoRef;
