//! # gitops-promote
//!
//! Promote a released application version into GitOps environments.
//!
//! An environment is a git repository that declares which application
//! versions run in a namespace. Promoting means rewriting that declaration,
//! pushing the change on a deterministic branch and opening (or reusing) a
//! pull request against the environment's base branch. Environments with an
//! automatic strategy also get the pull request flagged for auto-merge, and
//! the merge is awaited unless polling is disabled. Environments declared in
//! the same repository share one branch and one pull request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gitops_promote::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> gitops_promote::error::Result<()> {
//! let report = Promote::new()
//!     .registry(Arc::new(FileEnvironmentRegistry::new("environments.yaml")))
//!     .version_stream(Arc::new(FileVersionStream::new("versions")))
//!     .git(Arc::new(Git2Client::new(GitAuth::github_token()?)))
//!     .host(Arc::new(GitHubHost::from_env()?))
//!     .build()?
//!     .promote(
//!         PromotionRequest::to_all_automatic("myapp").version("1.2.3"),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!
//! for outcome in report.failed() {
//!     eprintln!("{}: {:?}", outcome.environment, outcome.error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Supported Layouts
//!
//! - `helmfile.yaml` releases, optionally split per namespace
//! - `jx-apps.yml` application lists
//! - `env/requirements.yaml` chart dependencies
//!
//! ## Testing
//!
//! The [`fakes`] module provides in-memory implementations of every
//! capability trait, so whole promotions can run without a cluster, a
//! git remote or a hosting API.

pub mod config;
pub mod diff;
pub mod engine;
pub mod environment;
pub mod error;
pub mod fakes;
pub mod git;
pub mod github;
pub mod layout;
pub mod mutator;
pub mod strategy;
pub mod telemetry;
pub mod version;
pub mod workflow;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::PromoteConfig;
    pub use crate::diff::DiffSummary;
    pub use crate::engine::{
        EnvironmentOutcome, EnvironmentTarget, Outcome, Promote, PromoteEngine, PromotionReport,
        PromotionRequest,
    };
    pub use crate::environment::{
        Environment, EnvironmentKind, EnvironmentRegistry, FileEnvironmentRegistry,
        PromotionStrategy, SourceRepository,
    };
    pub use crate::error::{ErrorKind, PromoteError, Result};
    pub use crate::git::{BranchOrigin, Git2Client, GitAuth, GitClient, PushStatus};
    pub use crate::github::{
        GitHubHost, PullRequestHost, PullRequestRecord, PullRequestState, RepoRef,
    };
    pub use crate::layout::LayoutKind;
    pub use crate::mutator::{MutationOutcome, MutationRequest, VersionMutator};
    pub use crate::strategy::{Decision, PromotionStrategyEvaluator};
    pub use crate::version::{
        FileVersionStream, ResolvedVersion, VersionProvenance, VersionResolver, VersionStream,
    };
    pub use crate::workflow::{MergePoller, PullRequestWorkflow, WorkflowResult, WorkflowStatus};
    pub use tokio_util::sync::CancellationToken;
}

pub use prelude::*;
