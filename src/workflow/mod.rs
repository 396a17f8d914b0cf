//! The pull request workflow that carries one promotion into the
//! environments declared in one repository.
//!
//! States, in order:
//!
//! ```text
//! Cloning -> Mutating -> Diffing -> (NoChange | Committing) -> Pushing
//!         -> PrSearching -> (PrCreating | PrReusing) -> (AwaitingMerge | Done)
//! ```
//!
//! Every suspension point races the invocation's cancellation token.

mod message;
mod poller;
mod working_copy;

pub use message::{EnvironmentChange, PromotionSummary};
pub use poller::{MergePoller, PollStep};
pub use working_copy::{WorkingCopy, branch_name};

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PromoteConfig;
use crate::diff::DiffSummary;
use crate::environment::{Environment, SourceRepository};
use crate::error::{PromoteError, Result};
use crate::git::{GitClient, PushStatus};
use crate::github::{
    CreatePullRequest, PullRequestHost, PullRequestRecord, PullRequestState, RepoRef,
};
use crate::layout::{self, LayoutKind};
use crate::mutator::{MutationOutcome, MutationRequest, VersionMutator};
use crate::version::ResolvedVersion;

/// Where a workflow run got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Cloning,
    Mutating,
    Diffing,
    NoChange,
    Committing,
    Pushing,
    PrSearching,
    PrCreating,
    PrReusing,
    AwaitingMerge,
    Done,
}

/// How a workflow run ended.
#[derive(Debug)]
pub enum WorkflowStatus {
    /// The base already pins the requested version.
    NoChange,
    /// A pull request is open and not being awaited.
    Open,
    /// The pull request was merged.
    Merged,
    Failed(PromoteError),
}

/// Result for a single environment repository.
#[derive(Debug)]
pub struct WorkflowResult {
    pub state: WorkflowState,
    pub status: WorkflowStatus,
    pub repository: Option<RepoRef>,
    pub layout: Option<LayoutKind>,
    pub branch: Option<String>,
    pub pushed: bool,
    /// Change against the base branch, one per target environment in order.
    /// Shorter than the target list when the run failed before diffing.
    pub mutations: Vec<MutationOutcome>,
    pub pull_request: Option<PullRequestRecord>,
    /// Whether the pull request was reused rather than created.
    pub reused: bool,
}

impl WorkflowResult {
    fn new() -> Self {
        Self {
            state: WorkflowState::Cloning,
            status: WorkflowStatus::NoChange,
            repository: None,
            layout: None,
            branch: None,
            pushed: false,
            mutations: Vec::new(),
            pull_request: None,
            reused: false,
        }
    }
}

/// One promotion of one application into the environments declared in one
/// repository.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowTarget<'a> {
    pub application: &'a str,
    pub version: &'a ResolvedVersion,
    pub alias: Option<&'a str>,
    /// Environments being promoted into; each namespace goes into its own
    /// declarations.
    pub environments: &'a [Environment],
    /// Repository to mutate, which may belong to another environment.
    pub source: &'a SourceRepository,
    /// Flag the pull request for automatic merging.
    pub auto_merge: bool,
    /// Wait for the pull request to be merged.
    pub poll: bool,
}

impl WorkflowTarget<'_> {
    fn environment_names(&self) -> Vec<&str> {
        self.environments.iter().map(|e| e.name.as_str()).collect()
    }

    fn mutation_request<'e>(&'e self, environment: &'e Environment) -> MutationRequest<'e> {
        MutationRequest {
            application: self.application,
            version: self.version.as_str(),
            namespace: &environment.namespace,
            alias: self.alias,
        }
    }
}

/// Drives clone, mutation, push and pull request handling.
#[derive(Clone)]
pub struct PullRequestWorkflow {
    git: Arc<dyn GitClient>,
    host: Arc<dyn PullRequestHost>,
    mutator: VersionMutator,
    poller: MergePoller,
    branch_prefix: String,
    default_base_branch: String,
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PromoteError::Cancelled),
        result = fut => result,
    }
}

impl PullRequestWorkflow {
    pub fn new(
        git: Arc<dyn GitClient>,
        host: Arc<dyn PullRequestHost>,
        config: &PromoteConfig,
    ) -> Self {
        Self {
            git,
            host,
            mutator: VersionMutator::from_config(config),
            poller: MergePoller::from_config(config),
            branch_prefix: config.branch_prefix.clone(),
            default_base_branch: config.default_base_branch.clone(),
        }
    }

    /// Run the workflow. Failures are reported in the result together with
    /// whatever progress was made, including any pull request link.
    #[instrument(
        name = "promote_repository",
        skip_all,
        fields(
            application = target.application,
            version = %target.version,
            environments = ?target.environment_names(),
        )
    )]
    pub async fn run(
        &self,
        target: &WorkflowTarget<'_>,
        cancel: &CancellationToken,
    ) -> WorkflowResult {
        let mut result = WorkflowResult::new();
        match self.drive(target, cancel, &mut result).await {
            Ok(status) => result.status = status,
            Err(error) => {
                warn!(state = ?result.state, error = %error, "promotion failed");
                result.status = WorkflowStatus::Failed(error);
            }
        }
        result
    }

    async fn drive(
        &self,
        target: &WorkflowTarget<'_>,
        cancel: &CancellationToken,
        result: &mut WorkflowResult,
    ) -> Result<WorkflowStatus> {
        // Cloning
        result.state = WorkflowState::Cloning;
        let repo = RepoRef::parse(&target.source.url)?;
        result.repository = Some(repo.clone());

        let copy = WorkingCopy::new()?;
        let dir = copy.path();
        let cloned = cancellable(
            cancel,
            self.git
                .clone_repo(&target.source.url, target.source.git_ref(), dir),
        )
        .await?;
        let base = target
            .source
            .git_ref()
            .map(String::from)
            .or_else(|| Some(cloned).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| self.default_base_branch.clone());
        debug!(repository = %repo, base = %base, "cloned environment repository");

        // Mutating
        result.state = WorkflowState::Mutating;
        let layout = layout::detect(dir);
        result.layout = Some(layout);
        if layout == LayoutKind::Unknown {
            return Err(PromoteError::UnsupportedLayout {
                path: repo.full_name().into(),
            });
        }
        for environment in target.environments {
            let request = target.mutation_request(environment);
            result.mutations.push(self.mutator.preview(dir, layout, &request)?);
        }

        // Diffing
        result.state = WorkflowState::Diffing;
        if result.mutations.iter().all(|m| !m.changed) {
            for preview in &result.mutations {
                info!(
                    repository = %repo,
                    file = %preview.file.display(),
                    "already at desired version"
                );
            }
            result.state = WorkflowState::NoChange;
            return Ok(WorkflowStatus::NoChange);
        }

        let pending: Vec<&Environment> = target
            .environments
            .iter()
            .zip(&result.mutations)
            .filter(|(_, preview)| preview.changed)
            .map(|(environment, _)| environment)
            .collect();
        let (title, body, commit_message) = {
            let changes: Vec<EnvironmentChange<'_>> = target
                .environments
                .iter()
                .zip(&result.mutations)
                .filter(|(_, preview)| preview.changed)
                .map(|(environment, preview)| EnvironmentChange {
                    environment: &environment.name,
                    namespace: &environment.namespace,
                    previous_version: preview.previous_version.as_deref(),
                    diff: &preview.diff,
                })
                .collect();
            let summary = PromotionSummary {
                application: target.application,
                version: target.version,
                changes: &changes,
            };
            (summary.title(), summary.body(), summary.commit_message())
        };

        // Committing
        result.state = WorkflowState::Committing;
        let branch = branch_name(
            &self.branch_prefix,
            target.application,
            target.version.as_str(),
        );
        result.branch = Some(branch.clone());
        let origin = cancellable(cancel, self.git.checkout_branch(dir, &branch, true)).await?;

        // Environments sharing a file see the earlier ones' edits.
        let mut changed = false;
        let mut applied = DiffSummary::default();
        for environment in pending {
            let outcome = self
                .mutator
                .mutate(dir, layout, &target.mutation_request(environment))?;
            changed |= outcome.changed;
            applied.merge(&outcome.summary);
        }
        debug!(branch = %branch, origin = ?origin, changed, "prepared branch");

        if changed {
            cancellable(cancel, self.git.commit(dir, &commit_message)).await?;

            // Pushing
            result.state = WorkflowState::Pushing;
            match cancellable(cancel, self.git.push(dir, &branch)).await? {
                PushStatus::Pushed => {
                    result.pushed = true;
                    info!(branch = %branch, changes = %applied, "pushed promotion branch");
                }
                PushStatus::Rejected(message) => {
                    return Err(PromoteError::PushRejected { branch, message });
                }
            }
        } else {
            debug!(branch = %branch, origin = ?origin, "branch already carries the change, not pushing");
        }

        // PrSearching
        result.state = WorkflowState::PrSearching;
        let existing = cancellable(
            cancel,
            self.host.find_open_pull_request(&repo, &branch, &base),
        )
        .await?;

        let pr = match existing {
            Some(pr) => {
                result.state = WorkflowState::PrReusing;
                result.reused = true;
                if pr.title != title || pr.body != body {
                    debug!(pr = pr.number, "updating reused pull request");
                    cancellable(
                        cancel,
                        self.host.update_pull_request(&repo, pr.number, &title, &body),
                    )
                    .await?
                } else {
                    pr
                }
            }
            None => {
                result.state = WorkflowState::PrCreating;
                let request = CreatePullRequest::new(&title, &body, &branch, &base);
                cancellable(cancel, self.host.create_pull_request(&repo, &request)).await?
            }
        };
        info!(
            pr = pr.number,
            link = %pr.link,
            reused = result.reused,
            "pull request ready"
        );
        result.pull_request = Some(pr.clone());

        if target.auto_merge {
            debug!(pr = pr.number, "requesting auto-merge");
            cancellable(cancel, self.host.request_auto_merge(&repo, pr.number)).await?;
        }
        if !target.poll {
            result.state = WorkflowState::Done;
            return Ok(WorkflowStatus::Open);
        }

        // AwaitingMerge
        result.state = WorkflowState::AwaitingMerge;
        self.poller
            .wait(self.host.as_ref(), &repo, &pr, cancel)
            .await?;

        if let Some(merged) = result.pull_request.as_mut() {
            merged.state = PullRequestState::Merged;
        }
        result.state = WorkflowState::Done;
        Ok(WorkflowStatus::Merged)
    }
}
