//! Per-environment outcomes and the aggregated report.

use serde::Serialize;
use std::fmt;

use crate::error::{ErrorKind, PromoteError};
use crate::github::PullRequestRecord;
use crate::version::ResolvedVersion;
use crate::workflow::{WorkflowResult, WorkflowStatus};

/// What happened in one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The environment already declares the requested version.
    NoChangeNeeded,
    /// A pull request is open (created or reused).
    PrCreated,
    PrMerged,
    /// The pull request was closed without merging.
    PrRejected,
    Failed,
    /// The environment's strategy forbids promotion.
    Skipped,
}

impl Outcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::PrRejected | Self::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoChangeNeeded => "already at desired version",
            Self::PrCreated => "pull request open",
            Self::PrMerged => "merged",
            Self::PrRejected => "pull request rejected",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// Result of promoting into one environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentOutcome {
    pub environment: String,
    pub namespace: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl EnvironmentOutcome {
    pub(crate) fn new(environment: &str, namespace: &str, outcome: Outcome) -> Self {
        Self {
            environment: environment.to_string(),
            namespace: namespace.to_string(),
            outcome,
            repository: None,
            branch: None,
            previous_version: None,
            pr_number: None,
            pr_link: None,
            error: None,
            error_kind: None,
        }
    }

    pub(crate) fn failed(environment: &str, namespace: &str, error: &PromoteError) -> Self {
        Self::new(environment, namespace, Outcome::Failed).with_error(error)
    }

    fn with_error(mut self, error: &PromoteError) -> Self {
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        self
    }

    fn with_pull_request(mut self, pr: Option<&PullRequestRecord>) -> Self {
        if let Some(pr) = pr {
            self.pr_number = Some(pr.number);
            self.pr_link = Some(pr.link.clone());
        }
        self
    }

    /// Outcome of the environment at `index` in a workflow run's targets.
    ///
    /// An environment whose declaration was already at the version is
    /// reported as unchanged even when others in the same repository needed
    /// a pull request.
    pub(crate) fn from_workflow(
        environment: &str,
        namespace: &str,
        result: &WorkflowResult,
        index: usize,
    ) -> Self {
        let mutation = result.mutations.get(index);
        let outcome = if mutation.is_some_and(|m| !m.changed) {
            Outcome::NoChangeNeeded
        } else {
            match &result.status {
                WorkflowStatus::NoChange => Outcome::NoChangeNeeded,
                WorkflowStatus::Open => Outcome::PrCreated,
                WorkflowStatus::Merged => Outcome::PrMerged,
                WorkflowStatus::Failed(PromoteError::PromotionRejected { .. }) => {
                    Outcome::PrRejected
                }
                WorkflowStatus::Failed(_) => Outcome::Failed,
            }
        };

        let mut report = Self::new(environment, namespace, outcome);
        report.repository = result.repository.as_ref().map(|r| r.full_name());
        report.previous_version = mutation.and_then(|m| m.previous_version.clone());
        if outcome == Outcome::NoChangeNeeded {
            return report;
        }

        report = report.with_pull_request(result.pull_request.as_ref());
        report.branch = result.branch.clone();
        if let WorkflowStatus::Failed(error) = &result.status {
            report = report.with_error(error);
        }
        report
    }
}

/// Aggregated result of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub application: String,
    pub version: ResolvedVersion,
    pub outcomes: Vec<EnvironmentOutcome>,
}

impl PromotionReport {
    /// Outcomes that are not failures.
    pub fn succeeded(&self) -> impl Iterator<Item = &EnvironmentOutcome> {
        self.outcomes.iter().filter(|o| !o.outcome.is_failure())
    }

    pub fn failed(&self) -> impl Iterator<Item = &EnvironmentOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Outcome for a named environment.
    pub fn outcome(&self, environment: &str) -> Option<&EnvironmentOutcome> {
        self.outcomes.iter().find(|o| o.environment == environment)
    }
}

impl fmt::Display for PromotionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} ({})",
            self.application, self.version, self.version.provenance
        )?;
        for o in &self.outcomes {
            write!(f, "  {:<16} {}", o.environment, o.outcome)?;
            if let Some(link) = &o.pr_link {
                write!(f, " {}", link)?;
            }
            if let Some(error) = &o.error {
                write!(f, ": {}", error)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
