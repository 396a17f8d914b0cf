//! Top-level coordination of a promotion across environments.
//!
//! # Example
//!
//! ```rust,no_run
//! use gitops_promote::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> gitops_promote::error::Result<()> {
//! let engine = Promote::new()
//!     .registry(Arc::new(FileEnvironmentRegistry::new("environments.yaml")))
//!     .version_stream(Arc::new(FileVersionStream::new("versions")))
//!     .git(Arc::new(Git2Client::new(GitAuth::github_token()?)))
//!     .host(Arc::new(GitHubHost::from_env()?))
//!     .build()?;
//!
//! let report = engine
//!     .promote(
//!         PromotionRequest::to_environment("myapp", "staging").version("1.2.3"),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

mod outcome;
mod request;

pub use outcome::{EnvironmentOutcome, Outcome, PromotionReport};
pub use request::{EnvironmentTarget, PromotionRequest};

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PromoteConfig;
use crate::environment::{
    Environment, EnvironmentRegistry, PromotionStrategy, SourceRepository, find_dev_environment,
};
use crate::error::{PromoteError, Result};
use crate::git::GitClient;
use crate::github::PullRequestHost;
use crate::strategy::{Decision, PromotionStrategyEvaluator};
use crate::version::{ResolvedVersion, VersionResolver, VersionStream, validate_version};
use crate::workflow::{PullRequestWorkflow, WorkflowTarget};

/// Fluent builder wiring capabilities and configuration into a [`PromoteEngine`].
#[derive(Default)]
pub struct Promote {
    registry: Option<Arc<dyn EnvironmentRegistry>>,
    versions: Option<Arc<dyn VersionStream>>,
    git: Option<Arc<dyn GitClient>>,
    host: Option<Arc<dyn PullRequestHost>>,
    config: PromoteConfig,
}

impl Promote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<dyn EnvironmentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn version_stream(mut self, versions: Arc<dyn VersionStream>) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn git(mut self, git: Arc<dyn GitClient>) -> Self {
        self.git = Some(git);
        self
    }

    pub fn host(mut self, host: Arc<dyn PullRequestHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(mut self, config: PromoteConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and validate the engine.
    pub fn build(self) -> Result<PromoteEngine> {
        self.config.validate()?;
        let missing = |what: &str| {
            PromoteError::InvalidConfig(format!("no {} configured. Use .{}() to set one.", what, what))
        };
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let versions = self.versions.ok_or_else(|| missing("version_stream"))?;
        let git = self.git.ok_or_else(|| missing("git"))?;
        let host = self.host.ok_or_else(|| missing("host"))?;

        Ok(PromoteEngine {
            registry,
            resolver: VersionResolver::new(versions),
            workflow: PullRequestWorkflow::new(git, host, &self.config),
            config: Arc::new(self.config),
        })
    }
}

/// Promotes application versions into environments.
#[derive(Clone)]
pub struct PromoteEngine {
    registry: Arc<dyn EnvironmentRegistry>,
    resolver: VersionResolver,
    workflow: PullRequestWorkflow,
    config: Arc<PromoteConfig>,
}

impl PromoteEngine {
    pub fn config(&self) -> &PromoteConfig {
        &self.config
    }

    /// Environments `target` names, in promotion order.
    ///
    /// Fails for unknown environments and for the development environment.
    pub async fn target_environments(&self, target: &EnvironmentTarget) -> Result<Vec<Environment>> {
        let namespace = &self.config.registry_namespace;
        match target {
            EnvironmentTarget::Named(name) => {
                let env = self
                    .registry
                    .get_environment(namespace, name)
                    .await?
                    .ok_or_else(|| PromoteError::EnvironmentNotFound {
                        namespace: namespace.clone(),
                        name: name.clone(),
                    })?;
                if env.is_development() {
                    return Err(PromoteError::invalid(format!(
                        "cannot promote into the development environment '{}'",
                        env.name
                    )));
                }
                Ok(vec![env])
            }
            EnvironmentTarget::AllAutomatic => {
                let mut envs: Vec<Environment> = self
                    .registry
                    .list_environments(namespace)
                    .await?
                    .into_iter()
                    .filter(|e| {
                        !e.is_development()
                            && e.promotion_strategy == PromotionStrategy::Automatic
                    })
                    .collect();
                envs.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
                Ok(envs)
            }
        }
    }

    /// Promote according to `request`.
    ///
    /// Request, version and environment errors fail the whole call before any
    /// repository is touched. Once environments are resolved, each one gets
    /// its own [`EnvironmentOutcome`] and one failure does not stop the rest.
    /// Environments declared in the same repository (and ref) are promoted
    /// together through one branch and one pull request.
    pub async fn promote(
        &self,
        request: PromotionRequest,
        cancel: CancellationToken,
    ) -> Result<PromotionReport> {
        request.validate()?;

        let version = self
            .resolver
            .resolve(&request.application, &request.version)
            .await?;
        validate_version(version.as_str())?;

        let environments = self.target_environments(&request.target).await?;
        info!(
            application = %request.application,
            version = %version,
            provenance = %version.provenance,
            environments = environments.len(),
            "promoting"
        );

        let fallback = if environments.iter().any(|e| e.usable_source().is_none()) {
            find_dev_environment(self.registry.as_ref(), &self.config.registry_namespace)
                .await?
                .and_then(|dev| dev.usable_source().cloned())
        } else {
            None
        };

        let evaluator = PromotionStrategyEvaluator::new().no_poll(request.no_poll);
        let mut outcomes: Vec<Option<EnvironmentOutcome>> = vec![None; environments.len()];
        let mut groups: Vec<RepositoryGroup> = Vec::new();
        for (slot, env) in environments.into_iter().enumerate() {
            let decision = evaluator.evaluate(&env);
            if !decision.proceed {
                info!(environment = %env.name, "promotion disabled for environment, skipping");
                outcomes[slot] = Some(EnvironmentOutcome::new(
                    &env.name,
                    &env.namespace,
                    Outcome::Skipped,
                ));
                continue;
            }

            let Some(source) = env.usable_source().or(fallback.as_ref()).cloned() else {
                outcomes[slot] = Some(EnvironmentOutcome::failed(
                    &env.name,
                    &env.namespace,
                    &PromoteError::invalid(format!(
                        "environment '{}' has no git source and no development environment to fall back to",
                        env.name
                    )),
                ));
                continue;
            };
            if env.usable_source().is_none() {
                debug!(
                    environment = %env.name,
                    url = %source.url,
                    "using the development environment's repository"
                );
            }

            match groups.iter_mut().find(|g| g.declares(&source)) {
                Some(group) => {
                    debug!(
                        environment = %env.name,
                        url = %source.url,
                        "repository shared with another environment"
                    );
                    group.add(slot, env, decision);
                }
                None => groups.push(RepositoryGroup::new(source, slot, env, decision)),
            }
        }

        let request = Arc::new(request);
        let version = Arc::new(version);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut handles = Vec::with_capacity(groups.len());

        for group in groups {
            let engine = self.clone();
            let request = Arc::clone(&request);
            let version = Arc::clone(&version);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let members = group.members();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return group.failed(&PromoteError::Cancelled),
                };
                engine
                    .promote_repository(&group, &request, &version, &cancel)
                    .await
            });
            handles.push((members, handle));
        }

        for (members, handle) in handles {
            let results = handle.await.unwrap_or_else(|e| {
                warn!(url = %members.url, error = %e, "promotion task panicked");
                let error = PromoteError::Io(std::io::Error::other(e));
                members
                    .environments
                    .iter()
                    .map(|(slot, name, namespace)| {
                        (*slot, EnvironmentOutcome::failed(name, namespace, &error))
                    })
                    .collect()
            });
            for (slot, outcome) in results {
                outcomes[slot] = Some(outcome);
            }
        }

        Ok(PromotionReport {
            application: request.application.clone(),
            version: (*version).clone(),
            outcomes: outcomes.into_iter().flatten().collect(),
        })
    }

    /// Run one workflow for every environment declared in `group`'s repository.
    async fn promote_repository(
        &self,
        group: &RepositoryGroup,
        request: &PromotionRequest,
        version: &ResolvedVersion,
        cancel: &CancellationToken,
    ) -> Vec<(usize, EnvironmentOutcome)> {
        let target = WorkflowTarget {
            application: &request.application,
            version,
            alias: request.alias.as_deref(),
            environments: &group.environments,
            source: &group.source,
            auto_merge: group.auto_merge,
            poll: group.poll,
        };
        let result = self.workflow.run(&target, cancel).await;
        group
            .slots
            .iter()
            .zip(&group.environments)
            .enumerate()
            .map(|(index, (slot, env))| {
                (
                    *slot,
                    EnvironmentOutcome::from_workflow(&env.name, &env.namespace, &result, index),
                )
            })
            .collect()
    }
}

/// Environments declared in one repository.
///
/// They share a working copy, a branch and a pull request, so one
/// environment's edit never hides another's.
struct RepositoryGroup {
    source: SourceRepository,
    environments: Vec<Environment>,
    /// Position of each environment in the report.
    slots: Vec<usize>,
    /// Only when every environment allows it.
    auto_merge: bool,
    poll: bool,
}

/// What is left to report if a group's task dies.
struct GroupMembers {
    url: String,
    environments: Vec<(usize, String, String)>,
}

impl RepositoryGroup {
    fn new(source: SourceRepository, slot: usize, env: Environment, decision: Decision) -> Self {
        Self {
            source,
            environments: vec![env],
            slots: vec![slot],
            auto_merge: decision.auto_merge,
            poll: decision.poll,
        }
    }

    fn declares(&self, source: &SourceRepository) -> bool {
        self.source.url == source.url && self.source.git_ref() == source.git_ref()
    }

    fn add(&mut self, slot: usize, env: Environment, decision: Decision) {
        self.auto_merge &= decision.auto_merge;
        self.poll |= decision.poll;
        self.environments.push(env);
        self.slots.push(slot);
    }

    fn members(&self) -> GroupMembers {
        GroupMembers {
            url: self.source.url.clone(),
            environments: self
                .slots
                .iter()
                .zip(&self.environments)
                .map(|(slot, env)| (*slot, env.name.clone(), env.namespace.clone()))
                .collect(),
        }
    }

    fn failed(&self, error: &PromoteError) -> Vec<(usize, EnvironmentOutcome)> {
        self.slots
            .iter()
            .zip(&self.environments)
            .map(|(slot, env)| (*slot, EnvironmentOutcome::failed(&env.name, &env.namespace, error)))
            .collect()
    }
}
