//! Environment records and the registry they are read from.
//!
//! Environments are owned by an external registry; this crate only reads
//! them through [`EnvironmentRegistry`] and never writes them back.

mod registry;

pub use registry::FileEnvironmentRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Policy governing promotion into an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStrategy {
    /// Promote and ask the host to merge.
    #[serde(alias = "Automatic", alias = "Auto", alias = "auto")]
    Automatic,
    /// Promote, leaving the merge to a human.
    #[serde(alias = "Manual")]
    #[default]
    Manual,
    /// Never promote.
    #[serde(alias = "Never")]
    Never,
}

/// Role of an environment in the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    #[serde(alias = "Development")]
    Development,
    #[serde(alias = "Permanent")]
    #[default]
    Permanent,
    #[serde(alias = "Preview")]
    Preview,
    #[serde(alias = "Test")]
    Test,
}

/// Kind of repository backing an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Git,
    #[serde(other)]
    Other,
}

/// Where an environment's desired state is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceRepository {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

impl SourceRepository {
    /// Create a git source with no explicit ref.
    pub fn git(url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Git,
            url: url.into(),
            git_ref: None,
        }
    }

    /// Pin the source to a ref.
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// A source the workflow can clone.
    pub fn is_usable(&self) -> bool {
        self.kind == SourceKind::Git && !self.url.trim().is_empty()
    }

    /// The declared ref, ignoring blank values.
    pub fn git_ref(&self) -> Option<&str> {
        self.git_ref.as_deref().filter(|r| !r.trim().is_empty())
    }
}

/// A named deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    /// Namespace applications are deployed into.
    pub namespace: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: EnvironmentKind,
    #[serde(default)]
    pub promotion_strategy: PromotionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRepository>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub remote_cluster: bool,
}

impl Environment {
    /// Create a permanent environment with a manual strategy.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            namespace: namespace.into(),
            kind: EnvironmentKind::Permanent,
            promotion_strategy: PromotionStrategy::Manual,
            source: None,
            order: 0,
            remote_cluster: false,
        }
    }

    /// Create the development environment.
    pub fn development(namespace: impl Into<String>) -> Self {
        let mut env = Self::new("dev", namespace);
        env.label = "Development".into();
        env.kind = EnvironmentKind::Development;
        env.promotion_strategy = PromotionStrategy::Never;
        env
    }

    pub fn with_strategy(mut self, strategy: PromotionStrategy) -> Self {
        self.promotion_strategy = strategy;
        self
    }

    pub fn with_source(mut self, source: SourceRepository) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn is_development(&self) -> bool {
        self.kind == EnvironmentKind::Development
    }

    /// The environment's own repository, if it declares a usable one.
    pub fn usable_source(&self) -> Option<&SourceRepository> {
        self.source.as_ref().filter(|s| s.is_usable())
    }
}

/// Read-only access to environment records.
#[async_trait]
pub trait EnvironmentRegistry: Send + Sync {
    /// Look up one environment. `Ok(None)` when it does not exist.
    async fn get_environment(&self, namespace: &str, name: &str) -> Result<Option<Environment>>;

    /// List every environment in a namespace.
    async fn list_environments(&self, namespace: &str) -> Result<Vec<Environment>>;
}

/// Find the development environment in a namespace.
pub async fn find_dev_environment(
    registry: &dyn EnvironmentRegistry,
    namespace: &str,
) -> Result<Option<Environment>> {
    let envs = registry.list_environments(namespace).await?;
    Ok(envs.into_iter().find(|e| e.is_development()))
}
