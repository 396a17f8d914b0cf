//! Environment registry backed by a YAML document.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::environment::{Environment, EnvironmentRegistry};
use crate::error::{PromoteError, Result};

/// Registry that reads environments from a YAML file on every lookup.
///
/// # Example YAML
///
/// ```yaml
/// namespace: jx
/// environments:
///   - name: dev
///     namespace: jx
///     kind: development
///     promotion_strategy: never
///     source:
///       url: https://github.com/acme/environment-dev
///   - name: staging
///     namespace: jx-staging
///     promotion_strategy: automatic
/// ```
#[derive(Debug, Clone)]
pub struct FileEnvironmentRegistry {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default)]
    environments: Vec<Environment>,
}

fn default_namespace() -> String {
    "jx".into()
}

impl FileEnvironmentRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<RegistryDocument> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| PromoteError::RegistryUnavailable {
                message: format!("failed to read {}: {}", self.path.display(), e),
            })?;
        serde_yaml::from_str(&content).map_err(|e| PromoteError::RegistryUnavailable {
            message: format!("failed to parse {}: {}", self.path.display(), e),
        })
    }
}

#[async_trait]
impl EnvironmentRegistry for FileEnvironmentRegistry {
    async fn get_environment(&self, namespace: &str, name: &str) -> Result<Option<Environment>> {
        Ok(self
            .list_environments(namespace)
            .await?
            .into_iter()
            .find(|e| e.name == name))
    }

    async fn list_environments(&self, namespace: &str) -> Result<Vec<Environment>> {
        let doc = self.load()?;
        if doc.namespace != namespace {
            return Ok(Vec::new());
        }
        Ok(doc.environments)
    }
}
