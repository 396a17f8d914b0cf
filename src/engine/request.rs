//! Promotion requests and their validation.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error::{PromoteError, Result};
use crate::version::validate_version;

/// Slash-separated segments, each starting with an alphanumeric, so names
/// never carry `.`, `..` or empty path segments.
static APPLICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(/[A-Za-z0-9][A-Za-z0-9._-]*)*$")
        .expect("application pattern is valid")
});

/// Which environments to promote into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTarget {
    /// A single environment by name.
    Named(String),
    /// Every non-development environment whose strategy is automatic.
    AllAutomatic,
}

/// One invocation's worth of promotion input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionRequest {
    pub application: String,
    /// Explicit version; empty means resolve from the version stream.
    pub version: String,
    pub target: EnvironmentTarget,
    /// Promote as another instance of the application.
    pub alias: Option<String>,
    /// Do not request auto-merge or wait for the merge.
    pub no_poll: bool,
    /// Never prompt; recorded for callers that confirm manual promotions.
    pub batch_mode: bool,
}

impl PromotionRequest {
    /// Promote `application` into the environment called `environment`.
    pub fn to_environment(application: impl Into<String>, environment: impl Into<String>) -> Self {
        Self::new(application, EnvironmentTarget::Named(environment.into()))
    }

    /// Promote `application` into every automatic environment.
    pub fn to_all_automatic(application: impl Into<String>) -> Self {
        Self::new(application, EnvironmentTarget::AllAutomatic)
    }

    fn new(application: impl Into<String>, target: EnvironmentTarget) -> Self {
        Self {
            application: application.into(),
            version: String::new(),
            target,
            alias: None,
            no_poll: false,
            batch_mode: false,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn no_poll(mut self, no_poll: bool) -> Self {
        self.no_poll = no_poll;
        self
    }

    pub fn batch_mode(mut self, batch_mode: bool) -> Self {
        self.batch_mode = batch_mode;
        self
    }

    /// Reject malformed input before anything external is touched.
    pub fn validate(&self) -> Result<()> {
        if !APPLICATION_RE.is_match(&self.application) {
            return Err(PromoteError::invalid(format!(
                "'{}' is not a valid application name",
                self.application
            )));
        }

        let version = self.version.trim();
        if !version.is_empty() {
            validate_version(version)?;
        }

        if let Some(alias) = &self.alias
            && (alias.contains('/') || !APPLICATION_RE.is_match(alias))
        {
            return Err(PromoteError::invalid(format!(
                "'{}' is not a valid alias",
                alias
            )));
        }

        if let EnvironmentTarget::Named(name) = &self.target
            && name.trim().is_empty()
        {
            return Err(PromoteError::invalid("environment name must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_valid_requests() {
        PromotionRequest::to_environment("myapp", "staging")
            .version("1.2.3")
            .validate()
            .unwrap();
        PromotionRequest::to_all_automatic("jenkins-x/myapp")
            .alias("myapp-blue")
            .validate()
            .unwrap();
    }

    #[test]
    fn test_invalid_requests_are_input_errors() {
        let cases = [
            PromotionRequest::to_environment("", "staging"),
            PromotionRequest::to_environment("-myapp", "staging"),
            PromotionRequest::to_environment("my app", "staging"),
            PromotionRequest::to_environment("myapp", " "),
            PromotionRequest::to_environment("myapp", "staging").version("latest"),
            PromotionRequest::to_environment("myapp", "staging").alias("a/b"),
            PromotionRequest::to_environment("a/../../x", "staging"),
            PromotionRequest::to_environment("dev/./myapp", "staging"),
            PromotionRequest::to_environment("dev//myapp", "staging"),
            PromotionRequest::to_environment("myapp/", "staging"),
        ];
        for request in cases {
            let err = request.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Input, "{request:?}");
        }
    }
}
