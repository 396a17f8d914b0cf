//! Commit and pull request text.

use std::fmt::Write;

use crate::version::ResolvedVersion;

/// One environment's part of a promotion.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentChange<'a> {
    pub environment: &'a str,
    pub namespace: &'a str,
    pub previous_version: Option<&'a str>,
    /// Unified diff of the declaration change against the base branch.
    pub diff: &'a str,
}

/// Everything the generated text is derived from.
#[derive(Debug, Clone, Copy)]
pub struct PromotionSummary<'a> {
    pub application: &'a str,
    pub version: &'a ResolvedVersion,
    /// Environments whose declarations change, in promotion order.
    pub changes: &'a [EnvironmentChange<'a>],
}

impl PromotionSummary<'_> {
    fn environments(&self) -> String {
        self.changes
            .iter()
            .map(|c| c.environment)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn title(&self) -> String {
        format!(
            "chore: promote {} to {} in {}",
            self.application,
            self.version,
            self.environments()
        )
    }

    pub fn body(&self) -> String {
        let mut body = String::new();
        let noun = if self.changes.len() == 1 {
            "environment"
        } else {
            "environments"
        };
        let names = self
            .changes
            .iter()
            .map(|c| format!("**{}**", c.environment))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            body,
            "Promote `{}` to version `{}` in the {} {}.",
            self.application, self.version, names, noun
        )
        .unwrap();
        writeln!(body).unwrap();
        for change in self.changes {
            writeln!(
                body,
                "* {} (`{}`): {} -> {}",
                change.environment,
                change.namespace,
                change.previous_version.unwrap_or("new"),
                self.version
            )
            .unwrap();
        }
        writeln!(body, "* version source: {}", self.version.provenance).unwrap();

        // Environments sharing a file produce the same diff against the base.
        let mut diffs: Vec<&str> = Vec::new();
        for change in self.changes {
            if !change.diff.is_empty() && !diffs.contains(&change.diff) {
                diffs.push(change.diff);
            }
        }
        if !diffs.is_empty() {
            writeln!(body).unwrap();
            writeln!(body, "```diff").unwrap();
            for diff in diffs {
                write!(body, "{}", diff).unwrap();
                if !diff.ends_with('\n') {
                    writeln!(body).unwrap();
                }
            }
            writeln!(body, "```").unwrap();
        }
        body
    }

    pub fn commit_message(&self) -> String {
        let mut message = format!(
            "{}\n\napplication: {}\nversion: {}\n",
            self.title(),
            self.application,
            self.version
        );
        for change in self.changes {
            writeln!(message, "environment: {}", change.environment).unwrap();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionProvenance;

    const STAGING_DIFF: &str = "-  version: 1.0.0\n+  version: 1.2.3\n";

    fn staging(diff: &str) -> EnvironmentChange<'_> {
        EnvironmentChange {
            environment: "staging",
            namespace: "jx-staging",
            previous_version: Some("1.0.0"),
            diff,
        }
    }

    fn summary<'a>(
        version: &'a ResolvedVersion,
        changes: &'a [EnvironmentChange<'a>],
    ) -> PromotionSummary<'a> {
        PromotionSummary {
            application: "myapp",
            version,
            changes,
        }
    }

    #[test]
    fn test_title() {
        let version = ResolvedVersion::explicit("1.2.3");
        let changes = [staging("")];
        assert_eq!(
            summary(&version, &changes).title(),
            "chore: promote myapp to 1.2.3 in staging"
        );
    }

    #[test]
    fn test_body_includes_change_and_diff() {
        let version = ResolvedVersion {
            version: "1.2.3".into(),
            provenance: VersionProvenance::VersionStream,
        };
        let changes = [staging(STAGING_DIFF)];
        let body = summary(&version, &changes).body();
        assert!(body.starts_with("Promote `myapp` to version `1.2.3` in the **staging** environment.\n"));
        assert!(body.contains("* staging (`jx-staging`): 1.0.0 -> 1.2.3"));
        assert!(body.contains("* version source: version stream"));
        assert!(body.contains("```diff\n-  version: 1.0.0\n+  version: 1.2.3\n```\n"));
    }

    #[test]
    fn test_several_environments_share_one_summary() {
        let version = ResolvedVersion::explicit("1.2.3");
        let changes = [
            staging(STAGING_DIFF),
            EnvironmentChange {
                environment: "production",
                namespace: "jx-production",
                previous_version: None,
                diff: STAGING_DIFF,
            },
        ];
        let summary = summary(&version, &changes);

        assert_eq!(
            summary.title(),
            "chore: promote myapp to 1.2.3 in staging, production"
        );
        let body = summary.body();
        assert!(body.contains("in the **staging**, **production** environments."));
        assert!(body.contains("* production (`jx-production`): new -> 1.2.3"));
        assert_eq!(body.matches("+  version: 1.2.3").count(), 1);
        assert!(
            summary
                .commit_message()
                .ends_with("environment: staging\nenvironment: production\n")
        );
    }

    #[test]
    fn test_commit_message_trailers() {
        let version = ResolvedVersion::explicit("1.2.3");
        let changes = [staging("")];
        let message = summary(&version, &changes).commit_message();
        assert!(message.starts_with("chore: promote myapp to 1.2.3 in staging\n\n"));
        assert!(message.ends_with("application: myapp\nversion: 1.2.3\nenvironment: staging\n"));
    }
}
