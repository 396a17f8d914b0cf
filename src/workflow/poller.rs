//! Waiting for a pull request to reach a terminal state.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PromoteConfig;
use crate::error::{PromoteError, Result};
use crate::github::{PullRequestHost, PullRequestRecord, PullRequestState, RepoRef};

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Merged,
    Pending,
}

/// Bounded, cancellable merge polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePoller {
    interval: Duration,
    max_attempts: u32,
}

impl MergePoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &PromoteConfig) -> Self {
        Self::new(config.poll_interval(), config.max_poll_attempts())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Read the pull request state once.
    ///
    /// A pull request closed without merging is [`PromoteError::PromotionRejected`].
    pub async fn step(
        &self,
        host: &dyn PullRequestHost,
        repo: &RepoRef,
        pr: &PullRequestRecord,
    ) -> Result<PollStep> {
        match host.pull_request_state(repo, pr.number).await? {
            PullRequestState::Merged => Ok(PollStep::Merged),
            PullRequestState::Open => Ok(PollStep::Pending),
            PullRequestState::Closed => Err(PromoteError::PromotionRejected {
                link: pr.link.clone(),
            }),
        }
    }

    /// Poll until merged, rejected, timed out or cancelled.
    pub async fn wait(
        &self,
        host: &dyn PullRequestHost,
        repo: &RepoRef,
        pr: &PullRequestRecord,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(PromoteError::Cancelled);
            }

            if self.step(host, repo, pr).await? == PollStep::Merged {
                info!(pr = pr.number, link = %pr.link, attempt, "pull request merged");
                return Ok(());
            }
            debug!(pr = pr.number, attempt, max = self.max_attempts, "pull request still open");

            if attempt < self.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PromoteError::Cancelled),
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        Err(PromoteError::PromotionTimeout {
            link: pr.link.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeHost;
    use crate::github::CreatePullRequest;

    async fn open_pr(host: &FakeHost, repo: &RepoRef) -> PullRequestRecord {
        host.create_pull_request(
            repo,
            &CreatePullRequest::new("title", "body", "promote-myapp-1.2.3", "master"),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_after_a_few_polls() {
        let repo = RepoRef::new("github.com", "acme", "env-staging");
        let host = FakeHost::new().with_poll_script([
            PullRequestState::Open,
            PullRequestState::Open,
            PullRequestState::Merged,
        ]);
        let pr = open_pr(&host, &repo).await;

        let poller = MergePoller::new(Duration::from_secs(10), 5);
        poller
            .wait(&host, &repo, &pr, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(host.state_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_is_rejected() {
        let repo = RepoRef::new("github.com", "acme", "env-staging");
        let host = FakeHost::new().with_poll_script([PullRequestState::Closed]);
        let pr = open_pr(&host, &repo).await;

        let err = MergePoller::new(Duration::from_secs(10), 5)
            .wait(&host, &repo, &pr, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PromoteError::PromotionRejected { ref link } if *link == pr.link));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let repo = RepoRef::new("github.com", "acme", "env-staging");
        let host = FakeHost::new();
        let pr = open_pr(&host, &repo).await;

        let started = tokio::time::Instant::now();
        let err = MergePoller::new(Duration::from_secs(20), 3)
            .wait(&host, &repo, &pr, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PromoteError::PromotionTimeout { attempts: 3, .. }));
        assert_eq!(host.state_reads(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_the_wait() {
        let repo = RepoRef::new("github.com", "acme", "env-staging");
        let host = FakeHost::new();
        let pr = open_pr(&host, &repo).await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let err = MergePoller::new(Duration::from_secs(20), 100)
            .wait(&host, &repo, &pr, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PromoteError::Cancelled));
        assert_eq!(host.state_reads(), 2);
    }

    #[test]
    fn test_attempts_from_config() {
        let config = PromoteConfig::default()
            .with_polling(Duration::from_secs(20), Duration::from_secs(50));
        let poller = MergePoller::from_config(&config);
        assert_eq!(poller.max_attempts(), 3);
        assert_eq!(poller.interval(), Duration::from_secs(20));
    }
}
