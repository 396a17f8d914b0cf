//! End-to-end promotions against the in-memory fakes.

use gitops_promote::fakes::{FakeGitClient, FakeHost, MemoryEnvironmentRegistry, MemoryVersionStream};
use gitops_promote::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const HELMFILE_URL: &str = "https://github.com/jenkins-x/default-environment-helmfile.git";
const HELMFILE_REPO: &str = "jenkins-x/default-environment-helmfile";
const JX_APPS_URL: &str = "https://github.com/acme/environment-production.git";
const REQUIREMENTS_URL: &str = "git@github.com:acme/environment-qa.git";
const DEV_URL: &str = "https://github.com/acme/environment-dev.git";
const DEV_REPO: &str = "acme/environment-dev";
const BRANCH: &str = "promote-myapp-1.2.3";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn git() -> Arc<FakeGitClient> {
    Arc::new(
        FakeGitClient::new()
            .with_fixture(HELMFILE_URL, "master", &fixture("helmfile-env"))
            .unwrap()
            .with_fixture(JX_APPS_URL, "main", &fixture("jx-apps-env"))
            .unwrap()
            .with_fixture(REQUIREMENTS_URL, "master", &fixture("requirements-env"))
            .unwrap(),
    )
}

fn staging(strategy: PromotionStrategy) -> Environment {
    Environment::new("staging", "jx-staging")
        .with_strategy(strategy)
        .with_source(SourceRepository::git(HELMFILE_URL))
        .with_order(100)
}

struct Harness {
    git: Arc<FakeGitClient>,
    host: Arc<FakeHost>,
    engine: PromoteEngine,
}

impl Harness {
    fn new(registry: MemoryEnvironmentRegistry, host: FakeHost) -> Self {
        Self::with_git(git(), registry, host)
    }

    fn with_git(git: Arc<FakeGitClient>, registry: MemoryEnvironmentRegistry, host: FakeHost) -> Self {
        let host = Arc::new(host);
        let config = PromoteConfig::default()
            .with_polling(Duration::from_secs(10), Duration::from_secs(30));
        let engine = Promote::new()
            .registry(Arc::new(registry))
            .version_stream(Arc::new(MemoryVersionStream::new().with_version("myapp", "1.2.3")))
            .git(git.clone())
            .host(host.clone())
            .config(config)
            .build()
            .unwrap();
        Self { git, host, engine }
    }

    fn with_environment(env: Environment) -> Self {
        Self::new(
            MemoryEnvironmentRegistry::new()
                .with_environment("jx", Environment::development("jx"))
                .with_environment("jx", env),
            FakeHost::new(),
        )
    }

    async fn promote(&self, request: PromotionRequest) -> PromotionReport {
        self.engine
            .promote(request, CancellationToken::new())
            .await
            .unwrap()
    }
}

fn to_staging() -> PromotionRequest {
    PromotionRequest::to_environment("myapp", "staging").version("1.2.3")
}

#[tokio::test(start_paused = true)]
async fn test_automatic_promotion_opens_and_merges_pull_request() {
    let h = Harness::new(
        MemoryEnvironmentRegistry::new().with_environment("jx", staging(PromotionStrategy::Automatic)),
        FakeHost::new().with_poll_script([PullRequestState::Open, PullRequestState::Merged]),
    );

    let report = h.promote(to_staging()).await;
    assert!(report.is_success());
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrMerged);
    assert_eq!(outcome.pr_number, Some(1));
    assert_eq!(outcome.repository.as_deref(), Some(HELMFILE_REPO));
    assert_eq!(outcome.branch.as_deref(), Some(BRANCH));
    assert_eq!(outcome.previous_version, None);

    let pr = h.host.find(HELMFILE_REPO, 1).unwrap();
    assert!(pr.title.contains("myapp"));
    assert!(pr.title.contains("1.2.3"));
    assert_eq!(pr.base, "master");
    assert_eq!(pr.head, BRANCH);
    assert!(pr.body.contains("```diff"));
    assert_eq!(pr.state, PullRequestState::Merged);
    assert_eq!(h.host.auto_merge_requests(), [(HELMFILE_REPO.to_string(), 1)]);
    assert_eq!(h.host.state_reads(), 2);

    let helmfile = h.git.file(HELMFILE_URL, BRANCH, "helmfile.yaml").unwrap();
    assert!(helmfile.contains("- chart: dev/myapp\n  version: 1.2.3\n  name: myapp\n  namespace: jx-staging\n"));
    assert!(helmfile.contains("- chart: jenkins-x/lighthouse\n  version: 1.1.0\n"));
    assert!(helmfile.starts_with("namespace: jx\nrepositories:\n"));

    let base = h.git.file(HELMFILE_URL, "master", "helmfile.yaml").unwrap();
    assert!(!base.contains("myapp"));
}

#[tokio::test(start_paused = true)]
async fn test_manual_environment_waits_for_a_human_merge() {
    let h = Harness::new(
        MemoryEnvironmentRegistry::new().with_environment("jx", staging(PromotionStrategy::Manual)),
        FakeHost::new().with_poll_script([PullRequestState::Open, PullRequestState::Merged]),
    );

    let report = h.promote(to_staging()).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrMerged);
    assert!(h.host.auto_merge_requests().is_empty());
    assert_eq!(h.host.state_reads(), 2);
}

#[tokio::test]
async fn test_manual_environment_without_polling_leaves_pull_request_open() {
    let h = Harness::with_environment(staging(PromotionStrategy::Manual));

    let report = h.promote(to_staging().no_poll(true)).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrCreated);
    assert_eq!(
        outcome.pr_link.as_deref(),
        Some("https://github.com/jenkins-x/default-environment-helmfile/pull/1")
    );
    assert!(h.host.auto_merge_requests().is_empty());
    assert_eq!(h.host.state_reads(), 0);
}

#[tokio::test]
async fn test_already_pinned_version_changes_nothing() {
    let env = Environment::new("qa", "jx-qa")
        .with_strategy(PromotionStrategy::Automatic)
        .with_source(SourceRepository::git(REQUIREMENTS_URL));
    let h = Harness::with_environment(env);

    let report = h
        .promote(PromotionRequest::to_environment("myapp", "qa").version("1.2.3"))
        .await;
    let outcome = report.outcome("qa").unwrap();
    assert_eq!(outcome.outcome, Outcome::NoChangeNeeded);
    assert_eq!(outcome.previous_version.as_deref(), Some("1.2.3"));
    assert_eq!(outcome.branch, None);
    assert_eq!(h.git.push_count(), 0);
    assert!(h.git.commit_messages().is_empty());
    assert_eq!(h.host.created_count(), 0);
}

#[tokio::test]
async fn test_never_strategy_is_skipped_without_cloning() {
    let h = Harness::with_environment(staging(PromotionStrategy::Never));

    let report = h.promote(to_staging()).await;
    assert_eq!(report.outcome("staging").unwrap().outcome, Outcome::Skipped);
    assert!(report.is_success());
    assert_eq!(h.git.clone_count(), 0);
}

#[tokio::test]
async fn test_dev_fallback_keeps_target_namespace() {
    let dev = Environment::development("jx").with_source(SourceRepository::git(HELMFILE_URL));
    let target = Environment::new("staging", "jx-staging").with_strategy(PromotionStrategy::Manual);
    let h = Harness::new(
        MemoryEnvironmentRegistry::new()
            .with_environment("jx", dev)
            .with_environment("jx", target),
        FakeHost::new(),
    );

    let report = h.promote(to_staging().no_poll(true)).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrCreated);
    assert_eq!(outcome.repository.as_deref(), Some(HELMFILE_REPO));

    let helmfile = h.git.file(HELMFILE_URL, BRANCH, "helmfile.yaml").unwrap();
    assert!(helmfile.contains("namespace: jx-staging"));
}

#[tokio::test]
async fn test_no_repository_at_all_is_an_input_error() {
    let target = Environment::new("staging", "jx-staging").with_strategy(PromotionStrategy::Manual);
    let h = Harness::with_environment(target);

    let report = h.promote(to_staging()).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Input));
    assert_eq!(h.git.clone_count(), 0);
}

#[tokio::test]
async fn test_rerun_reuses_open_pull_request() {
    let h = Harness::with_environment(staging(PromotionStrategy::Automatic));

    let first = h.promote(to_staging().no_poll(true)).await;
    let second = h.promote(to_staging().no_poll(true)).await;

    let first = first.outcome("staging").unwrap();
    let second = second.outcome("staging").unwrap();
    assert_eq!(first.outcome, Outcome::PrCreated);
    assert_eq!(second.outcome, Outcome::PrCreated);
    assert_eq!(first.pr_number, second.pr_number);
    assert_eq!(h.host.created_count(), 1);
    assert_eq!(h.host.updated_count(), 0);
    assert_eq!(h.git.push_count(), 1);
    assert_eq!(h.host.pull_requests(HELMFILE_REPO).len(), 1);
}

#[tokio::test]
async fn test_rerun_after_merge_is_no_change() {
    let h = Harness::with_environment(staging(PromotionStrategy::Automatic));

    h.promote(to_staging().no_poll(true)).await;
    h.git.merge_branch(HELMFILE_URL, BRANCH, "master");
    h.host.set_state(HELMFILE_REPO, 1, PullRequestState::Merged);

    let report = h.promote(to_staging().no_poll(true)).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::NoChangeNeeded);
    assert_eq!(outcome.previous_version.as_deref(), Some("1.2.3"));
    assert_eq!(h.git.push_count(), 1);
    assert_eq!(h.host.created_count(), 1);
}

#[tokio::test]
async fn test_flat_manifest_list_update_preserves_other_keys() {
    let env = Environment::new("production", "jx-production")
        .with_strategy(PromotionStrategy::Manual)
        .with_source(SourceRepository::git(JX_APPS_URL));
    let h = Harness::with_environment(env);

    let report = h
        .promote(
            PromotionRequest::to_environment("myapp", "production")
                .version("1.2.3")
                .no_poll(true),
        )
        .await;
    let outcome = report.outcome("production").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrCreated);
    assert_eq!(outcome.previous_version.as_deref(), Some("1.0.0"));

    let apps = h.git.file(JX_APPS_URL, BRANCH, "jx-apps.yml").unwrap();
    assert_eq!(
        apps,
        "defaultNamespace: jx\napps:\n- name: jenkins-x/lighthouse\n  version: 0.0.900\n- name: dev/myapp\n  version: 1.2.3\n  namespace: jx-staging\n  phase: apps\n"
    );
    let pr = h.host.find("acme/environment-production", 1).unwrap();
    assert_eq!(pr.base, "main");
    assert!(pr.body.contains("* production (`jx-production`): 1.0.0 -> 1.2.3"));
}

#[tokio::test]
async fn test_alias_adds_second_instance() {
    let env = Environment::new("qa", "jx-qa")
        .with_strategy(PromotionStrategy::Manual)
        .with_source(SourceRepository::git(REQUIREMENTS_URL));
    let h = Harness::with_environment(env);

    let report = h
        .promote(
            PromotionRequest::to_environment("myapp", "qa")
                .version("1.2.3")
                .alias("myapp-canary")
                .no_poll(true),
        )
        .await;
    assert_eq!(report.outcome("qa").unwrap().outcome, Outcome::PrCreated);

    let requirements = h
        .git
        .file(REQUIREMENTS_URL, BRANCH, "env/requirements.yaml")
        .unwrap();
    assert!(requirements.contains("  version: 1.2.3\n  alias: myapp-canary\n"));
    assert!(requirements.contains("- name: exposecontroller\n"));
}

#[tokio::test]
async fn test_environments_sharing_a_repository_get_one_pull_request() {
    let git = Arc::new(FakeGitClient::new().with_files(
        DEV_URL,
        "main",
        &[
            ("helmfile.yaml", "helmfiles:\n- path: helmfiles/jx/helmfile.yaml\n"),
            (
                "helmfiles/jx/helmfile.yaml",
                "namespace: jx\nreleases:\n- chart: jenkins-x/lighthouse\n  version: 1.1.0\n",
            ),
        ],
    ));
    let registry = MemoryEnvironmentRegistry::new()
        .with_environment(
            "jx",
            Environment::development("jx").with_source(SourceRepository::git(DEV_URL)),
        )
        .with_environment(
            "jx",
            Environment::new("staging", "jx-staging")
                .with_strategy(PromotionStrategy::Automatic)
                .with_order(100),
        )
        .with_environment(
            "jx",
            Environment::new("production", "jx-production")
                .with_strategy(PromotionStrategy::Automatic)
                .with_order(200),
        );
    let h = Harness::with_git(git, registry, FakeHost::new());

    let report = h
        .promote(PromotionRequest::to_all_automatic("myapp").no_poll(true))
        .await;
    assert!(report.is_success());
    for name in ["staging", "production"] {
        let outcome = report.outcome(name).unwrap();
        assert_eq!(outcome.outcome, Outcome::PrCreated, "{name}");
        assert_eq!(outcome.repository.as_deref(), Some(DEV_REPO));
        assert_eq!(outcome.branch.as_deref(), Some(BRANCH));
        assert_eq!(outcome.pr_number, Some(1));
    }

    assert_eq!(h.git.clone_count(), 1);
    assert_eq!(h.git.push_count(), 1);
    assert_eq!(h.git.commit_messages().len(), 1);
    let prs = h.host.pull_requests(DEV_REPO);
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].title, "chore: promote myapp to 1.2.3 in staging, production");
    assert_eq!(prs[0].base, "main");

    let root = h.git.file(DEV_URL, BRANCH, "helmfile.yaml").unwrap();
    for namespace in ["jx-staging", "jx-production"] {
        assert!(root.contains(&format!("- path: helmfiles/{namespace}/helmfile.yaml\n")));
        let nested = h
            .git
            .file(DEV_URL, BRANCH, &format!("helmfiles/{namespace}/helmfile.yaml"))
            .unwrap();
        assert!(
            nested.contains(&format!(
                "- chart: dev/myapp\n  version: 1.2.3\n  name: myapp\n  namespace: {namespace}\n"
            )),
            "{nested}"
        );
    }
}

#[tokio::test]
async fn test_renamed_helmfile_release_is_updated_in_place() {
    let url = "https://github.com/acme/environment-renamed.git";
    let git = Arc::new(FakeGitClient::new().with_files(
        url,
        "master",
        &[(
            "helmfile.yaml",
            "releases:\n- chart: dev/myapp\n  version: 1.0.0\n  name: myapp-svc\n  namespace: jx-staging\n",
        )],
    ));
    let env = Environment::new("staging", "jx-staging")
        .with_strategy(PromotionStrategy::Automatic)
        .with_source(SourceRepository::git(url));
    let h = Harness::with_git(
        git,
        MemoryEnvironmentRegistry::new().with_environment("jx", env),
        FakeHost::new(),
    );

    let report = h.promote(to_staging().no_poll(true)).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrCreated);
    assert_eq!(outcome.previous_version.as_deref(), Some("1.0.0"));

    let helmfile = h.git.file(url, BRANCH, "helmfile.yaml").unwrap();
    assert_eq!(
        helmfile,
        "releases:\n- chart: dev/myapp\n  version: 1.2.3\n  name: myapp-svc\n  namespace: jx-staging\n"
    );
}

#[tokio::test]
async fn test_push_rejection_is_a_conflict() {
    let h = Harness::with_environment(staging(PromotionStrategy::Automatic));
    h.git.reject_pushes(true);

    let report = h.promote(to_staging()).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Conflict));
    assert_eq!(outcome.branch.as_deref(), Some(BRANCH));
    assert_eq!(h.host.created_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_closed_pull_request_is_rejected() {
    let h = Harness::new(
        MemoryEnvironmentRegistry::new().with_environment("jx", staging(PromotionStrategy::Automatic)),
        FakeHost::new().with_poll_script([PullRequestState::Closed]),
    );

    let report = h.promote(to_staging()).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::PrRejected);
    assert!(outcome.outcome.is_failure());
    assert_eq!(
        outcome.pr_link.as_deref(),
        Some("https://github.com/jenkins-x/default-environment-helmfile/pull/1")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unmerged_pull_request_times_out() {
    let h = Harness::with_environment(staging(PromotionStrategy::Automatic));

    let report = h.promote(to_staging()).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(outcome.pr_number, Some(1));
    assert_eq!(h.host.state_reads(), 3);
    assert_eq!(
        h.host.find(HELMFILE_REPO, 1).unwrap().state,
        PullRequestState::Open
    );
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = Harness::with_environment(staging(PromotionStrategy::Automatic));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h.engine.promote(to_staging(), cancel).await.unwrap();
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(h.git.clone_count(), 0);
}

#[tokio::test]
async fn test_one_failing_environment_does_not_stop_the_rest() {
    let broken = Environment::new("production", "jx-production")
        .with_strategy(PromotionStrategy::Automatic)
        .with_source(SourceRepository::git("https://github.com/acme/missing.git"))
        .with_order(200);
    let h = Harness::new(
        MemoryEnvironmentRegistry::new()
            .with_environment("jx", Environment::development("jx"))
            .with_environment("jx", broken)
            .with_environment("jx", staging(PromotionStrategy::Automatic)),
        FakeHost::new(),
    );

    let report = h
        .promote(PromotionRequest::to_all_automatic("myapp").no_poll(true))
        .await;
    let names: Vec<_> = report.outcomes.iter().map(|o| o.environment.as_str()).collect();
    assert_eq!(names, ["staging", "production"]);
    assert_eq!(report.outcomes[0].outcome, Outcome::PrCreated);
    assert_eq!(report.outcomes[1].outcome, Outcome::Failed);
    assert_eq!(report.outcomes[1].error_kind, Some(ErrorKind::Infrastructure));
    assert_eq!(report.succeeded().count(), 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_host_outage_is_retryable() {
    let h = Harness::with_environment(staging(PromotionStrategy::Automatic));
    h.host.make_unavailable();

    let report = h.promote(to_staging()).await;
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.error_kind, Some(ErrorKind::Infrastructure));
    assert_eq!(h.git.push_count(), 1);
}

#[tokio::test]
async fn test_unsupported_layout() {
    let url = "https://github.com/acme/plain.git";
    let git = Arc::new(FakeGitClient::new().with_files(url, "master", &[("README.md", "hi\n")]));
    let env = Environment::new("staging", "jx-staging")
        .with_strategy(PromotionStrategy::Manual)
        .with_source(SourceRepository::git(url));
    let engine = Promote::new()
        .registry(Arc::new(MemoryEnvironmentRegistry::new().with_environment("jx", env)))
        .version_stream(Arc::new(MemoryVersionStream::new()))
        .git(git.clone())
        .host(Arc::new(FakeHost::new()))
        .build()
        .unwrap();

    let report = engine
        .promote(to_staging(), CancellationToken::new())
        .await
        .unwrap();
    let outcome = report.outcome("staging").unwrap();
    assert_eq!(outcome.error_kind, Some(ErrorKind::Unsupported));
    assert_eq!(git.push_count(), 0);
}
