//! In-memory fakes for the capability traits (testing only)
//!
//! `MemoryEnvironmentRegistry`, `MemoryVersionStream`, `FakeGitClient` and
//! `FakeHost` satisfy the trait contracts without a cluster, network access
//! or a git remote, and record what was asked of them.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::environment::{Environment, EnvironmentRegistry};
use crate::error::{PromoteError, Result};
use crate::git::{BranchOrigin, GitClient, PushStatus};
use crate::github::{
    CreatePullRequest, PullRequestHost, PullRequestRecord, PullRequestState, RepoRef,
};
use crate::version::VersionStream;

// ---------------------------------------------------------------------------
// MemoryEnvironmentRegistry
// ---------------------------------------------------------------------------

/// Registry holding environments per namespace.
#[derive(Debug, Default)]
pub struct MemoryEnvironmentRegistry {
    environments: Mutex<BTreeMap<String, Vec<Environment>>>,
    unavailable: AtomicBool,
}

impl MemoryEnvironmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment to `namespace`.
    pub fn with_environment(self, namespace: &str, environment: Environment) -> Self {
        self.environments
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .push(environment);
        self
    }

    /// Make every lookup fail with `RegistryUnavailable`.
    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PromoteError::RegistryUnavailable {
                message: "registry is down".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EnvironmentRegistry for MemoryEnvironmentRegistry {
    async fn get_environment(&self, namespace: &str, name: &str) -> Result<Option<Environment>> {
        self.check()?;
        let environments = self.environments.lock().unwrap();
        Ok(environments
            .get(namespace)
            .and_then(|envs| envs.iter().find(|e| e.name == name))
            .cloned())
    }

    async fn list_environments(&self, namespace: &str) -> Result<Vec<Environment>> {
        self.check()?;
        let environments = self.environments.lock().unwrap();
        Ok(environments.get(namespace).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryVersionStream
// ---------------------------------------------------------------------------

/// Version stream backed by a `HashMap<app, version>`.
#[derive(Debug, Default)]
pub struct MemoryVersionStream {
    versions: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl MemoryVersionStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(self, application: &str, version: &str) -> Self {
        self.versions
            .lock()
            .unwrap()
            .insert(application.to_string(), version.to_string());
        self
    }

    /// Make every lookup fail with `VersionStreamUnavailable`.
    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Number of `resolve_latest` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionStream for MemoryVersionStream {
    async fn resolve_latest(&self, application: &str) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PromoteError::VersionStreamUnavailable {
                message: "version stream is down".into(),
            });
        }
        Ok(self.versions.lock().unwrap().get(application).cloned())
    }
}

// ---------------------------------------------------------------------------
// FakeGitClient
// ---------------------------------------------------------------------------

/// Repository-relative file contents of one branch.
type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug)]
struct FakeRemote {
    default_branch: String,
    branches: BTreeMap<String, Snapshot>,
}

#[derive(Debug)]
struct Checkout {
    url: String,
    branch: String,
    committed: Option<Snapshot>,
}

/// A record of one push that reached the fake remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPush {
    pub url: String,
    pub branch: String,
}

/// Git client whose remotes live in memory.
///
/// Clones materialise a branch snapshot on disk; pushes store the committed
/// snapshot back under the branch name, so later clones see it.
#[derive(Debug, Default)]
pub struct FakeGitClient {
    remotes: Mutex<HashMap<String, FakeRemote>>,
    checkouts: Mutex<HashMap<PathBuf, Checkout>>,
    pushes: Mutex<Vec<RecordedPush>>,
    commits: Mutex<Vec<String>>,
    clones: AtomicUsize,
    reject_pushes: AtomicBool,
}

impl FakeGitClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote at `url` whose `branch` holds `files`.
    pub fn with_files(self, url: &str, branch: &str, files: &[(&str, &str)]) -> Self {
        let snapshot = files
            .iter()
            .map(|(path, content)| (PathBuf::from(path), content.as_bytes().to_vec()))
            .collect();
        self.remotes.lock().unwrap().insert(
            url.to_string(),
            FakeRemote {
                default_branch: branch.to_string(),
                branches: BTreeMap::from([(branch.to_string(), snapshot)]),
            },
        );
        self
    }

    /// Register a remote at `url` whose `branch` holds a copy of `dir`.
    pub fn with_fixture(self, url: &str, branch: &str, dir: &Path) -> Result<Self> {
        let snapshot = read_snapshot(dir)?;
        self.remotes.lock().unwrap().insert(
            url.to_string(),
            FakeRemote {
                default_branch: branch.to_string(),
                branches: BTreeMap::from([(branch.to_string(), snapshot)]),
            },
        );
        Ok(self)
    }

    /// Make subsequent pushes report a non-fast-forward rejection.
    pub fn reject_pushes(&self, reject: bool) {
        self.reject_pushes.store(reject, Ordering::SeqCst);
    }

    /// Fast-forward `into` to the content of `branch`, as a merge would.
    pub fn merge_branch(&self, url: &str, branch: &str, into: &str) {
        let mut remotes = self.remotes.lock().unwrap();
        if let Some(remote) = remotes.get_mut(url)
            && let Some(snapshot) = remote.branches.get(branch).cloned()
        {
            remote.branches.insert(into.to_string(), snapshot);
        }
    }

    /// Content of `path` on `branch` of the remote at `url`.
    pub fn file(&self, url: &str, branch: &str, path: &str) -> Option<String> {
        let remotes = self.remotes.lock().unwrap();
        remotes
            .get(url)?
            .branches
            .get(branch)?
            .get(Path::new(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Branches present on the remote at `url`.
    pub fn branches(&self, url: &str) -> Vec<String> {
        let remotes = self.remotes.lock().unwrap();
        remotes
            .get(url)
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    fn snapshot_of(&self, url: &str, branch: &str) -> Option<Snapshot> {
        let remotes = self.remotes.lock().unwrap();
        remotes.get(url)?.branches.get(branch).cloned()
    }
}

fn read_snapshot(dir: &Path) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PromoteError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        snapshot.insert(rel.to_path_buf(), std::fs::read(entry.path())?);
    }
    Ok(snapshot)
}

fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    for (rel, content) in snapshot {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}

#[async_trait]
impl GitClient for FakeGitClient {
    async fn clone_repo(&self, url: &str, git_ref: Option<&str>, dest: &Path) -> Result<String> {
        let branch = {
            let remotes = self.remotes.lock().unwrap();
            let remote = remotes
                .get(url)
                .ok_or_else(|| PromoteError::RepositoryUnavailable {
                    url: url.to_string(),
                    message: "no such repository".into(),
                })?;
            git_ref.unwrap_or(&remote.default_branch).to_string()
        };
        let snapshot =
            self.snapshot_of(url, &branch)
                .ok_or_else(|| PromoteError::RepositoryUnavailable {
                    url: url.to_string(),
                    message: format!("remote branch '{}' not found", branch),
                })?;

        std::fs::create_dir_all(dest)?;
        write_snapshot(dest, &snapshot)?;
        self.clones.fetch_add(1, Ordering::SeqCst);
        self.checkouts.lock().unwrap().insert(
            dest.to_path_buf(),
            Checkout {
                url: url.to_string(),
                branch: branch.clone(),
                committed: None,
            },
        );
        Ok(branch)
    }

    async fn checkout_branch(
        &self,
        dir: &Path,
        branch: &str,
        create_if_absent: bool,
    ) -> Result<BranchOrigin> {
        let url = {
            let checkouts = self.checkouts.lock().unwrap();
            let checkout = checkouts.get(dir).ok_or_else(|| not_a_clone(dir))?;
            if checkout.branch == branch {
                return Ok(BranchOrigin::Local);
            }
            checkout.url.clone()
        };

        let origin = match self.snapshot_of(&url, branch) {
            Some(snapshot) => {
                write_snapshot(dir, &snapshot)?;
                BranchOrigin::Remote
            }
            None if create_if_absent => BranchOrigin::Created,
            None => {
                return Err(PromoteError::Git(git2::Error::from_str(&format!(
                    "branch '{}' not found",
                    branch
                ))));
            }
        };

        if let Some(checkout) = self.checkouts.lock().unwrap().get_mut(dir) {
            checkout.branch = branch.to_string();
        }
        Ok(origin)
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<String> {
        let snapshot = read_snapshot(dir)?;
        let mut checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts.get_mut(dir).ok_or_else(|| not_a_clone(dir))?;
        checkout.committed = Some(snapshot);

        let mut commits = self.commits.lock().unwrap();
        commits.push(message.to_string());
        Ok(format!("{:040x}", commits.len()))
    }

    async fn push(&self, dir: &Path, branch: &str) -> Result<PushStatus> {
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Ok(PushStatus::Rejected("non-fast-forward".into()));
        }

        let (url, snapshot) = {
            let checkouts = self.checkouts.lock().unwrap();
            let checkout = checkouts.get(dir).ok_or_else(|| not_a_clone(dir))?;
            let snapshot = checkout.committed.clone().ok_or_else(|| {
                PromoteError::Git(git2::Error::from_str("nothing committed to push"))
            })?;
            (checkout.url.clone(), snapshot)
        };

        if let Some(remote) = self.remotes.lock().unwrap().get_mut(&url) {
            remote.branches.insert(branch.to_string(), snapshot);
        }
        self.pushes.lock().unwrap().push(RecordedPush {
            url,
            branch: branch.to_string(),
        });
        Ok(PushStatus::Pushed)
    }
}

fn not_a_clone(dir: &Path) -> PromoteError {
    PromoteError::Git(git2::Error::from_str(&format!(
        "{} is not a clone made by this client",
        dir.display()
    )))
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

/// Pull request host keeping pull requests per repository full name.
///
/// Numbers start at 1 in each repository. State reads can be scripted with
/// [`FakeHost::with_poll_script`]; each read consumes one scripted state and
/// applies it to the pull request being read.
#[derive(Debug, Default)]
pub struct FakeHost {
    pulls: Mutex<BTreeMap<String, Vec<PullRequestRecord>>>,
    poll_script: Mutex<VecDeque<PullRequestState>>,
    auto_merge_requests: Mutex<Vec<(String, u64)>>,
    created: AtomicUsize,
    updated: AtomicUsize,
    state_reads: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// States returned by successive `pull_request_state` calls.
    pub fn with_poll_script(self, states: impl IntoIterator<Item = PullRequestState>) -> Self {
        self.poll_script.lock().unwrap().extend(states);
        self
    }

    /// Make every call fail with a host error.
    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Look a pull request up by repository full name and number.
    pub fn find(&self, full_name: &str, number: u64) -> Option<PullRequestRecord> {
        let pulls = self.pulls.lock().unwrap();
        pulls
            .get(full_name)?
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
    }

    pub fn pull_requests(&self, full_name: &str) -> Vec<PullRequestRecord> {
        let pulls = self.pulls.lock().unwrap();
        pulls.get(full_name).cloned().unwrap_or_default()
    }

    /// Change a pull request's state, as a reviewer or merge bot would.
    pub fn set_state(&self, full_name: &str, number: u64, state: PullRequestState) {
        let mut pulls = self.pulls.lock().unwrap();
        if let Some(pr) = pulls
            .get_mut(full_name)
            .and_then(|prs| prs.iter_mut().find(|pr| pr.number == number))
        {
            pr.state = state;
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn updated_count(&self) -> usize {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn state_reads(&self) -> usize {
        self.state_reads.load(Ordering::SeqCst)
    }

    pub fn auto_merge_requests(&self) -> Vec<(String, u64)> {
        self.auto_merge_requests.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PromoteError::host("host is down"));
        }
        Ok(())
    }

    fn with_pr<T>(
        &self,
        repo: &RepoRef,
        number: u64,
        f: impl FnOnce(&mut PullRequestRecord) -> T,
    ) -> Result<T> {
        let mut pulls = self.pulls.lock().unwrap();
        pulls
            .get_mut(&repo.full_name())
            .and_then(|prs| prs.iter_mut().find(|pr| pr.number == number))
            .map(f)
            .ok_or_else(|| {
                PromoteError::host(format!("pull request #{} of {} not found", number, repo))
            })
    }
}

#[async_trait]
impl PullRequestHost for FakeHost {
    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRecord>> {
        self.check()?;
        let pulls = self.pulls.lock().unwrap();
        Ok(pulls.get(&repo.full_name()).and_then(|prs| {
            prs.iter()
                .find(|pr| {
                    pr.head == head && pr.base == base && pr.state == PullRequestState::Open
                })
                .cloned()
        }))
    }

    async fn find_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Option<PullRequestRecord>> {
        self.check()?;
        Ok(self.find(&repo.full_name(), number))
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &CreatePullRequest,
    ) -> Result<PullRequestRecord> {
        self.check()?;
        let mut pulls = self.pulls.lock().unwrap();
        let prs = pulls.entry(repo.full_name()).or_default();
        let number = prs.len() as u64 + 1;
        let record = PullRequestRecord {
            number,
            link: format!("https://{}/{}/pull/{}", repo.host, repo.full_name(), number),
            title: request.title.clone(),
            body: request.body.clone(),
            head: request.head.clone(),
            base: request.base.clone(),
            state: PullRequestState::Open,
        };
        prs.push(record.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRecord> {
        self.check()?;
        let record = self.with_pr(repo, number, |pr| {
            pr.title = title.to_string();
            pr.body = body.to_string();
            pr.clone()
        })?;
        self.updated.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn pull_request_state(&self, repo: &RepoRef, number: u64) -> Result<PullRequestState> {
        self.check()?;
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        let scripted = self.poll_script.lock().unwrap().pop_front();
        self.with_pr(repo, number, |pr| {
            if let Some(state) = scripted {
                pr.state = state;
            }
            pr.state
        })
    }

    async fn request_auto_merge(&self, repo: &RepoRef, number: u64) -> Result<()> {
        self.check()?;
        self.with_pr(repo, number, |_| ())?;
        self.auto_merge_requests
            .lock()
            .unwrap()
            .push((repo.full_name(), number));
        Ok(())
    }
}
