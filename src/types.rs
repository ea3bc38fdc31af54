use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Comment body that asks the CI bot to rerun every failed required job.
pub const RETEST_COMMENT: &str = "/retest-required";

/// State of a single commit status as reported by the forge.
///
/// Anything other than `success`, `pending` or `failure` is kept verbatim in
/// `Other` and is ignored by [`CheckReport::classify`]. That includes
/// GitHub's `error` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckState {
    Success,
    Pending,
    Failure,
    Other(String),
}

impl CheckState {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "success" => CheckState::Success,
            "pending" => CheckState::Pending,
            "failure" => CheckState::Failure,
            other => CheckState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CheckState::Success => "success",
            CheckState::Pending => "pending",
            CheckState::Failure => "failure",
            CheckState::Other(tag) => tag,
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status attached to a commit, e.g. a CI job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    pub context: String,
    pub state: CheckState,
}

impl CheckRecord {
    pub fn new(context: impl Into<String>, state: CheckState) -> Self {
        Self {
            context: context.into(),
            state,
        }
    }
}

/// Check contexts grouped by outcome, each bucket in the order the forge
/// returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub successes: Vec<String>,
    pub pendings: Vec<String>,
    pub failures: Vec<String>,
}

impl CheckReport {
    /// Partitions `records` in a single pass.
    ///
    /// Contexts are not deduplicated, so a context reported twice shows up
    /// twice. Records in an unrecognised state are dropped.
    pub fn classify<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CheckRecord>,
    {
        let mut report = CheckReport::default();

        for record in records {
            match record.state {
                CheckState::Success => report.successes.push(record.context),
                CheckState::Pending => report.pendings.push(record.context),
                CheckState::Failure => report.failures.push(record.context),
                CheckState::Other(tag) => {
                    tracing::debug!(context = %record.context, state = %tag, "Ignoring check");
                }
            }
        }

        report
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Head commit SHA of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pull request every remote call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestTarget {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for PullRequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// The remote call a [`RemoteError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    FetchCommit,
    FetchStatuses,
    PostComment,
}

impl RemoteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::FetchCommit => "fetch head commit",
            RemoteOperation::FetchStatuses => "list statuses",
            RemoteOperation::PostComment => "create comment",
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A gateway call failed: transport, HTTP status, auth or decoding.
#[derive(Debug, Error)]
#[error("failed to {operation}")]
pub struct RemoteError {
    pub operation: RemoteOperation,
    #[source]
    pub source: BoxError,
}

impl RemoteError {
    pub fn new(operation: RemoteOperation, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Bad or missing settings, detected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid pull request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid configuration:{}", format_problems(.problems))]
    Invalid { problems: Vec<String> },
}

fn format_problems(problems: &[String]) -> String {
    problems.iter().map(|p| format!("\n\t{p}")).collect()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No failing checks were left; `polls` counts the status fetches.
    AllPassing { polls: u64 },
    /// Single-shot mode posted the retest comment.
    RetestRequested,
    /// The cancellation token fired before the loop finished.
    Cancelled,
}

/// Access to the pull request operations the retest loop needs.
///
/// Implementations must not retry on their own; the loop decides when to try
/// again.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_head_commit(&self, target: &PullRequestTarget)
    -> Result<CommitRef, RemoteError>;

    async fn fetch_statuses(
        &self,
        target: &PullRequestTarget,
        commit: &CommitRef,
    ) -> Result<Vec<CheckRecord>, RemoteError>;

    /// Creates a new comment every time it is called.
    async fn post_comment(&self, target: &PullRequestTarget, body: &str)
    -> Result<(), RemoteError>;
}
