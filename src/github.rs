use async_trait::async_trait;
use http::Uri;
use octocrab::{Octocrab, service::middleware::retry::RetryConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    CheckRecord, CheckState, CommitRef, Gateway, PullRequestTarget, RemoteError, RemoteOperation,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

// The statuses endpoint pages at 30 by default. Only the first page is read,
// so ask for the largest one GitHub allows.
const STATUSES_PER_PAGE: u8 = 100;

#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    head: ApiHead,
}

#[derive(Debug, Deserialize)]
struct ApiHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    context: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Serialize)]
struct ListParams {
    per_page: u8,
}

#[derive(Serialize)]
struct NewComment<'a> {
    body: &'a str,
}

/// Creates an authenticated GitHub client talking to `api_url`.
///
/// Octocrab's built-in retry layer is switched off: a failed call is
/// reported straight away and the next poll is the retry.
pub fn setup_github_client(token: &str, api_url: &str) -> anyhow::Result<Octocrab> {
    use anyhow::Context;

    let base_uri: Uri = api_url
        .parse()
        .with_context(|| format!("Invalid GitHub API URL: '{}'", api_url))?;

    Octocrab::builder()
        .personal_token(token.to_string())
        .add_retry_config(RetryConfig::None)
        .base_uri(base_uri)
        .context("Failed to set GitHub API URL")?
        .build()
        .context("Failed to create GitHub client")
}

/// [`Gateway`] backed by GitHub's REST API.
pub struct GitHub {
    client: Octocrab,
}

impl GitHub {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    fn repo_path(target: &PullRequestTarget) -> String {
        format!("/repos/{}/{}", target.owner, target.repo)
    }
}

#[async_trait]
impl Gateway for GitHub {
    async fn fetch_head_commit(
        &self,
        target: &PullRequestTarget,
    ) -> Result<CommitRef, RemoteError> {
        let route = format!("{}/pulls/{}", Self::repo_path(target), target.number);

        self.client
            .get::<ApiPullRequest, _, ()>(route, None)
            .await
            .map(|pr| CommitRef::new(pr.head.sha))
            .map_err(|e| RemoteError::new(RemoteOperation::FetchCommit, e))
    }

    async fn fetch_statuses(
        &self,
        target: &PullRequestTarget,
        commit: &CommitRef,
    ) -> Result<Vec<CheckRecord>, RemoteError> {
        let route = format!("{}/commits/{}/statuses", Self::repo_path(target), commit);
        let params = ListParams {
            per_page: STATUSES_PER_PAGE,
        };

        let statuses = self
            .client
            .get::<Vec<ApiStatus>, _, _>(route, Some(&params))
            .await
            .map_err(|e| RemoteError::new(RemoteOperation::FetchStatuses, e))?;

        if statuses.len() >= usize::from(STATUSES_PER_PAGE) {
            debug!(
                %commit,
                limit = STATUSES_PER_PAGE,
                "Statuses page is full; older statuses beyond it are not read"
            );
        }

        Ok(statuses
            .into_iter()
            .map(|s| CheckRecord::new(s.context, CheckState::from_tag(&s.state)))
            .collect())
    }

    async fn post_comment(&self, target: &PullRequestTarget, body: &str) -> Result<(), RemoteError> {
        let route = format!("{}/issues/{}/comments", Self::repo_path(target), target.number);

        let comment: ApiComment = self
            .client
            .post(route, Some(&NewComment { body }))
            .await
            .map_err(|e| RemoteError::new(RemoteOperation::PostComment, e))?;

        if let Some(url) = comment.html_url {
            debug!(%url, "Created comment");
        }

        Ok(())
    }
}
