//! Runs the retest loop against a fake GitHub API.

use std::time::Duration;

use autoretest::{
    CheckReport, Error, GitHub, Outcome, PullRequestTarget, RemoteOperation, get_checks,
    retest_until_green, setup_github_client,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

const PR_PATH: &str = "/repos/owner/repo/pulls/1";
const STATUSES_PATH: &str = "/repos/owner/repo/commits/abc123/statuses";
const COMMENTS_PATH: &str = "/repos/owner/repo/issues/1/comments";

fn target() -> PullRequestTarget {
    PullRequestTarget::new("owner", "repo", 1)
}

fn gateway(server: &MockServer) -> GitHub {
    GitHub::new(setup_github_client("test-token", &server.uri()).unwrap())
}

async fn mount_pull_request(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(PR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"head": {"sha": "abc123"}})))
        .mount(server)
        .await;
}

async fn mount_statuses(server: &MockServer, statuses: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(STATUSES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(statuses))
        .mount(server)
        .await;
}

async fn expect_comments(server: &MockServer, count: u64) {
    Mock::given(method("POST"))
        .and(path(COMMENTS_PATH))
        .and(body_json(json!({"body": "/retest-required"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(count)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_checks_over_http() {
    let server = MockServer::start().await;
    mount_pull_request(&server).await;
    mount_statuses(
        &server,
        json!([
            {"context": "ci: build", "state": "success"},
            {"context": "ci: test", "state": "pending"},
            {"context": "ci: deploy", "state": "failure"},
        ]),
    )
    .await;

    let report = get_checks(&gateway(&server), &target()).await.unwrap();

    assert_eq!(report.successes, vec!["ci: build"]);
    assert_eq!(report.pendings, vec!["ci: test"]);
    assert_eq!(report.failures, vec!["ci: deploy"]);
}

#[tokio::test]
async fn test_get_checks_without_statuses() {
    let server = MockServer::start().await;
    mount_pull_request(&server).await;
    mount_statuses(&server, json!([])).await;

    let report = get_checks(&gateway(&server), &target()).await.unwrap();

    assert_eq!(report, CheckReport::default());
}

#[tokio::test]
async fn test_single_shot_posts_one_comment() {
    let server = MockServer::start().await;
    mount_pull_request(&server).await;
    mount_statuses(&server, json!([{"context": "ci: e2e", "state": "failure"}])).await;
    expect_comments(&server, 1).await;

    let outcome = retest_until_green(
        &gateway(&server),
        &target(),
        Duration::ZERO,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, Outcome::RetestRequested);
}

#[tokio::test]
async fn test_green_pull_request_gets_no_comment() {
    let server = MockServer::start().await;
    mount_pull_request(&server).await;
    mount_statuses(&server, json!([{"context": "ci: e2e", "state": "success"}])).await;
    expect_comments(&server, 0).await;

    let outcome = retest_until_green(
        &gateway(&server),
        &target(),
        Duration::from_secs(30),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, Outcome::AllPassing { polls: 1 });
}

#[tokio::test]
async fn test_server_error_is_not_retried_and_posts_nothing() {
    let server = MockServer::start().await;
    mount_pull_request(&server).await;
    Mock::given(method("GET"))
        .and(path(STATUSES_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
        .expect(1)
        .mount(&server)
        .await;
    expect_comments(&server, 0).await;

    let result = retest_until_green(
        &gateway(&server),
        &target(),
        Duration::from_secs(30),
        &CancellationToken::new(),
    )
    .await;

    match result {
        Err(Error::Remote(err)) => assert_eq!(err.operation, RemoteOperation::FetchStatuses),
        other => panic!("expected a remote error, got {other:?}"),
    }
}
