//! Concurrent session-refresh scenarios
//!
//! Many requests hit an expired session at once; exactly one refresh call
//! must reach the server and every request must see its outcome.

use netmend::http::{ApiRequest, CredentialMode};
use netmend::utils::error::FetchError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{api_client, mount_refresh, refresh_ok};

const CALLERS: usize = 20;

async fn mount_protected_endpoint(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .and(header("cookie", "session=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "sen"})))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
}

async fn issue_concurrently(
    client: Arc<netmend::http::AuthenticatedHttpClient>,
) -> Vec<Result<netmend::http::ResponseBody, FetchError>> {
    let mut handles = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            let request = ApiRequest::get("/v1/users/me").with_cookie("session=stale");
            client.issue(&request).await
        }));
    }

    let mut results = Vec::with_capacity(CALLERS);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_share_one_refresh() {
    let mock_server = MockServer::start().await;
    mount_protected_endpoint(&mock_server).await;
    mount_refresh(
        &mock_server,
        refresh_ok().set_delay(Duration::from_millis(500)),
        1,
    )
    .await;

    let client = Arc::new(api_client(&mock_server, CredentialMode::ForwardedHeader));
    let results = issue_concurrently(Arc::clone(&client)).await;

    for result in results {
        let body = result.unwrap();
        assert_eq!(body.as_json(), Some(&json!({"username": "sen"})));
    }
    assert_eq!(client.coordinator().attempts_started(), 1);
    assert!(!client.coordinator().is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_share_one_failure() {
    let mock_server = MockServer::start().await;
    mount_protected_endpoint(&mock_server).await;
    mount_refresh(
        &mock_server,
        ResponseTemplate::new(401).set_delay(Duration::from_millis(500)),
        1,
    )
    .await;

    let client = Arc::new(api_client(&mock_server, CredentialMode::ForwardedHeader));
    let results = issue_concurrently(Arc::clone(&client)).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_auth_exhausted(), "Expected AuthExhausted, got: {err:?}");
    }
    assert_eq!(client.coordinator().attempts_started(), 1);
}

#[tokio::test]
async fn test_slot_clears_after_failed_refresh() {
    let mock_server = MockServer::start().await;
    mount_protected_endpoint(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(crate::common::REFRESH_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, refresh_ok(), 1).await;

    let client = api_client(&mock_server, CredentialMode::ForwardedHeader);
    let request = ApiRequest::get("/v1/users/me").with_cookie("session=stale");

    let first = client.issue(&request).await.unwrap_err();
    assert!(first.is_auth_exhausted());
    assert_eq!(first.status(), Some(500));

    let second = client.issue(&request).await.unwrap();
    assert_eq!(second.as_json(), Some(&json!({"username": "sen"})));
    assert_eq!(client.coordinator().attempts_started(), 2);
}

#[tokio::test]
async fn test_sequential_expiries_refresh_each_time() {
    let mock_server = MockServer::start().await;
    mount_protected_endpoint(&mock_server).await;
    mount_refresh(&mock_server, refresh_ok(), 2).await;

    let client = api_client(&mock_server, CredentialMode::ForwardedHeader);
    let request = ApiRequest::get("/v1/users/me").with_cookie("session=stale");

    assert!(client.issue(&request).await.is_ok());
    assert!(client.issue(&request).await.is_ok());
    assert_eq!(client.coordinator().attempts_started(), 2);
}
