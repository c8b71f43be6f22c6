//! Integration tests for AuthenticatedHttpClient using wiremock
//!
//! These tests validate request shaping, response classification and the
//! refresh-then-replay path against mock servers.

mod common;

use common::{api_client, mount_refresh, refresh_ok, REFRESH_PATH};
use netmend::http::{ApiRequest, AuthenticatedHttpClient, CredentialMode, HttpClientConfig, ResponseBody};
use netmend::utils::error::FetchError;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Request Shaping
// ============================================================================

#[tokio::test]
async fn test_get_sends_no_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .and(header("cache-control", "no-store"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "sen"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let body = client.issue(&ApiRequest::get("/v1/users/me")).await.unwrap();

    assert_eq!(body, ResponseBody::Json(json!({"username": "sen"})));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chats"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "general"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let request = ApiRequest::post("/v1/chats")
        .with_json(&json!({"name": "general"}))
        .unwrap();

    #[derive(Deserialize)]
    struct Created {
        id: u32,
    }

    let created: Created = client.issue_json(&request).await.unwrap();
    assert_eq!(created.id, 7);
}

#[tokio::test]
async fn test_delete_without_body_sends_json_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/chats/7"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let body = client.issue(&ApiRequest::delete("/v1/chats/7")).await.unwrap();

    assert_eq!(body, ResponseBody::Empty);
}

#[tokio::test]
async fn test_get_has_no_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    client.issue(&ApiRequest::get("/v1/chats")).await.unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("content-type").is_none());
}

#[tokio::test]
async fn test_caller_content_type_is_kept() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/avatar"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let request = ApiRequest::put("/v1/avatar").with_header("Content-Type", "text/plain");
    client.issue(&request).await.unwrap();

    let received = mock_server.received_requests().await.unwrap();
    let content_types: Vec<&str> = received[0]
        .headers
        .get_all("content-type")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(content_types, vec!["text/plain"]);
}

#[tokio::test]
async fn test_absolute_target_bypasses_base_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::new("http://localhost:1");
    let client = AuthenticatedHttpClient::new(config).unwrap();
    let target = format!("{}/status", mock_server.uri());

    let body = client.issue(&ApiRequest::get(target)).await.unwrap();
    assert_eq!(body.as_text(), Some("ok"));
}

// ============================================================================
// Response Classification
// ============================================================================

#[tokio::test]
async fn test_no_content_is_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/chats/7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let body = client.issue(&ApiRequest::delete("/v1/chats/7")).await.unwrap();

    assert!(body.is_empty());
}

#[tokio::test]
async fn test_missing_content_type_is_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let body = client.issue(&ApiRequest::get("/v1/ping")).await.unwrap();

    assert_eq!(body, ResponseBody::Empty);
}

#[tokio::test]
async fn test_text_plain_is_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/version"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1.4.2"))
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let body = client.issue(&ApiRequest::get("/v1/version")).await.unwrap();

    assert_eq!(body, ResponseBody::Text("1.4.2".to_string()));
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let result = client.issue(&ApiRequest::get("/v1/users/me")).await;

    assert!(matches!(result, Err(FetchError::Parse(_))));
}

// ============================================================================
// Errors Without Refresh
// ============================================================================

#[tokio::test]
async fn test_not_found_is_returned_without_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/chats/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Chat not found"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, refresh_ok(), 0).await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let err = client
        .issue(&ApiRequest::get("/v1/chats/404"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::Http {
            status: 404,
            body: Some(json!({"message": "Chat not found"})),
        }
    );
    assert_eq!(client.coordinator().attempts_started(), 0);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/feed"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let err = client.issue(&ApiRequest::get("/v1/feed")).await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert!(err.is_server_error());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = AuthenticatedHttpClient::new(
        HttpClientConfig::new("http://localhost:1").with_timeout(Duration::from_secs(1)),
    )
    .unwrap();

    let result = client.issue(&ApiRequest::get("/v1/users/me")).await;

    assert!(matches!(result, Err(FetchError::Network(_))));
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = client
        .issue_with_cancel(&ApiRequest::get("/v1/slow"), &cancel)
        .await;

    assert_eq!(result, Err(FetchError::Cancelled));
}

// ============================================================================
// Refresh and Replay
// ============================================================================

#[tokio::test]
async fn test_cookie_jar_refresh_then_replay() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "sen"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, refresh_ok(), 1).await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let body = client.issue(&ApiRequest::get("/v1/users/me")).await.unwrap();

    assert_eq!(body.as_json(), Some(&json!({"username": "sen"})));
    assert_eq!(client.coordinator().attempts_started(), 1);
}

#[tokio::test]
async fn test_forwarded_cookie_reaches_refresh_and_replay() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .and(header("cookie", "theme=dark; session=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "sen"})))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("cookie", "theme=dark; session=stale"))
        .respond_with(refresh_ok())
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = api_client(&mock_server, CredentialMode::ForwardedHeader);
    let request = ApiRequest::get("/v1/users/me").with_cookie("theme=dark; session=stale");

    let body = client.issue(&request).await.unwrap();
    assert_eq!(body.as_json(), Some(&json!({"username": "sen"})));
}

#[tokio::test]
async fn test_replay_still_unauthorized_is_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, refresh_ok(), 1).await;

    let client = api_client(&mock_server, CredentialMode::ForwardedHeader);
    let err = client
        .issue(&ApiRequest::get("/v1/users/me").with_cookie("session=stale"))
        .await
        .unwrap_err();

    assert!(err.is_auth_exhausted());
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_refresh_failure_is_exhausted_without_replay() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, ResponseTemplate::new(401), 1).await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let err = client
        .issue(&ApiRequest::get("/v1/users/me"))
        .await
        .unwrap_err();

    match err {
        FetchError::AuthExhausted { cause } => {
            assert_eq!(*cause, FetchError::Http { status: 401, body: None });
        }
        other => panic!("Expected AuthExhausted, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_replay_error_passes_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    mount_refresh(&mock_server, refresh_ok(), 1).await;

    let client = api_client(&mock_server, CredentialMode::CookieJar);
    let err = client
        .issue(&ApiRequest::get("/v1/users/me"))
        .await
        .unwrap_err();

    assert!(!err.is_auth_exhausted());
    assert_eq!(err.status(), Some(500));
}
