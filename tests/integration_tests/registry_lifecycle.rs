//! Registry lifecycle against a mock Consul agent

use netmend::discovery::{ConsulBackend, Deregistration, RegistrationState, ServiceRegistryClient};
use netmend::utils::error::RegistryError;
use netmend::utils::retry::RecordingClock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::registry_config;

fn registry_client(server: &MockServer, clock: &RecordingClock) -> ServiceRegistryClient {
    let config = registry_config(server);
    let backend = Arc::new(ConsulBackend::new(&config).unwrap());
    ServiceRegistryClient::new(config, backend).with_clock(Arc::new(clock.clone()))
}

#[tokio::test]
async fn test_register_gives_up_after_five_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&mock_server)
        .await;

    let clock = RecordingClock::new();
    let client = registry_client(&mock_server, &clock);

    let err = assert_err!(client.register().await);

    assert!(matches!(
        err,
        RegistryError::RegistryUnavailable { attempts: 5, .. }
    ));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 4]);
    assert_eq!(client.state().await, RegistrationState::Unregistered);
}

#[tokio::test]
async fn test_register_recovers_when_agent_comes_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let clock = RecordingClock::new();
    let client = registry_client(&mock_server, &clock);

    let instance = assert_ok!(client.register().await);

    assert!(instance.instance_id.starts_with("chat-"));
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
    assert_eq!(client.state().await, RegistrationState::Registered);
}

#[tokio::test]
async fn test_register_announces_configured_tags() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .and(body_partial_json(json!({
            "Name": "chat",
            "Tags": ["chat", "websocket"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = registry_config(&mock_server);
    config.tags = vec!["chat".to_string(), "websocket".to_string()];
    let backend = Arc::new(ConsulBackend::new(&config).unwrap());
    let client = ServiceRegistryClient::new(config, backend)
        .with_clock(Arc::new(RecordingClock::new()));

    let instance = assert_ok!(client.register().await);
    assert_eq!(instance.tags, vec!["chat".to_string(), "websocket".to_string()]);
}

#[tokio::test]
async fn test_full_lifecycle() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v1/agent/service/deregister/chat-\d+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Service": {"Address": "user-a", "Port": 8002}},
            {"Service": {"Address": "user-b", "Port": 8002}},
            {"Service": {"Address": "user-c", "Port": 8002}}
        ])))
        .mount(&mock_server)
        .await;

    let clock = RecordingClock::new();
    let client = registry_client(&mock_server, &clock);

    assert_ok!(client.register().await);

    let peer = client.resolve_one("user").await.unwrap();
    assert!(["user-a:8002", "user-b:8002", "user-c:8002"].contains(&peer.as_str()));
    assert_eq!(client.resolve_addresses("user").await.unwrap().len(), 3);

    assert_eq!(client.deregister().await, Deregistration::Completed);
    assert_eq!(client.deregister().await, Deregistration::Skipped);
    assert!(client.instance().await.is_none());
}

#[tokio::test]
async fn test_deregister_failure_does_not_raise() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v1/agent/service/deregister/.+$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = registry_client(&mock_server, &RecordingClock::new());
    assert_ok!(client.register().await);

    assert!(matches!(client.deregister().await, Deregistration::Failed(_)));
}

#[tokio::test]
async fn test_resolve_with_no_passing_instances() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/health/service/media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let client = registry_client(&mock_server, &RecordingClock::new());
    let err = client.resolve_one("media").await.unwrap_err();

    assert_eq!(err, RegistryError::NoHealthyInstance("media".to_string()));
    assert_eq!(err.to_string(), "No healthy instance of service 'media'");
}
