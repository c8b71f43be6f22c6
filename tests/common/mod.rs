//! Common test utilities

#![allow(dead_code)]

use netmend::discovery::RegistryConfig;
use netmend::http::{AuthenticatedHttpClient, CredentialMode, HttpClientConfig};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REFRESH_PATH: &str = "/auth/refresh-token";

/// Client pointed at the mock server
pub fn api_client(server: &MockServer, mode: CredentialMode) -> AuthenticatedHttpClient {
    let config = HttpClientConfig::new(server.uri())
        .with_credential_mode(mode)
        .with_timeout(Duration::from_secs(5));
    AuthenticatedHttpClient::new(config).unwrap()
}

/// Refresh endpoint that sets `session=fresh`
pub fn refresh_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).insert_header("set-cookie", "session=fresh; Path=/; HttpOnly")
}

/// Mount the refresh endpoint with an expected call count
pub async fn mount_refresh(
    server: &MockServer,
    response: ResponseTemplate,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Registry config whose backend is the mock server
pub fn registry_config(server: &MockServer) -> RegistryConfig {
    let address = server.address();
    RegistryConfig::builder()
        .backend(address.ip().to_string(), address.port())
        .service_name("chat")
        .instance("chat", 8003)
        .backend_timeout_secs(2)
        .build()
        .unwrap()
}
