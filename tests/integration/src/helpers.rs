//! Test helper utilities for integration tests

use gateway_config::GatewayConfig;
use gateway_providers::{OpenAiCompatibleProvider, OpenAiConfig};
use gateway_server::{AppState, Server};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use secrecy::SecretString;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

/// Master key every test server is configured with
pub const TEST_KEY: &str = "sk-integration";

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// A running gateway in front of a wiremock upstream
pub struct TestServer {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the server
    pub base_url: String,
    /// Stand-in for the upstream model server
    pub upstream: MockServer,
    /// Shared state of the running gateway
    pub state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a gateway with `config`; the upstream URL and master key are
    /// filled in
    pub async fn start(mut config: GatewayConfig) -> Self {
        init_tracing();
        let upstream = MockServer::start().await;
        config.upstream.base_url = format!("{}/v1", upstream.uri());
        config.auth.master_key = Some(SecretString::new(TEST_KEY.to_string()));

        let provider = OpenAiCompatibleProvider::new(OpenAiConfig::from(&config.upstream))
            .expect("Failed to create provider");
        let state = AppState::new(config, Arc::new(provider)).expect("Failed to build state");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = Server::new(state.clone());
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = shutdown_rx.await;
                    "test".to_string()
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            base_url: format!("http://{addr}"),
            upstream,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Start a gateway with default configuration
    pub async fn with_default_config() -> Self {
        Self::start(GatewayConfig::default()).await
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated GET
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TEST_KEY)
            .send()
            .await
            .expect("Request failed")
    }

    /// Authenticated JSON POST on behalf of `user`
    pub async fn post_chat(&self, user: &str, body: &Value) -> Response {
        self.client
            .post(self.url("/v1/chat/completions"))
            .bearer_auth(TEST_KEY)
            .header("x-user-id", user)
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Signal shutdown and wait for the server task to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .expect("Server did not stop")
                .expect("Server task failed");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Assert response status
#[track_caller]
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {expected}, got {}",
        response.status()
    );
}
