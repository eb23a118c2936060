//! End-to-end integration tests
//!
//! Full request flow from client through the gateway to a mocked upstream
//! and back, including auth, cost accounting and metrics.

use crate::fixtures::*;
use crate::helpers::*;
use chrono::Utc;
use gateway_config::GatewayConfig;
use gateway_core::{BudgetPeriod, Scope};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_e2e_chat_completion_records_cost() {
    let server = TestServer::with_default_config().await;
    mount_completion(
        &server.upstream,
        upstream_completion("Paris.", 1000, 500),
    )
    .await;

    let response = server
        .post_chat("alice", &chat_request(PRICED_MODEL, "What is the capital of France?"))
        .await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], PRICED_MODEL);
    assert_eq!(body["choices"][0]["message"]["content"], "Paris.");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 1500);

    let usage = TestServer::json_body(server.get("/admin/usage").await).await;
    let entry = &usage[0];
    assert_eq!(entry["principal"], "alice");
    assert_eq!(entry["model"], PRICED_MODEL);
    let total: Decimal = entry["total_cost"]
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal");
    assert_eq!(total, dec!(0.0003125));

    let costs = server.state.pipeline().costs();
    let now = Utc::now();
    assert_eq!(costs.spend(&Scope::Global, BudgetPeriod::Day, now), dec!(0.0003125));
    assert_eq!(
        costs.spend(&Scope::Principal("alice".into()), BudgetPeriod::Month, now),
        dec!(0.0003125)
    );
    assert_eq!(
        costs.spend(&Scope::Model(PRICED_MODEL.into()), BudgetPeriod::Week, now),
        dec!(0.0003125)
    );

    let metrics = server.client.get(server.url("/metrics")).send().await.expect("metrics");
    let text = metrics.text().await.expect("text");
    assert!(text.contains(
        "gateway_requests_total{model=\"vertex-gemini-pro\",outcome=\"success\"} 1"
    ));
    assert!(text.contains("gateway_in_flight_requests 0"));
}

#[tokio::test]
async fn test_e2e_forwards_upstream_key() {
    let mut config = GatewayConfig::default();
    config.upstream.api_key = Some(secrecy::SecretString::new("sk-upstream".to_string()));
    let server = TestServer::start(config).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-upstream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_completion("ok", 5, 1)))
        .expect(1)
        .mount(&server.upstream)
        .await;

    let response = server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await;
    assert_status(&response, 200);
}

#[tokio::test]
async fn test_e2e_requires_master_key() {
    let server = TestServer::with_default_config().await;

    let response = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&chat_request(PRICED_MODEL, "hi"))
        .send()
        .await
        .expect("request");
    assert_status(&response, 401);

    let response = server
        .client
        .get(server.url("/admin/status"))
        .bearer_auth("sk-wrong")
        .send()
        .await
        .expect("request");
    assert_status(&response, 401);

    let response = server.client.get(server.url("/healthz")).send().await.expect("request");
    assert_status(&response, 200);
}

#[tokio::test]
async fn test_e2e_unknown_model_rejected() {
    let server = TestServer::with_default_config().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_completion("x", 1, 1)))
        .expect(0)
        .mount(&server.upstream)
        .await;

    let response = server.post_chat("alice", &chat_request("gpt-9", "hi")).await;
    assert_status(&response, 400);
}

#[tokio::test]
async fn test_e2e_upstream_error_maps_to_502() {
    let server = TestServer::with_default_config().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"message": "model crashed"}
        })))
        .mount(&server.upstream)
        .await;

    let response = server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await;
    assert_status(&response, 502);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    assert_eq!(server.state.pipeline().costs().entry_count(), 0);
}

#[tokio::test]
async fn test_e2e_upstream_timeout_maps_to_504() {
    let mut config = GatewayConfig::default();
    config.upstream.timeout = Duration::from_millis(300);
    let server = TestServer::start(config).await;
    mount_slow_completion(
        &server.upstream,
        upstream_completion("late", 10, 10),
        Duration::from_secs(2),
    )
    .await;

    let response = server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await;
    assert_status(&response, 504);
    assert_eq!(server.state.pipeline().limiter().in_flight("alice"), 0);
    assert_eq!(server.state.pipeline().costs().entry_count(), 0);
}

#[tokio::test]
async fn test_e2e_graceful_shutdown_finishes_in_flight_request() {
    let server = TestServer::with_default_config().await;
    mount_slow_completion(
        &server.upstream,
        upstream_completion("done", 10, 10),
        Duration::from_millis(400),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/v1/chat/completions");
    let in_flight = tokio::spawn(async move {
        client
            .post(url)
            .bearer_auth(TEST_KEY)
            .json(&chat_request(PRICED_MODEL, "hi"))
            .send()
            .await
            .expect("request")
            .status()
            .as_u16()
    });

    while server.state.shutdown().in_flight_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let shutdown = server.state.shutdown().clone();
    server.shutdown().await;

    assert_eq!(in_flight.await.expect("task"), 200);
    assert_eq!(shutdown.in_flight_count(), 0);
}
