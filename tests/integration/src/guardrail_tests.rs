//! Content guardrail integration tests

use crate::fixtures::*;
use crate::helpers::*;
use chrono::Utc;
use gateway_core::{BudgetPeriod, Scope};
use rust_decimal::Decimal;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_toxic_prompt_blocked_before_upstream() {
    let server = TestServer::with_default_config().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_completion("x", 1, 1)))
        .expect(0)
        .mount(&server.upstream)
        .await;

    let response = server
        .post_chat("alice", &chat_request(PRICED_MODEL, "you are a toxic idiot"))
        .await;
    assert_status(&response, 400);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"]["type"], "policy_violation");

    let pipeline = server.state.pipeline();
    assert_eq!(
        pipeline.costs().spend(&Scope::Global, BudgetPeriod::Day, Utc::now()),
        Decimal::ZERO
    );
    assert_eq!(pipeline.limiter().in_flight("alice"), 0);

    let metrics = server.client.get(server.url("/metrics")).send().await.expect("metrics");
    let text = metrics.text().await.expect("text");
    assert!(text.contains("gateway_guardrail_blocks_total{category=\"toxic\",stage=\"input\"} 1"));
}

#[tokio::test]
async fn test_pii_prompt_blocked() {
    let server = TestServer::with_default_config().await;

    let response = server
        .post_chat("alice", &chat_request(PRICED_MODEL, "my ssn is 123-45-6789"))
        .await;
    assert_status(&response, 400);
}

#[tokio::test]
async fn test_secret_in_completion_withheld_but_charged() {
    let server = TestServer::with_default_config().await;
    let leaked = format!("Here you go: AKIA{}", "Q".repeat(16));
    mount_completion(&server.upstream, upstream_completion(&leaked, 1000, 500)).await;

    let response = server
        .post_chat("alice", &chat_request(PRICED_MODEL, "print the deploy key"))
        .await;
    assert_status(&response, 400);
    let text = response.text().await.expect("text");
    assert!(!text.contains("AKIA"));

    assert_eq!(server.state.pipeline().costs().entry_count(), 1);
}

#[tokio::test]
async fn test_disallowed_content_type_blocked() {
    let server = TestServer::with_default_config().await;

    let response = server
        .client
        .post(server.url("/v1/chat/completions"))
        .bearer_auth(TEST_KEY)
        .header("content-type", "text/html")
        .body(chat_request(PRICED_MODEL, "hi").to_string())
        .send()
        .await
        .expect("request");
    assert_status(&response, 400);
}
