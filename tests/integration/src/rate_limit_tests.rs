//! Rate limiting integration tests

use crate::fixtures::*;
use crate::helpers::*;
use gateway_config::GatewayConfig;
use std::time::Duration;

fn hourly_limit(limit: u64) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.rate_limits.per_principal.requests_per_hour = Some(limit);
    config
}

#[tokio::test]
async fn test_third_request_rejected_with_retry_after() {
    let server = TestServer::start(hourly_limit(2)).await;
    mount_completion(&server.upstream, upstream_completion("ok", 10, 5)).await;

    for _ in 0..2 {
        let response = server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await;
        assert_status(&response, 200);
    }

    let response = server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await;
    assert_status(&response, 429);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .expect("header")
        .parse()
        .expect("seconds");
    assert!((1..=3600).contains(&retry_after));

    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"]["type"], "rate_limit_exceeded");
    assert_eq!(server.upstream.received_requests().await.map(|r| r.len()), Some(2));
}

#[tokio::test]
async fn test_limits_are_per_principal() {
    let server = TestServer::start(hourly_limit(1)).await;
    mount_completion(&server.upstream, upstream_completion("ok", 10, 5)).await;

    assert_status(
        &server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await,
        200,
    );
    assert_status(
        &server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await,
        429,
    );
    assert_status(
        &server.post_chat("bob", &chat_request(PRICED_MODEL, "hi")).await,
        200,
    );
}

#[tokio::test]
async fn test_concurrency_limit_rejects_overlapping_request() {
    let mut config = GatewayConfig::default();
    config.rate_limits.per_principal.max_concurrent = Some(1);
    let server = TestServer::start(config).await;
    mount_slow_completion(
        &server.upstream,
        upstream_completion("slow", 10, 5),
        Duration::from_millis(500),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/v1/chat/completions");
    let first = tokio::spawn(async move {
        client
            .post(url)
            .bearer_auth(TEST_KEY)
            .header("x-user-id", "alice")
            .json(&chat_request(PRICED_MODEL, "hi"))
            .send()
            .await
            .expect("request")
            .status()
            .as_u16()
    });

    while server.state.pipeline().limiter().in_flight("alice") == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let second = server.post_chat("alice", &chat_request(PRICED_MODEL, "hi")).await;
    assert_status(&second, 429);

    assert_eq!(first.await.expect("task"), 200);
    assert_eq!(server.state.pipeline().limiter().in_flight("alice"), 0);
}
