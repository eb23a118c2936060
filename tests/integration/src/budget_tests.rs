//! Budget enforcement integration tests

use crate::fixtures::*;
use crate::helpers::*;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BUDGET_MODEL: &str = "metered-model";

fn decimal(value: &serde_json::Value) -> Decimal {
    value
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal")
}

#[tokio::test]
async fn test_warning_alert_raised_once() {
    // $1 per request against a $50 daily ceiling, warning at 75%.
    let server = TestServer::start(budget_config(BUDGET_MODEL, dec!(1), dec!(50))).await;
    mount_completion(&server.upstream, upstream_completion("ok", 1000, 0)).await;
    server
        .state
        .pipeline()
        .costs()
        .record("batch-job", BUDGET_MODEL, dec!(37), Utc::now());

    let response = server.post_chat("alice", &chat_request(BUDGET_MODEL, "hi")).await;
    assert_status(&response, 200);

    let alerts = TestServer::json_body(server.get("/admin/alerts").await).await;
    let alerts = alerts.as_array().expect("array");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["scope"], "global");
    assert_eq!(alerts[0]["period"], "day");
    assert_eq!(alerts[0]["from"], "ok");
    assert_eq!(alerts[0]["to"], "warning");

    // Staying inside the warning band does not alert again.
    let response = server.post_chat("alice", &chat_request(BUDGET_MODEL, "hi")).await;
    assert_status(&response, 200);
    let alerts = TestServer::json_body(server.get("/admin/alerts").await).await;
    assert_eq!(alerts.as_array().map(Vec::len), Some(1));

    let metrics = server.client.get(server.url("/metrics")).send().await.expect("metrics");
    let text = metrics.text().await.expect("text");
    assert!(text.contains(
        "gateway_budget_alerts_total{period=\"day\",scope=\"global\",status=\"warning\"} 1"
    ));
}

#[tokio::test]
async fn test_exhausted_budget_refuses_without_upstream_call() {
    let server = TestServer::start(budget_config(BUDGET_MODEL, dec!(1), dec!(50))).await;
    mount_completion(&server.upstream, upstream_completion("ok", 1000, 0)).await;
    server
        .state
        .pipeline()
        .costs()
        .record("batch-job", BUDGET_MODEL, dec!(49), Utc::now());

    let response = server.post_chat("alice", &chat_request(BUDGET_MODEL, "hi")).await;
    assert_status(&response, 429);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"]["type"], "budget_exceeded");
    assert_eq!(server.upstream.received_requests().await.map(|r| r.len()), Some(0));
}

#[tokio::test]
async fn test_status_reports_global_spend() {
    let server = TestServer::start(budget_config(BUDGET_MODEL, dec!(1), dec!(50))).await;
    mount_completion(&server.upstream, upstream_completion("ok", 1000, 0)).await;

    let response = server.post_chat("alice", &chat_request(BUDGET_MODEL, "hi")).await;
    assert_status(&response, 200);

    let status = TestServer::json_body(server.get("/admin/status").await).await;
    let day = status["budgets"]
        .as_array()
        .and_then(|b| b.iter().find(|r| r["period"] == "day"))
        .expect("day report");
    assert_eq!(decimal(&day["spent"]), dec!(1));
    assert_eq!(decimal(&day["budget"]), dec!(50));
    assert_eq!(decimal(&day["percentage"]), dec!(2));
    assert_eq!(day["status"], "ok");
    assert_eq!(status["recent_entries"], 1);
}
