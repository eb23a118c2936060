//! Request bodies, upstream responses and configurations shared by tests

use gateway_config::{GatewayConfig, ModelConfig, PeriodCeilings};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Model present in the default price table
pub const PRICED_MODEL: &str = "vertex-gemini-pro";

/// Chat request body with one user message
pub fn chat_request(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": prompt}
        ]
    })
}

/// Upstream completion body with explicit usage
pub fn upstream_completion(text: &str, prompt_tokens: u32, completion_tokens: u32) -> Value {
    json!({
        "id": "cmpl-upstream",
        "object": "chat.completion",
        "created": 1_715_900_000,
        "model": "upstream-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

/// Mount a completion response on the upstream
pub async fn mount_completion(upstream: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(upstream)
        .await;
}

/// Mount a completion that arrives after `delay`
pub async fn mount_slow_completion(upstream: &MockServer, body: Value, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
        .mount(upstream)
        .await;
}

/// Config with a model billed at `usd_per_1k` for prompt tokens only and a
/// global daily ceiling
pub fn budget_config(model: &str, usd_per_1k: Decimal, daily_ceiling: Decimal) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config
        .models
        .push(ModelConfig::new(model, usd_per_1k, Decimal::ZERO));
    config.budgets.global = PeriodCeilings {
        daily: Some(daily_ceiling),
        weekly: None,
        monthly: None,
    };
    config
}
