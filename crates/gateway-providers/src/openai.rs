//! OpenAI-compatible upstream client.
//!
//! Works against any server that implements `POST {base}/chat/completions`
//! (OpenAI, vLLM, LiteLLM, Ollama's compatibility endpoint).

use async_trait::async_trait;
use gateway_config::UpstreamConfig;
use gateway_core::{
    estimate_tokens, ChatMessage, Completion, GatewayError, GatewayRequest, GatewayResult,
    InferenceProvider,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Provider ID used in logs
    pub id: String,
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token, if the upstream needs one
    pub api_key: Option<SecretString>,
    /// Request timeout
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            id: "upstream".to_string(),
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the provider ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl From<&UpstreamConfig> for OpenAiConfig {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            id: "upstream".to_string(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(config: OpenAiConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Endpoint requests are sent to
    #[must_use]
    pub fn completions_url(&self) -> String {
        self.config.completions_url()
    }

    fn map_send_error(&self, err: &reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout {
                timeout: self.config.timeout,
            }
        } else {
            GatewayError::upstream(format!("Request failed: {err}"), None)
        }
    }

    fn map_status(status: u16, body: &str) -> GatewayError {
        let message = serde_json::from_str::<UpstreamErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        GatewayError::upstream(format!("Upstream returned {status}: {message}"), Some(status))
    }

    fn into_completion(request: &GatewayRequest, response: UpstreamResponse) -> Completion {
        let (text, finish_reason) = response
            .choices
            .into_iter()
            .next()
            .map(|c| (c.message.content.unwrap_or_default(), c.finish_reason))
            .unwrap_or_default();

        let (input_tokens, output_tokens) = match response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => {
                debug!("Upstream omitted usage, estimating tokens");
                (
                    estimate_tokens(&request.prompt_text()),
                    estimate_tokens(&text),
                )
            }
        };

        let completion = Completion::new(text, input_tokens, output_tokens);
        match finish_reason {
            Some(reason) => completion.with_finish_reason(reason),
            None => completion,
        }
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn complete(&self, request: &GatewayRequest) -> GatewayResult<Completion> {
        let url = self.config.completions_url();
        let body = UpstreamRequest::from(request);

        debug!(provider = %self.config.id, url = %url, model = %request.model, "Sending request upstream");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.config.id, status = %status, "Upstream error response");
            return Err(Self::map_status(status.as_u16(), &body));
        }

        let parsed: UpstreamResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_send_error(&e)
            } else {
                GatewayError::upstream(format!("Failed to parse response: {e}"), Some(status.as_u16()))
            }
        })?;

        Ok(Self::into_completion(request, parsed))
    }
}

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    stream: bool,
}

impl<'a> From<&'a GatewayRequest> for UpstreamRequest<'a> {
    fn from(request: &'a GatewayRequest) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop.as_deref(),
            user: request.user.as_deref(),
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
    #[serde(default)]
    usage: Option<UpstreamUsage>,
}

#[derive(Debug, Deserialize)]
struct UpstreamChoice {
    message: UpstreamMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorResponse {
    error: UpstreamErrorBody,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    message: String,
}
