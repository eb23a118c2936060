//! Response types for the gateway.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What the pipeline needs back from an inference provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Prompt tokens billed by the provider
    pub input_tokens: u32,
    /// Completion tokens billed by the provider
    pub output_tokens: u32,
    /// Finish reason as reported upstream
    pub finish_reason: Option<String>,
}

impl Completion {
    /// Create a completion with token counts
    pub fn new(text: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            text: text.into(),
            input_tokens,
            output_tokens,
            finish_reason: None,
        }
    }

    /// Set the finish reason
    #[must_use]
    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }
}

/// OpenAI-shaped chat completion body returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response identifier
    pub id: String,
    /// Object type, always `chat.completion`
    pub object: String,
    /// Unix timestamp
    pub created: i64,
    /// Model that produced the completion
    pub model: String,
    /// Generated choices
    pub choices: Vec<Choice>,
    /// Token usage
    pub usage: Usage,
}

impl ChatCompletionResponse {
    /// Wrap a completion for the given request id and model
    #[must_use]
    pub fn from_completion(request_id: &str, model: &str, completion: &Completion) -> Self {
        Self {
            id: format!("chatcmpl-{request_id}"),
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: completion.text.clone(),
                },
                finish_reason: completion
                    .finish_reason
                    .clone()
                    .or_else(|| Some("stop".to_string())),
            }],
            usage: Usage::new(completion.input_tokens, completion.output_tokens),
        }
    }
}

/// A single generated choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// Generated message
    pub message: AssistantMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message inside a choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Role, always `assistant` for generated output
    pub role: String,
    /// Generated text
    #[serde(default)]
    pub content: String,
}

/// Token usage block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Build a usage block, computing the total
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}
