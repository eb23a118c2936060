//! Request types for the gateway.
//!
//! The inbound body follows the OpenAI chat-completions shape; only the
//! fields the policy pipeline reads or forwards are modelled.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Chat-completion request as accepted from callers and forwarded upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Target model (must appear in the price table)
    pub model: String,

    /// Chat messages for conversation
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top-p (nucleus sampling) parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Streaming is not supported; rejected during validation
    #[serde(default)]
    pub stream: bool,

    /// Caller-supplied user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl GatewayRequest {
    /// Create a new builder for `GatewayRequest`
    #[must_use]
    pub fn builder() -> GatewayRequestBuilder {
        GatewayRequestBuilder::default()
    }

    /// Concatenated text of every message, one message per line.
    ///
    /// This is what the input guardrail inspects and what token estimates
    /// are computed from.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            let text = message.content.joined_text();
            if text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&text);
        }
        out
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// Returns a validation error naming the offending field
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::validation("model is required", Some("model")));
        }

        if self.messages.is_empty() {
            return Err(GatewayError::validation(
                "messages cannot be empty",
                Some("messages"),
            ));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(GatewayError::validation(
                    format!("temperature must be between 0.0 and 2.0, got {t}"),
                    Some("temperature"),
                ));
            }
        }

        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(GatewayError::validation(
                    format!("top_p must be between 0.0 and 1.0, got {p}"),
                    Some("top_p"),
                ));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(GatewayError::validation(
                "max_tokens must be at least 1",
                Some("max_tokens"),
            ));
        }

        if self.stream {
            return Err(GatewayError::validation(
                "streaming responses are not supported",
                Some("stream"),
            ));
        }

        Ok(())
    }
}

/// Builder for `GatewayRequest`
#[derive(Debug, Default)]
pub struct GatewayRequestBuilder {
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    stop: Option<Vec<String>>,
    user: Option<String>,
}

impl GatewayRequestBuilder {
    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set top_p
    #[must_use]
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set stop sequences
    #[must_use]
    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Set user
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns error if required fields are missing or out of range
    pub fn build(self) -> Result<GatewayRequest, GatewayError> {
        let model = self
            .model
            .ok_or_else(|| GatewayError::validation("model is required", Some("model")))?;

        let request = GatewayRequest {
            model,
            messages: self.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            stop: self.stop,
            stream: false,
            user: self.user,
        };

        request.validate()?;
        Ok(request)
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message
    pub content: MessageContent,

    /// Optional name of the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// Tool response message
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Message content (plain text or a list of parts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Multimodal content parts
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text in this content; non-text parts are skipped
    #[must_use]
    pub fn joined_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Content part for multimodal messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content part
    Text {
        /// The text content
        text: String,
    },
    /// Image content part, forwarded untouched
    ImageUrl {
        /// Opaque image descriptor
        image_url: serde_json::Value,
    },
}
