//! LLM client module for invoking vision models.
//!
//! The benchmark core only depends on the [`ModelInvoker`] trait: send one
//! image + prompt + schema to a model and get raw text, token counts and
//! latency back. OpenRouter is the production implementation; [`MockInvoker`]
//! produces deterministic data for development and tests.

mod error;
mod mock;
mod openrouter;

pub use error::{classify_http_status, InvokeError, InvokeErrorKind};
pub use mock::{hash_seed, MockInvoker, SeededRng};
pub use openrouter::OpenRouterInvoker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Content part for multimodal messages (text or image).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image URL wrapper for vision content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Message content - either simple text or multimodal (text + images).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Image first, then the instruction text.
    pub fn with_image(role: Role, image_url: impl Into<String>, text: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: MessageContent::Parts(vec![
                ContentPart::image_url(image_url),
                ContentPart::text(text),
            ]),
        }
    }
}

/// One extraction call: which model, which image, what to extract.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub model_id: String,
    pub image_ref: String,
    pub prompt: String,
    pub schema: serde_json::Value,
}

/// Successful model call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Raw assistant text, expected to be JSON
    pub raw_text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: f64,
}

/// Capability to invoke a vision model. Transport is up to the implementation.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError>;
}
