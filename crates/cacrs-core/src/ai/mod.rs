//! Generative AI seam.
//!
//! Every model call in the crate goes through [`GenerativeAi`]. The Gemini
//! client talks to the Generative Language REST API; the offline provider
//! answers deterministically so local setups and tests never need a key.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::{AiConfig, AiProviderKind};
use crate::error::Result;
use crate::models::{GroundingSource, Message, MessageRole};

pub mod gemini;
pub mod offline;

pub use gemini::GeminiClient;
pub use offline::OfflineAi;

/// Incremental text chunks of a streamed answer, in arrival order.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Speaker of a prior chat turn, in the provider's vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

impl From<MessageRole> for TurnRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => TurnRole::User,
            MessageRole::Assistant => TurnRole::Model,
        }
    }
}

/// One prior turn handed to the model as history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            text: message.content.clone(),
        }
    }
}

/// Base64 image payload sent inline with a prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub data_base64: String,
    pub mime_type: String,
}

/// Answer of a grounded web search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebSearchResult {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

/// Sampling parameters applied to generation requests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AiTuning {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// Opaque generative capability: submit a prompt and context, receive text
/// or a token stream.
#[async_trait]
pub trait GenerativeAi: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Single non-streamed completion.
    async fn complete_text(&self, prompt: &str) -> Result<String>;

    /// Stream an answer to `message` given the prior `history` and a system
    /// instruction. `history` must not contain `message` itself.
    async fn stream_chat(
        &self,
        history: &[ChatTurn],
        message: &str,
        system_instruction: &str,
    ) -> Result<TextStream>;

    /// Describe an image according to `prompt`.
    async fn analyze_image(&self, image: &InlineImage, prompt: &str) -> Result<String>;

    /// Answer a query with web grounding.
    async fn web_search(&self, query: &str) -> Result<WebSearchResult>;
}

/// Build the provider selected by the configuration.
///
/// A Gemini provider without an API key falls back to the offline provider.
pub fn from_config(
    config: &AiConfig,
    tuning: watch::Receiver<AiTuning>,
) -> Result<Arc<dyn GenerativeAi>> {
    match config.provider {
        AiProviderKind::Offline => Ok(Arc::new(OfflineAi::new())),
        AiProviderKind::Gemini => match config.api_key() {
            Some(api_key) => Ok(Arc::new(
                GeminiClient::new(config, api_key)?.with_tuning(tuning),
            )),
            None => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "Gemini API key not set, using offline provider"
                );
                Ok(Arc::new(OfflineAi::new()))
            }
        },
    }
}
