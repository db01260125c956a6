//! Provider-agnostic chat: one request/response contract in front of
//! several HTTP chat APIs.

mod anthropic;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;

use crate::config::{AiConfig, ProviderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub web_search: bool,
    pub extended_reasoning: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            web_search: config.web_search,
            extended_reasoning: config.extended_reasoning,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub reasoning: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no chat provider configured")]
    NoProvider,
    #[error("unknown chat provider `{0}`")]
    UnknownProvider(String),
    #[error("provider `{0}` is missing an api key")]
    MissingCredentials(String),
    #[error("conversation is empty")]
    EmptyHistory,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, history: &[ChatMessage], options: &ChatOptions) -> Result<ChatReply, ChatError>;
}

/// Registry of configured providers, in configuration order.
#[derive(Default)]
pub struct ChatClient {
    providers: IndexMap<String, Arc<dyn ChatProvider>>,
    default_provider: Option<String>,
}

impl ChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AiConfig, http: Client) -> Self {
        let mut client = Self::new();
        for (id, settings) in &config.providers {
            let provider: Arc<dyn ChatProvider> = match settings.kind {
                ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatibleClient::new(
                    http.clone(),
                    id.clone(),
                    settings.clone(),
                )),
                ProviderKind::Anthropic => {
                    Arc::new(AnthropicClient::new(http.clone(), id.clone(), settings.clone()))
                }
            };
            client.register(id.clone(), provider);
        }
        client.default_provider = config.default_provider.clone();
        client
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Falls back to the configured default, then to the first provider.
    pub async fn send(
        &self,
        history: &[ChatMessage],
        provider_id: Option<&str>,
        options: &ChatOptions,
    ) -> Result<ChatReply, ChatError> {
        if history.is_empty() {
            return Err(ChatError::EmptyHistory);
        }
        let (id, provider) = match provider_id.or(self.default_provider.as_deref()) {
            Some(id) => self
                .providers
                .get_key_value(id)
                .ok_or_else(|| ChatError::UnknownProvider(id.to_string()))?,
            None => self.providers.first().ok_or(ChatError::NoProvider)?,
        };
        tracing::debug!(provider = %id, turns = history.len(), "sending chat request");
        let reply = provider.complete(history, options).await;
        if let Err(err) = &reply {
            tracing::warn!(provider = %id, error = %err, "chat request failed");
        }
        reply
    }
}

pub(crate) async fn check_status(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        message: String,
    }
    let message = serde_json::from_str::<Envelope>(&text)
        .map(|envelope| envelope.error.message)
        .unwrap_or(text);
    Err(ChatError::Api {
        status: status.as_u16(),
        message,
    })
}
