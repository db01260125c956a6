use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, ChatError, ChatMessage, ChatOptions, ChatProvider, ChatReply, Role, Usage};
use crate::config::ProviderSettings;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const THINKING_BUDGET: u32 = 2048;
const WEB_SEARCH_MAX_USES: u32 = 5;

/// Anthropic messages API.
pub struct AnthropicClient {
    http: Client,
    id: String,
    settings: ProviderSettings,
}

impl AnthropicClient {
    pub fn new(http: Client, id: String, settings: ProviderSettings) -> Self {
        Self { http, id, settings }
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    async fn complete(&self, history: &[ChatMessage], options: &ChatOptions) -> Result<ChatReply, ChatError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ChatError::MissingCredentials(self.id.clone()))?;
        let endpoint = format!("{}/messages", self.settings.base_url.trim_end_matches('/'));
        let payload = MessagesRequest::build(&self.settings.model, history, options);

        let response = self
            .http
            .post(endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await?;
        let output: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| ChatError::Malformed(err.to_string()))?;
        Ok(output.into_reply())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Turn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

impl<'a> MessagesRequest<'a> {
    /// System turns move into the top-level `system` field.
    fn build(model: &'a str, history: &'a [ChatMessage], options: &ChatOptions) -> Self {
        let system: Vec<&str> = history
            .iter()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .collect();
        let messages = history
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| Turn {
                role: message.role,
                content: &message.content,
            })
            .collect();

        let thinking = options.extended_reasoning.then_some(Thinking {
            kind: "enabled",
            budget_tokens: THINKING_BUDGET,
        });
        let floor = if thinking.is_some() {
            THINKING_BUDGET * 2
        } else {
            1
        };
        let tools = if options.web_search {
            vec![Tool {
                kind: "web_search_20250305",
                name: "web_search",
                max_uses: WEB_SEARCH_MAX_USES,
            }]
        } else {
            Vec::new()
        };

        Self {
            model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).max(floor),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            // Temperature is fixed while thinking is enabled.
            temperature: options.temperature.filter(|_| thinking.is_none()),
            thinking,
            tools,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesResponse {
    fn into_reply(self) -> ChatReply {
        let mut text = Vec::new();
        let mut reasoning = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text: part } => text.push(part),
                ContentBlock::Thinking { thinking } => reasoning.push(thinking),
                ContentBlock::Other => {}
            }
        }
        ChatReply {
            text: text.concat(),
            reasoning: (!reasoning.is_empty()).then(|| reasoning.join("\n\n")),
            usage: self.usage.map(|usage| Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_turns_are_lifted_and_thinking_raises_token_floor() {
        let history = [
            ChatMessage::system("You help with medical notes."),
            ChatMessage::user("Summarize"),
            ChatMessage::assistant("Sure"),
        ];
        let options = ChatOptions {
            extended_reasoning: true,
            web_search: true,
            temperature: Some(0.2),
            max_tokens: Some(1000),
        };
        let value = serde_json::to_value(MessagesRequest::build("claude", &history, &options)).expect("json");
        assert_eq!(
            value,
            json!({
                "model": "claude",
                "max_tokens": 4096,
                "system": "You help with medical notes.",
                "messages": [
                    {"role": "user", "content": "Summarize"},
                    {"role": "assistant", "content": "Sure"}
                ],
                "thinking": {"type": "enabled", "budget_tokens": 2048},
                "tools": [{"type": "web_search_20250305", "name": "web_search", "max_uses": 5}]
            })
        );
    }

    #[test]
    fn blocks_split_into_text_and_reasoning() {
        let raw = json!({
            "content": [
                {"type": "thinking", "thinking": "step one", "signature": "sig"},
                {"type": "server_tool_use", "id": "t1", "name": "web_search", "input": {}},
                {"type": "text", "text": "Beta blockers "},
                {"type": "text", "text": "slow the heart."}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 8}
        });
        let reply = serde_json::from_value::<MessagesResponse>(raw)
            .expect("parse")
            .into_reply();
        assert_eq!(reply.text, "Beta blockers slow the heart.");
        assert_eq!(reply.reasoning.as_deref(), Some("step one"));
        assert_eq!(reply.usage, Some(Usage { input_tokens: 20, output_tokens: 8 }));
    }

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let client = AnthropicClient::new(
            Client::new(),
            "claude".into(),
            ProviderSettings {
                kind: crate::config::ProviderKind::Anthropic,
                base_url: "https://api.anthropic.com/v1".into(),
                model: "claude".into(),
                api_key: None,
            },
        );
        let err = client
            .complete(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .expect_err("no key");
        assert!(matches!(err, ChatError::MissingCredentials(id) if id == "claude"));
    }
}
