use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_status, ChatError, ChatMessage, ChatOptions, ChatProvider, ChatReply, Usage};
use crate::config::ProviderSettings;

/// Any `/chat/completions` endpoint speaking the OpenAI wire format.
pub struct OpenAiCompatibleClient {
    http: Client,
    id: String,
    settings: ProviderSettings,
}

impl OpenAiCompatibleClient {
    pub fn new(http: Client, id: String, settings: ProviderSettings) -> Self {
        Self { http, id, settings }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleClient {
    async fn complete(&self, history: &[ChatMessage], options: &ChatOptions) -> Result<ChatReply, ChatError> {
        let payload = ChatRequest::build(&self.settings.model, history, options);
        let mut request = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.settings.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = check_status(request.send().await?).await?;
        let output: ChatResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Malformed(err.to_string()))?;
        let reply = output.into_reply()?;
        if reply.text.is_empty() {
            tracing::warn!(provider = %self.id, model = %self.settings.model, "empty completion content");
        }
        Ok(reply)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WebSearchOptions {}

impl<'a> ChatRequest<'a> {
    fn build(model: &'a str, history: &'a [ChatMessage], options: &ChatOptions) -> Self {
        Self {
            model,
            messages: history,
            stream: false,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            web_search_options: options.web_search.then_some(WebSearchOptions {}),
            reasoning_effort: options.extended_reasoning.then_some("high"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatResponse {
    fn into_reply(self) -> Result<ChatReply, ChatError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Malformed("response has no choices".into()))?;
        Ok(ChatReply {
            text: choice.message.content.unwrap_or_default(),
            reasoning: choice
                .message
                .reasoning_content
                .filter(|reasoning| !reasoning.trim().is_empty()),
            usage: self.usage.map(|usage| Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn request_carries_toggles_only_when_enabled() {
        let history = [ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let plain = serde_json::to_value(ChatRequest::build("m", &history, &ChatOptions::default()))
            .expect("json");
        assert_eq!(
            plain,
            json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": false
            })
        );

        let options = ChatOptions {
            web_search: true,
            extended_reasoning: true,
            ..ChatOptions::default()
        };
        let rich = serde_json::to_value(ChatRequest::build("m", &history, &options)).expect("json");
        assert_eq!(rich["web_search_options"], json!({}));
        assert_eq!(rich["reasoning_effort"], json!("high"));
    }

    #[test]
    fn response_translates_reasoning_and_usage() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "42", "reasoning_content": "counted"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let reply = serde_json::from_value::<ChatResponse>(raw)
            .expect("parse")
            .into_reply()
            .expect("reply");
        assert_eq!(
            reply,
            ChatReply {
                text: "42".into(),
                reasoning: Some("counted".into()),
                usage: Some(Usage {
                    input_tokens: 10,
                    output_tokens: 2
                }),
            }
        );
    }

    #[test]
    fn response_without_choices_is_malformed() {
        let reply = serde_json::from_value::<ChatResponse>(json!({"choices": []}))
            .expect("parse")
            .into_reply();
        assert_matches!(reply, Err(ChatError::Malformed(_)));
    }
}
