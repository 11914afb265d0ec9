//! OpenAI Chat Completions client.
//!
//! Same shape as the Anthropic client: thin HTTP wrapper, pure
//! `parse_response`. The system prompt travels as the first message per the
//! Chat Completions convention.

use std::time::Duration;

use super::config::LlmTimeouts;
use super::types::{ChatMessage, ChatResponse, LlmError};

// =============================================================================
// CLIENT
// =============================================================================

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the reqwest client cannot be constructed.
    pub fn new(api_key: String, base_url: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url })
    }

    /// # Errors
    ///
    /// Returns an [`LlmError`] on transport failure, non-200 status, or an
    /// unparseable body.
    pub async fn chat(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError> {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(ChatMessage { role: "system".into(), content: system.to_owned() });
        wire_messages.extend(messages.iter().cloned());

        let body = ApiRequest { model, max_completion_tokens: max_tokens, messages: &wire_messages };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_completion_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Usage,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<ChatResponse, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let text = api
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();

    Ok(ChatResponse {
        text,
        model: api.model,
        input_tokens: api.usage.prompt_tokens,
        output_tokens: api.usage.completion_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_first_choice() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            "model": "gpt-4o",
            "usage": {"prompt_tokens": 5, "completion_tokens": 9}
        }"#;
        let response = parse_response(json).unwrap();
        assert_eq!(response.text, "hi there");
        assert_eq!(response.input_tokens, 5);
        assert_eq!(response.output_tokens, 9);
    }

    #[test]
    fn parse_tolerates_empty_choices() {
        let json = r#"{"choices": [], "model": "gpt-4o", "usage": {"prompt_tokens": 1, "completion_tokens": 0}}"#;
        let response = parse_response(json).unwrap();
        assert!(response.text.is_empty());
    }

    #[test]
    fn parse_rejects_malformed_body() {
        let err = parse_response("not json").unwrap_err();
        assert!(matches!(err, LlmError::ApiParse(_)));
    }
}
