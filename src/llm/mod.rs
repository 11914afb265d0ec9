//! LLM — multi-provider adapter for the generation workflow.
//!
//! DESIGN
//! ======
//! The `LlmClient` enum dispatches to Anthropic or `OpenAI` based on
//! `LLM_PROVIDER`, configured entirely from environment variables. The rest
//! of the crate only sees the [`LlmChat`] trait so tests can substitute a
//! scripted mock.

pub mod anthropic;
pub mod config;
pub mod openai;
pub mod types;

use config::{LlmConfig, LlmProviderKind};
pub use types::LlmChat;
use types::{ChatMessage, ChatResponse, LlmError};

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to either Anthropic or OpenAI.
///
/// Configured from environment variables by [`LlmClient::from_env`].
pub struct LlmClient {
    inner: LlmProvider,
    model: String,
}

enum LlmProvider {
    Anthropic(anthropic::AnthropicClient),
    OpenAi(openai::OpenAiClient),
}

impl LlmClient {
    /// Build an LLM client from environment variables (see
    /// [`LlmConfig::from_env`] for the variable set).
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let model = config.model.clone();
        let inner = match config.provider {
            LlmProviderKind::Anthropic => {
                LlmProvider::Anthropic(anthropic::AnthropicClient::new(config.api_key, config.timeouts)?)
            }
            LlmProviderKind::OpenAi => LlmProvider::OpenAi(openai::OpenAiClient::new(
                config.api_key,
                config.openai_base_url,
                config.timeouts,
            )?),
        };
        Ok(Self { inner, model })
    }

    /// Return the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(
        &self,
        max_tokens: u32,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError> {
        match &self.inner {
            LlmProvider::Anthropic(c) => c.chat(&self.model, max_tokens, system, messages).await,
            LlmProvider::OpenAi(c) => c.chat(&self.model, max_tokens, system, messages).await,
        }
    }
}

// =============================================================================
// TEST SUPPORT
// =============================================================================

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::types::{ChatMessage, ChatResponse, LlmError};
    use super::LlmChat;

    /// Scripted chat client. Each call pops the next queued result; calls
    /// past the end of the script return an API error. The last request's
    /// turns are kept for assertions.
    pub struct MockLlm {
        script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        pub last_request: Mutex<Option<(String, Vec<ChatMessage>)>>,
    }

    impl MockLlm {
        #[must_use]
        pub fn scripted(results: Vec<Result<ChatResponse, LlmError>>) -> Self {
            Self { script: Mutex::new(results.into()), last_request: Mutex::new(None) }
        }

        /// Script a single successful reply with the given text.
        #[must_use]
        pub fn replying(text: &str) -> Self {
            Self::scripted(vec![Ok(mock_response(text))])
        }
    }

    #[must_use]
    pub fn mock_response(text: &str) -> ChatResponse {
        ChatResponse {
            text: text.to_owned(),
            model: "mock-model".to_owned(),
            input_tokens: 10,
            output_tokens: 20,
        }
    }

    #[async_trait::async_trait]
    impl LlmChat for MockLlm {
        async fn chat(
            &self,
            _max_tokens: u32,
            system: &str,
            messages: &[ChatMessage],
        ) -> Result<ChatResponse, LlmError> {
            *self.last_request.lock().unwrap() = Some((system.to_owned(), messages.to_vec()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::ApiRequest("mock script exhausted".to_owned())))
        }
    }
}
