//! Chat completion client.
//!
//! [`Completer`] is the seam between the conversation logic and the model
//! API. The only backend is [`OpenAiCompleter`], which speaks the OpenAI chat
//! completions protocol (`POST {url}/chat/completions`) and therefore also
//! works against compatible gateways via `llm.url`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::retry::post_json_with_retry;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Send `messages` and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompleter {
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    base_url: String,
    client: Client,
}

impl OpenAiCompleter {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build OpenAI HTTP client")?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        let body = serde_json::to_value(ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
        })?;

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.base_url),
            headers,
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_answer(json)
    }
}

fn parse_answer(json: serde_json::Value) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_value(json).context("failed to parse OpenAI response")?;
    let Some(choice) = parsed.choices.into_iter().next() else {
        bail!("OpenAI response contained no choices");
    };
    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

/// Create the [`Completer`] named by `llm.provider`.
pub fn create_completer(config: &LlmConfig) -> Result<Box<dyn Completer>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiCompleter::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_openai_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let value = serde_json::to_value(ChatRequest {
            model: "gpt-3.5-turbo",
            temperature: 0.5,
            max_tokens: 1000,
            messages: &messages,
        })
        .unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
    }

    #[test]
    fn parses_first_choice() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  Use pip.\n" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        });
        assert_eq!(parse_answer(json).unwrap(), "Use pip.");
    }

    #[test]
    fn empty_choices_is_error() {
        let err = parse_answer(serde_json::json!({ "choices": [] })).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "oracle".to_string(),
            ..LlmConfig::default()
        };
        let err = create_completer(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown llm provider"));
    }
}
