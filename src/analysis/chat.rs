use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Single-turn chat completion against the classification model. The
/// pipeline only ever needs one system message plus one user message per
/// page, so the seam is kept that narrow to make fakes trivial in tests.
#[async_trait]
pub trait ChatModel: Send + Sync + 'static {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client pointed at Groq.
pub struct GroqChatModel {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GroqChatModel {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.groq_api_key.clone(),
            base_url: config.groq_base_url.trim_end_matches('/').to_string(),
            model: config.groq_model.clone(),
            temperature: config.groq_temperature,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for GroqChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to reach model endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("model endpoint returned {status}: {body}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to decode model response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("model response contained no choices"))
    }
}
