use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::Generator;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    model: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(model: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { model, api_key, client }
    }

    /// Reads the API key from the named environment variable.
    pub fn from_env(model: String, api_key_env: &str) -> Self {
        Self::new(model, std::env::var(api_key_env).unwrap_or_default())
    }
}

#[async_trait]
impl Generator for OpenAiProvider {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AppError::Provider("OpenAI API key not configured".to_string()));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "OpenAI API returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Provider("no choices in OpenAI response".to_string()))?;
        Ok(choice.message.content)
    }

    async fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
