use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

use super::{Embedder, Generator};

/// Local Ollama chat provider.
pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaProvider {
    pub fn new(model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { model, base_url, client }
    }
}

#[async_trait]
impl Generator for OllamaProvider {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: ChatOptions {
                num_predict: max_tokens,
                temperature: 0.3,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "ollama API returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(chat.message.content)
    }

    /// Checks that Ollama is running and the model is pulled.
    async fn is_configured(&self) -> bool {
        let check = async {
            let response = self
                .client
                .get(format!("{}/api/tags", self.base_url))
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .ok()?;
            if !response.status().is_success() {
                return None;
            }
            response.json::<TagsResponse>().await.ok()
        };

        let Some(tags) = check.await else {
            return false;
        };

        let model_base = self.model.split(':').next().unwrap_or(&self.model);
        if tags.models.iter().any(|m| m.name.contains(model_base)) {
            return true;
        }
        debug!("Ollama model {:?} not found", self.model);
        false
    }
}

/// Embedding provider backed by the Ollama embed endpoint.
pub struct OllamaEmbedder {
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f64>>,
}

impl OllamaEmbedder {
    pub fn new(model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { model, base_url, client }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "ollama embed returned {}: {}",
                status, body
            )));
        }

        let embed: EmbedResponse = response.json().await?;
        Ok(embed.embeddings)
    }
}
