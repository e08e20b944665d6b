//! Ollama HTTP client for embeddings and chat.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sqlrag_core::{Embedder, ModelConfig, Result, SqlRagError, TextGenerator};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Client for an Ollama model server.
///
/// One instance serves both the embedding model and the chat model.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
}

impl OllamaClient {
    /// Build a client from model configuration.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SqlRagError::config(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Model server {} (embedding={}, chat={})",
            config.base_url, config.embedding_model, config.chat_model
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    /// Server base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response = self
            .client
            .post(self.endpoint("embeddings"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SqlRagError::embedding(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SqlRagError::embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SqlRagError::embedding(format!("Failed to parse embedding response: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(SqlRagError::embedding("Model returned an empty embedding"));
        }

        debug!("Embedded {} chars into {} dims", text.len(), parsed.embedding.len());
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn model(&self) -> &str {
        &self.chat_model
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint("chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SqlRagError::generation(format!("Chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SqlRagError::generation(format!(
                "Chat API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SqlRagError::generation(format!("Failed to parse chat response: {}", e)))?;

        debug!("Chat response: {} chars", parsed.message.content.len());
        Ok(parsed.message.content)
    }
}
