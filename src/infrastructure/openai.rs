use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::domain::language_model::{ChatMessage, ChatProvider, EmbeddingProvider};

/// Client for an OpenAI-compatible HTTP API, covering the two endpoints this
/// service needs: `/embeddings` and `/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
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

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("API key cannot be empty"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Provider returned {} for {}: {}", status, url, detail));
        }

        response
            .json::<Resp>()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!(
            "Requesting {} embeddings from model '{}'",
            texts.len(),
            self.embedding_model
        );
        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbeddingsResponse = self.post_json("/embeddings", &request).await?;

        if response.data.len() != texts.len() {
            return Err(anyhow!(
                "Provider returned {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            ));
        }

        // The API is allowed to return entries out of order.
        let mut entries = response.data;
        entries.sort_by_key(|e| e.index);
        Ok(entries.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        log::debug!(
            "Requesting chat completion from model '{}' ({} messages)",
            self.chat_model,
            messages.len()
        );
        let request = ChatCompletionRequest {
            model: &self.chat_model,
            messages,
        };
        let response: ChatCompletionResponse =
            self.post_json("/chat/completions", &request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Chat completion response contained no message content"))?;
        Ok(content)
    }
}
