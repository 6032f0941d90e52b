
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{Embedding, EmbeddingProvider};
use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::{AnnError, Result};

/// Blocking HTTP client for the OpenAI and Azure OpenAI embedding endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    endpoint: Url,
    provider: EmbeddingProviderKind,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    model: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i32,
    #[serde(default)]
    total_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AnnError::Config(format!("invalid embedding url {}: {}", config.base_url, e)))?;

        let endpoint = match config.provider {
            EmbeddingProviderKind::OpenAi => base_url.join("/v1/embeddings"),
            EmbeddingProviderKind::Azure => base_url.join(&format!(
                "/openai/deployments/{}/embeddings",
                config.azure_deployment
            )),
        };
        let mut endpoint =
            endpoint.map_err(|e| AnnError::Config(format!("invalid embedding endpoint: {}", e)))?;

        if config.provider == EmbeddingProviderKind::Azure {
            endpoint
                .query_pairs_mut()
                .append_pair("api-version", &config.azure_api_version);
        }

        Ok(Self {
            endpoint,
            provider: config.provider,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            agent: agent(Duration::from_secs(config.timeout_secs)),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent(timeout);
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Request one embedding, blocking the calling thread
    #[inline]
    pub fn embed_blocking(&self, text: &str) -> Result<Embedding> {
        debug!("Requesting embedding for text (length: {})", text.len());

        let body = serde_json::to_string(&EmbedRequest {
            input: text,
            model: &self.model,
        })
        .map_err(|e| AnnError::Provider(format!("failed to encode request: {}", e)))?;

        let request = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json");
        let request = match self.provider {
            EmbeddingProviderKind::OpenAi => {
                request.header("Authorization", &format!("Bearer {}", self.api_key))
            }
            EmbeddingProviderKind::Azure => request.header("api-key", &self.api_key),
        };

        let mut response = request
            .send(&body)
            .map_err(|e| AnnError::Provider(format!("embedding request failed: {}", e)))?;
        let status = response.status();
        let payload = response
            .body_mut()
            .read_to_string()
            .map_err(|e| AnnError::Provider(format!("failed to read embedding response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&payload)
                .map(|e| e.error.message)
                .unwrap_or(payload);
            warn!("Embedding provider returned HTTP {}: {}", status.as_u16(), message);
            return Err(AnnError::Provider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&payload)
            .map_err(|e| AnnError::Provider(format!("failed to parse embedding response: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| AnnError::Provider("response contained no embedding".to_string()))?;

        debug!("Received embedding with {} dimensions", vector.len());

        Ok(Embedding {
            vector,
            model: parsed.model,
            prompt_tokens: parsed.usage.prompt_tokens,
            total_tokens: parsed.usage.total_tokens,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let client = self.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || client.embed_blocking(&text))
            .await
            .map_err(|e| AnnError::Provider(format!("embedding task failed: {}", e)))?
    }
}
