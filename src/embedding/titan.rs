use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::{Embedding, EmbeddingInput, EmbeddingModel};
use crate::error::ProviderError;
use crate::llm::ProviderKind;
use crate::llm::bedrock::invoke_endpoint;
use crate::llm::http::{build_client, send_json};

const DEFAULT_MODEL_ID: &str = "amazon.titan-embed-text-v2:0";

#[derive(Debug, Clone)]
pub struct TitanEmbeddingConfig {
    pub api_key: String,
    pub region: String,
    pub model_id: String,
    pub api_base_url: Option<String>,
    /// Ask the runtime for unit-length vectors.
    pub normalize: Option<bool>,
    pub request_timeout_ms: Option<u64>,
}

impl TitanEmbeddingConfig {
    pub fn new(api_key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            region: region.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_base_url: None,
            normalize: None,
            request_timeout_ms: Some(60_000),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }
}

/// Titan text embeddings on Bedrock. One string per call; batches are
/// rejected locally.
#[derive(Debug, Clone)]
pub struct TitanEmbeddingModel {
    client: Client,
    config: TitanEmbeddingConfig,
}

impl TitanEmbeddingModel {
    pub fn new(config: TitanEmbeddingConfig) -> Result<Self, ProviderError> {
        let client = build_client(ProviderKind::BedrockTitan, config.request_timeout_ms)?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    normalize: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TitanResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for TitanEmbeddingModel {
    fn provider(&self) -> ProviderKind {
        ProviderKind::BedrockTitan
    }

    async fn embed(
        &self,
        input: EmbeddingInput,
        dimensions: Option<u32>,
    ) -> Result<Embedding, ProviderError> {
        let text = match input {
            EmbeddingInput::Single(text) => text,
            EmbeddingInput::Batch(texts) => {
                warn!(
                    provider = %self.provider(),
                    inputs = texts.len(),
                    "rejecting batch input"
                );
                return Err(ProviderError::InvalidInput {
                    provider: self.provider(),
                    detail: format!(
                        "accepts a single string per call, got a batch of {}",
                        texts.len()
                    ),
                });
            }
        };

        debug!(
            provider = %self.provider(),
            model = %self.config.model_id,
            region = %self.config.region,
            "requesting embedding"
        );

        let endpoint = invoke_endpoint(
            self.config.api_base_url.as_deref(),
            &self.config.region,
            &self.config.model_id,
        );
        let body = TitanRequest {
            input_text: &text,
            dimensions,
            normalize: self.config.normalize,
        };
        let response = send_json::<TitanResponse>(
            self.provider(),
            self.client
                .post(endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await?;

        Ok(Embedding::Single(response.embedding))
    }
}
