use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{Embedding, EmbeddingInput, EmbeddingModel};
use crate::error::ProviderError;
use crate::llm::ProviderKind;
use crate::llm::http::{build_client, send_json};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl OpenAiEmbeddingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_base_url: None,
            request_timeout_ms: Some(60_000),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }

    fn endpoint(&self) -> String {
        let base = self
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/embeddings")
    }
}

/// Embeddings endpoint that accepts a string or an array of strings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingModel {
    client: Client,
    config: OpenAiEmbeddingConfig,
}

impl OpenAiEmbeddingModel {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, ProviderError> {
        let client = build_client(ProviderKind::OpenAiEmbeddings, config.request_timeout_ms)?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum InputPayload<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: InputPayload<'a>,
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiEmbeddings
    }

    async fn embed(
        &self,
        input: EmbeddingInput,
        dimensions: Option<u32>,
    ) -> Result<Embedding, ProviderError> {
        let (payload, expected) = match &input {
            EmbeddingInput::Single(text) => (InputPayload::Single(text), 1),
            EmbeddingInput::Batch(texts) if texts.is_empty() => {
                return Ok(Embedding::Batch(Vec::new()));
            }
            EmbeddingInput::Batch(texts) => (InputPayload::Batch(texts), texts.len()),
        };

        debug!(
            provider = %self.provider(),
            model = %self.config.model,
            inputs = expected,
            "requesting embeddings"
        );

        let body = EmbeddingRequest {
            model: &self.config.model,
            input: payload,
            encoding_format: "float",
            dimensions,
        };
        let response = send_json::<EmbeddingResponse>(
            self.provider(),
            self.client
                .post(self.config.endpoint())
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await?;

        let mut data = response.data;
        if data.len() != expected {
            return Err(ProviderError::vendor(
                self.provider(),
                format!("returned {} embeddings for {expected} inputs", data.len()),
            ));
        }
        data.sort_by_key(|datum| datum.index);
        let mut vectors = data.into_iter().map(|datum| datum.embedding);

        match input {
            EmbeddingInput::Single(_) => Ok(Embedding::Single(vectors.next().unwrap_or_default())),
            EmbeddingInput::Batch(_) => Ok(Embedding::Batch(vectors.collect())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn model_for(server: &MockServer) -> OpenAiEmbeddingModel {
        OpenAiEmbeddingModel::new(OpenAiEmbeddingConfig::new("key").with_api_base_url(server.uri()))
            .expect("model")
    }

    #[tokio::test]
    async fn single_input_yields_single_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_json(json!({
                "model": DEFAULT_MODEL,
                "input": "a",
                "encoding_format": "float",
                "dimensions": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedding = model_for(&server)
            .await
            .embed("a".into(), Some(2))
            .await
            .expect("embeds");
        assert_eq!(embedding, Embedding::Single(vec![0.1, 0.2]));
    }

    #[tokio::test]
    async fn batch_matches_scalar_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"model": DEFAULT_MODEL, "input": ["a", "b"], "encoding_format": "float"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [2.0], "index": 1},
                    {"embedding": [1.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!({"model": DEFAULT_MODEL, "input": "a", "encoding_format": "float"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [1.0], "index": 0}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!({"model": DEFAULT_MODEL, "input": "b", "encoding_format": "float"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [2.0], "index": 0}]
            })))
            .mount(&server)
            .await;

        let model = model_for(&server).await;
        let batch = model
            .embed(["a", "b"].into(), None)
            .await
            .expect("embeds")
            .into_vectors();
        let a = model.embed("a".into(), None).await.expect("embeds");
        let b = model.embed("b".into(), None).await.expect("embeds");

        assert_eq!(batch.len(), 2);
        assert_eq!(Some(batch[0].as_slice()), a.as_single());
        assert_eq!(Some(batch[1].as_slice()), b.as_single());
    }

    #[tokio::test]
    async fn count_mismatch_is_a_vendor_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = model_for(&server)
            .await
            .embed("a".into(), None)
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::VendorApi { .. }));
    }

    #[tokio::test]
    async fn empty_batch_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let embedding = model_for(&server)
            .await
            .embed(EmbeddingInput::Batch(Vec::new()), None)
            .await
            .expect("embeds");
        assert_eq!(embedding, Embedding::Batch(Vec::new()));
    }
}
