mod openai;
mod titan;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::llm::{CallOptions, ProviderKind};

pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingModel};
pub use titan::{TitanEmbeddingConfig, TitanEmbeddingModel};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl From<&str> for EmbeddingInput {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for EmbeddingInput {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for EmbeddingInput {
    fn from(value: Vec<String>) -> Self {
        Self::Batch(value)
    }
}

impl From<&[&str]> for EmbeddingInput {
    fn from(value: &[&str]) -> Self {
        Self::Batch(value.iter().map(|text| text.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EmbeddingInput {
    fn from(value: [&str; N]) -> Self {
        Self::Batch(value.iter().map(|text| text.to_string()).collect())
    }
}

/// One vector for a single input, one per input (same order) for a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Embedding {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

impl Embedding {
    pub fn as_single(&self) -> Option<&[f32]> {
        match self {
            Embedding::Single(vector) => Some(vector),
            Embedding::Batch(_) => None,
        }
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Embedding::Single(vector) => vec![vector],
            Embedding::Batch(vectors) => vectors,
        }
    }
}

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// `dimensions` is forwarded only when set; vector length is not checked.
    async fn embed(
        &self,
        input: EmbeddingInput,
        dimensions: Option<u32>,
    ) -> Result<Embedding, ProviderError>;

    async fn embed_with(
        &self,
        input: EmbeddingInput,
        dimensions: Option<u32>,
        options: &CallOptions,
    ) -> Result<Embedding, ProviderError> {
        match options.run(self.embed(input, dimensions)).await {
            Ok(result) => result,
            Err(interrupted) => Err(interrupted.into_provider_error(self.provider())),
        }
    }
}
