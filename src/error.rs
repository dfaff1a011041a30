use thiserror::Error;

use crate::llm::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("schema node at `{path}` must be a JSON object")]
    NodeNotObject { path: String },
    #[error("schema node at `{path}` has no type")]
    MissingType { path: String },
    #[error("schema node at `{path}` uses unsupported type `{type_name}`")]
    UnsupportedType { path: String, type_name: String },
    #[error("schema object at `{path}` must declare properties as an object")]
    InvalidProperties { path: String },
    #[error("required at `{path}` must be an array of strings")]
    InvalidRequired { path: String },
    #[error("schema object at `{path}` must list `{property}` in required")]
    PropertyNotRequired { path: String, property: String },
    #[error("schema object at `{path}` requires undeclared property `{property}`")]
    UnknownRequired { path: String, property: String },
    #[error("schema object at `{path}` must set additionalProperties to false")]
    AdditionalPropertiesAllowed { path: String },
    #[error("schema root must not use anyOf")]
    RootAnyOf,
    #[error("schema node at `{path}` combines $ref with `{keyword}`")]
    RefWithSiblings { path: String, keyword: String },
    #[error("schema nests deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("schema declares more than {max} properties")]
    TooManyProperties { max: usize },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool execution failed: {0}")]
    Execution(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid model input `{field}`: {detail}")]
    InvalidModelInput { field: String, detail: String },
    #[error("{provider} does not support {capability}")]
    UnsupportedCapability {
        provider: ProviderKind,
        capability: String,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("{provider} api error: {message}")]
    VendorApi {
        provider: ProviderKind,
        message: String,
    },
    #[error("invalid input for {provider}: {detail}")]
    InvalidInput {
        provider: ProviderKind,
        detail: String,
    },
    #[error("{provider} call timed out after {timeout_ms} ms")]
    TimedOut {
        provider: ProviderKind,
        timeout_ms: u64,
    },
    #[error("{provider} call cancelled")]
    Cancelled { provider: ProviderKind },
}

impl ProviderError {
    pub(crate) fn invalid_model_input(
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidModelInput {
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(provider: ProviderKind, capability: impl Into<String>) -> Self {
        Self::UnsupportedCapability {
            provider,
            capability: capability.into(),
        }
    }

    pub(crate) fn vendor(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::VendorApi {
            provider,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("max iterations reached ({max_iterations})")]
    MaxIterationsReached { max_iterations: u32 },
    #[error("model produced no action and no answer for {turns} consecutive turns")]
    NoProgress { turns: u32 },
    #[error("tool `{tool}` timed out after {timeout_ms} ms")]
    ToolTimedOut { tool: String, timeout_ms: u64 },
    #[error("agent run cancelled")]
    Cancelled,
    #[error("agent stream ended without final answer")]
    MissingFinalAnswer,
    #[error("agent configuration error: {0}")]
    Config(String),
}
