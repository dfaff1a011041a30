//! Provider adapters for chat and embedding models.
//!
//! Surface:
//! - `Message`/`ContentPart` content model translated per vendor by a `MessageFormatter`
//! - `ToolDeclarationBuilder` for function tools, hosted tools and JSON-schema output
//! - `ChatModel` adapters for OpenAI (chat and Responses), Anthropic and Anthropic on Bedrock
//! - `EmbeddingModel` adapters for OpenAI and Titan
//! - `Agent` loop driven by the `<thought>`/`<action>`/`<answer>` reply protocol

pub mod agent;
pub mod content;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod tools;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentEvent, AgentParseResult, ToolInvocation, parse, query,
    query_stream,
};
pub use content::{ContentPart, ContentSource, FileRef, ImageRef, Message, Role, ToolCall};
pub use embedding::{Embedding, EmbeddingInput, EmbeddingModel};
pub use error::{AgentError, ProviderError, SchemaError, ToolError};
pub use llm::{
    CallOptions, ChatModel, CompletionRequest, CompletionResult, ProviderKind, ResponseFormat,
    TokenUsage, ToolChoice,
};
pub use tools::{
    FunctionTool, HostedToolKind, ToolDescriptor, ToolExecutor, ToolOutput, ToolRegistry,
    ToolSpec, validate_schema,
};
