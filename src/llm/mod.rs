mod anthropic;
pub(crate) mod bedrock;
mod declare;
mod format;
pub(crate) mod http;
mod openai;
mod openai_responses;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::content::{Message, ToolCall};
use crate::error::ProviderError;
use crate::tools::ToolDescriptor;

pub use anthropic::{AnthropicFormatter, AnthropicModel, AnthropicModelConfig, AnthropicTools};
pub use bedrock::{BedrockAnthropicConfig, BedrockAnthropicModel, BedrockAnthropicTools};
pub use declare::{JSON_RESPONSE_TOOL_NAME, ToolDeclarationBuilder};
pub use format::{MessageFormatter, SystemPlacement, WireMessages};
pub use openai::{OpenAiChatFormatter, OpenAiChatModel, OpenAiChatTools, OpenAiModelConfig};
pub use openai_responses::{OpenAiResponsesFormatter, OpenAiResponsesModel, OpenAiResponsesTools};

/// Identifies the wire API an adapter speaks. Used in errors and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAiChat,
    OpenAiResponses,
    OpenAiEmbeddings,
    Anthropic,
    BedrockAnthropic,
    BedrockTitan,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiChat => "openai-chat",
            ProviderKind::OpenAiResponses => "openai-responses",
            ProviderKind::OpenAiEmbeddings => "openai-embeddings",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::BedrockAnthropic => "bedrock-anthropic",
            ProviderKind::BedrockTitan => "bedrock-titan",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json {
        name: String,
        schema: Value,
    },
}

impl ResponseFormat {
    pub fn json(schema: Value) -> Self {
        Self::Json {
            name: "response".to_string(),
            schema,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    Required,
    None,
    Tool(String),
}

#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub response_format: ResponseFormat,
    pub system_prompt: Option<String>,
    pub tool_choice: ToolChoice,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tool(mut self, tool: ToolDescriptor) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_response_format(mut self, response_format: ResponseFormat) -> Self {
        self.response_format = response_format;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt.saturating_add(completion),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionResult {
    pub raw_text: String,
    pub token_usage: TokenUsage,
    pub tool_calls: Vec<ToolCall>,
    pub thinking: Option<String>,
}

/// Per-call deadline and cancellation signal.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

impl Interrupted {
    pub(crate) fn into_provider_error(self, provider: ProviderKind) -> ProviderError {
        match self {
            Interrupted::TimedOut(after) => ProviderError::TimedOut {
                provider,
                timeout_ms: after.as_millis() as u64,
            },
            Interrupted::Cancelled => ProviderError::Cancelled { provider },
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub(crate) async fn run<F>(&self, future: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, future)
                    .await
                    .map_err(|_| Interrupted::TimedOut(limit)),
                None => Ok(future.await),
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Interrupted::Cancelled),
            output = bounded => output,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> ProviderKind;

    async fn invoke(&self, request: &CompletionRequest) -> Result<CompletionResult, ProviderError>;

    async fn invoke_with(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<CompletionResult, ProviderError> {
        match options.run(self.invoke(request)).await {
            Ok(result) => result,
            Err(interrupted) => Err(interrupted.into_provider_error(self.provider())),
        }
    }
}
