use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::anthropic::{
    AnthropicFormatter, AnthropicTools, MessagesResponse, Sampling, build_body, normalize_response,
};
use crate::llm::http::{build_client, send_json};
use crate::llm::{
    ChatModel, CompletionRequest, CompletionResult, ProviderKind, ToolDeclarationBuilder,
};
use crate::tools::HostedToolKind;

const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// `https://bedrock-runtime.{region}.amazonaws.com/model/{model_id}/invoke`,
/// or the same path under an override base.
pub(crate) fn invoke_endpoint(api_base_url: Option<&str>, region: &str, model_id: &str) -> String {
    let base = match api_base_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => format!("https://bedrock-runtime.{region}.amazonaws.com"),
    };
    format!("{base}/model/{model_id}/invoke")
}

#[derive(Debug, Clone)]
/// Runtime configuration for [`BedrockAnthropicModel`].
pub struct BedrockAnthropicConfig {
    /// Bedrock API key, sent as a bearer token.
    pub api_key: String,
    /// AWS region of the runtime endpoint.
    pub region: String,
    /// Bedrock model id (for example `anthropic.claude-3-5-sonnet-20240620-v1:0`).
    pub model_id: String,
    /// Optional endpoint override (VPC endpoints, tests).
    pub api_base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub thinking_budget_tokens: Option<u32>,
    pub request_timeout_ms: Option<u64>,
}

impl BedrockAnthropicConfig {
    pub fn new(
        api_key: impl Into<String>,
        region: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            region: region.into(),
            model_id: model_id.into(),
            api_base_url: None,
            max_tokens: 4096,
            temperature: None,
            top_p: None,
            thinking_budget_tokens: None,
            request_timeout_ms: Some(600_000),
        }
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }
}

/// Tool declarations for the hosted runtime: function tools only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockAnthropicTools;

impl ToolDeclarationBuilder for BedrockAnthropicTools {
    fn provider(&self) -> ProviderKind {
        ProviderKind::BedrockAnthropic
    }

    fn supports_structured_output(&self) -> bool {
        false
    }

    fn function_declaration(&self, name: &str, description: &str, parameters: &Value) -> Value {
        AnthropicTools.function_declaration(name, description, parameters)
    }

    fn hosted_tool(&self, kind: HostedToolKind) -> Result<Value, ProviderError> {
        Err(ProviderError::unsupported(
            self.provider(),
            format!("provider-managed tool `{kind}`"),
        ))
    }
}

#[derive(Debug, Clone)]
/// Anthropic models served through the Bedrock runtime.
pub struct BedrockAnthropicModel {
    client: Client,
    config: BedrockAnthropicConfig,
    formatter: AnthropicFormatter,
    tools: BedrockAnthropicTools,
}

impl BedrockAnthropicModel {
    pub fn new(config: BedrockAnthropicConfig) -> Result<Self, ProviderError> {
        let client = build_client(ProviderKind::BedrockAnthropic, config.request_timeout_ms)?;
        Ok(Self {
            client,
            config,
            formatter: AnthropicFormatter::bedrock(),
            tools: BedrockAnthropicTools,
        })
    }

    fn sampling(&self) -> Sampling {
        Sampling {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            thinking_budget_tokens: self.config.thinking_budget_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for BedrockAnthropicModel {
    fn provider(&self) -> ProviderKind {
        ProviderKind::BedrockAnthropic
    }

    async fn invoke(&self, request: &CompletionRequest) -> Result<CompletionResult, ProviderError> {
        let mut body = build_body(request, &self.formatter, &self.tools, self.sampling())?;
        body.anthropic_version = Some(BEDROCK_ANTHROPIC_VERSION.to_string());

        debug!(
            provider = %self.provider(),
            model = %self.config.model_id,
            region = %self.config.region,
            messages = body.messages.len(),
            "invoking hosted model"
        );

        let endpoint = invoke_endpoint(
            self.config.api_base_url.as_deref(),
            &self.config.region,
            &self.config.model_id,
        );
        let response = send_json::<MessagesResponse>(
            self.provider(),
            self.client
                .post(endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await?;

        Ok(normalize_response(
            response,
            self.tools.synthesizes_json_tool(request),
        ))
    }
}
