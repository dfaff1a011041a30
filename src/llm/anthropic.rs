use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::content::{ContentSource, FileRef, ImageRef, Message, Role, ToolCall};
use crate::error::ProviderError;
use crate::llm::format::{effective_role, merge_system};
use crate::llm::http::{build_client, send_json};
use crate::llm::{
    ChatModel, CompletionRequest, CompletionResult, JSON_RESPONSE_TOOL_NAME, MessageFormatter,
    ProviderKind, SystemPlacement, TokenUsage, ToolChoice, ToolDeclarationBuilder,
};
use crate::tools::{HostedToolKind, ToolDescriptor};

const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const CODE_EXECUTION_BETA: &str = "code-execution-2025-05-22";

#[derive(Debug, Clone)]
/// Runtime configuration for [`AnthropicModel`].
pub struct AnthropicModelConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Model id (for example `claude-sonnet-4-5`).
    pub model: String,
    /// Anthropic API version header value.
    pub api_version: String,
    /// Optional base URL override for proxies or compatible endpoints.
    pub api_base_url: Option<String>,
    /// Maximum output tokens per call.
    pub max_tokens: u32,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
    /// Optional nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Optional budget for extended thinking tokens.
    pub thinking_budget_tokens: Option<u32>,
    /// Whole-request HTTP timeout.
    pub request_timeout_ms: Option<u64>,
}

impl AnthropicModelConfig {
    /// Creates a config with sensible defaults.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
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

    fn endpoint(&self) -> String {
        let base = self
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1/messages")
    }
}

/// Formatter for the messages API, direct or cloud hosted.
///
/// Images and files are `{type, source: {type: "url" | "base64", ...}}`
/// blocks. The hosted runtime cannot fetch URLs, so that variant rejects
/// URL sources.
#[derive(Debug, Clone, Copy)]
pub struct AnthropicFormatter {
    provider: ProviderKind,
    allow_url_sources: bool,
}

impl AnthropicFormatter {
    pub fn direct() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            allow_url_sources: true,
        }
    }

    pub fn bedrock() -> Self {
        Self {
            provider: ProviderKind::BedrockAnthropic,
            allow_url_sources: false,
        }
    }

    fn source(&self, what: &str, source: &ContentSource) -> Result<Value, ProviderError> {
        match source {
            ContentSource::Url(url) => {
                if !self.allow_url_sources {
                    return Err(ProviderError::unsupported(
                        self.provider,
                        format!("URL-sourced {what}; send inline bytes instead"),
                    ));
                }
                Ok(json!({"type": "url", "url": url}))
            }
            ContentSource::Inline {
                mime_type,
                data_base64,
            } => Ok(json!({
                "type": "base64",
                "media_type": mime_type,
                "data": data_base64,
            })),
        }
    }
}

impl MessageFormatter for AnthropicFormatter {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn system_placement(&self) -> SystemPlacement {
        SystemPlacement::TopLevel
    }

    fn format_text(&self, _role: Role, text: &str) -> Result<Value, ProviderError> {
        Ok(json!({"type": "text", "text": text}))
    }

    fn format_image(&self, _role: Role, image: &ImageRef) -> Result<Value, ProviderError> {
        Ok(json!({"type": "image", "source": self.source("images", &image.source)?}))
    }

    fn format_file(&self, _role: Role, file: &FileRef) -> Result<Value, ProviderError> {
        let mut block = json!({"type": "document", "source": self.source("files", &file.source)?});
        if let Some(filename) = &file.filename {
            block["title"] = json!(filename);
        }
        Ok(block)
    }

    fn format_message(&self, message: &Message) -> Result<Vec<Value>, ProviderError> {
        match effective_role(message) {
            Role::Tool => Ok(vec![json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.text(),
                }],
            })]),
            Role::Assistant => {
                let mut blocks = self.format_content(message)?;
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                Ok(vec![json!({"role": "assistant", "content": blocks})])
            }
            Role::User | Role::System => Ok(vec![json!({
                "role": "user",
                "content": self.format_content(message)?,
            })]),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicTools;

impl ToolDeclarationBuilder for AnthropicTools {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn supports_structured_output(&self) -> bool {
        false
    }

    fn function_declaration(&self, name: &str, description: &str, parameters: &Value) -> Value {
        json!({
            "name": name,
            "description": description,
            "input_schema": parameters,
        })
    }

    fn hosted_tool(&self, kind: HostedToolKind) -> Result<Value, ProviderError> {
        match kind {
            HostedToolKind::WebSearch => {
                Ok(json!({"type": "web_search_20250305", "name": "web_search"}))
            }
            HostedToolKind::CodeExecution => {
                Ok(json!({"type": "code_execution_20250522", "name": "code_execution"}))
            }
            HostedToolKind::ImageGeneration => Err(ProviderError::unsupported(
                self.provider(),
                format!("provider-managed tool `{kind}`"),
            )),
        }
    }
}

/// Sampling knobs shared by the direct and hosted messages adapters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sampling {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub thinking_budget_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessagesBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    pub max_tokens: u32,
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
    /// Beta features the declared tools depend on, sent as `anthropic-beta`.
    #[serde(skip)]
    pub betas: Vec<&'static str>,
}

pub(crate) fn build_body(
    request: &CompletionRequest,
    formatter: &dyn MessageFormatter,
    tools: &dyn ToolDeclarationBuilder,
    sampling: Sampling,
) -> Result<MessagesBody, ProviderError> {
    let wire = formatter.format(&request.messages)?;
    if wire.messages.is_empty() {
        return Err(ProviderError::invalid_model_input(
            "messages",
            "at least one non-system message is required",
        ));
    }

    let declarations = tools.build(request)?;
    let tool_choice = if declarations.is_empty() {
        None
    } else if tools.synthesizes_json_tool(request) {
        Some(match &request.tool_choice {
            ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
            _ if request.tools.is_empty() => {
                json!({"type": "tool", "name": JSON_RESPONSE_TOOL_NAME})
            }
            _ => json!({"type": "any"}),
        })
    } else {
        Some(match &request.tool_choice {
            ToolChoice::Auto => json!({"type": "auto"}),
            ToolChoice::Required => json!({"type": "any"}),
            ToolChoice::None => json!({"type": "none"}),
            ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
        })
    };

    // Extended thinking only accepts `auto` and `none` tool choices.
    let forced = tool_choice
        .as_ref()
        .and_then(|choice| choice.get("type"))
        .and_then(Value::as_str)
        .is_some_and(|kind| kind == "any" || kind == "tool");
    if forced && sampling.thinking_budget_tokens.is_some() {
        return Err(ProviderError::unsupported(
            tools.provider(),
            "forced tool choice with extended thinking",
        ));
    }

    let betas = if request.tools.iter().any(|tool| {
        matches!(
            tool,
            ToolDescriptor::ProviderManaged(HostedToolKind::CodeExecution)
        )
    }) {
        vec![CODE_EXECUTION_BETA]
    } else {
        Vec::new()
    };

    Ok(MessagesBody {
        model: None,
        anthropic_version: None,
        max_tokens: sampling.max_tokens,
        messages: wire.messages,
        system: merge_system(request.system_prompt.as_deref(), wire.system),
        tools: if declarations.is_empty() {
            None
        } else {
            Some(declarations)
        },
        tool_choice,
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        thinking: sampling
            .thinking_budget_tokens
            .map(|budget_tokens| json!({"type": "enabled", "budget_tokens": budget_tokens})),
        betas,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    Thinking {
        thinking: String,
    },
    RedactedThinking {
        data: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

/// Folds response blocks into a [`CompletionResult`]. When `json_tool` is
/// set, the first `json_response` call becomes the raw text.
pub(crate) fn normalize_response(response: MessagesResponse, json_tool: bool) -> CompletionResult {
    let mut text_parts = Vec::new();
    let mut thinking_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut json_text = None;

    for block in response.content {
        match block {
            ResponseBlock::Text { text } => text_parts.push(text),
            ResponseBlock::ToolUse { id, name, input } => {
                if json_tool && json_text.is_none() && name == JSON_RESPONSE_TOOL_NAME {
                    json_text = Some(input.to_string());
                } else {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
            }
            ResponseBlock::Thinking { thinking } => thinking_parts.push(thinking),
            ResponseBlock::RedactedThinking { data } => {
                thinking_parts.push(format!("[redacted:{} bytes]", data.len()))
            }
            ResponseBlock::Other => {}
        }
    }

    let token_usage = response
        .usage
        .map(|usage| {
            TokenUsage::new(
                usage.input_tokens.unwrap_or(0),
                usage.output_tokens.unwrap_or(0),
            )
        })
        .unwrap_or_default();

    CompletionResult {
        raw_text: json_text.unwrap_or_else(|| text_parts.join("\n")),
        token_usage,
        tool_calls,
        thinking: if thinking_parts.is_empty() {
            None
        } else {
            Some(thinking_parts.join("\n"))
        },
    }
}

#[derive(Debug, Clone)]
/// Anthropic messages API adapter implementing [`ChatModel`].
pub struct AnthropicModel {
    client: Client,
    config: AnthropicModelConfig,
    formatter: AnthropicFormatter,
    tools: AnthropicTools,
}

impl AnthropicModel {
    /// Creates a model adapter from explicit config.
    pub fn new(config: AnthropicModelConfig) -> Result<Self, ProviderError> {
        let client = build_client(ProviderKind::Anthropic, config.request_timeout_ms)?;
        Ok(Self {
            client,
            config,
            formatter: AnthropicFormatter::direct(),
            tools: AnthropicTools,
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
impl ChatModel for AnthropicModel {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn invoke(&self, request: &CompletionRequest) -> Result<CompletionResult, ProviderError> {
        let mut body = build_body(request, &self.formatter, &self.tools, self.sampling())?;
        body.model = Some(self.config.model.clone());

        debug!(
            provider = %self.provider(),
            model = %self.config.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending message request"
        );

        let mut builder = self
            .client
            .post(self.config.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version);
        if !body.betas.is_empty() {
            builder = builder.header("anthropic-beta", body.betas.join(","));
        }

        let response = send_json::<MessagesResponse>(self.provider(), builder.json(&body)).await?;

        Ok(normalize_response(
            response,
            self.tools.synthesizes_json_tool(request),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::ResponseFormat;
    use crate::tools::validate_schema;

    fn sampling() -> Sampling {
        Sampling {
            max_tokens: 256,
            temperature: None,
            top_p: None,
            thinking_budget_tokens: None,
        }
    }

    fn answer_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"answer": {"type": "string"}},
            "required": ["answer"],
            "additionalProperties": false
        })
    }

    fn search_tool() -> ToolDescriptor {
        ToolDescriptor::function(
            "search",
            "Search the web",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
                "additionalProperties": false
            }),
        )
    }

    #[test]
    fn system_messages_are_lifted() {
        let wire = AnthropicFormatter::direct()
            .format(&[Message::system("sys"), Message::user("u1")])
            .expect("formats");

        assert_eq!(wire.system.as_deref(), Some("sys"));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(
            wire.messages[0],
            json!({"role": "user", "content": [{"type": "text", "text": "u1"}]})
        );
    }

    #[test]
    fn tool_results_become_user_blocks() {
        let wire = AnthropicFormatter::direct()
            .format(&[Message::tool_result("call_1", "failed")])
            .expect("formats");

        assert_eq!(wire.messages[0]["role"], "user");
        assert_eq!(
            wire.messages[0]["content"][0],
            json!({"type": "tool_result", "tool_use_id": "call_1", "content": "failed"})
        );
    }

    #[test]
    fn url_image_is_preserved() {
        let message = Message::user("describe").with_part(ImageRef::new(
            ContentSource::url("https://example.com/cat.png").expect("url"),
        ));
        let wire = AnthropicFormatter::direct()
            .format(&[message])
            .expect("formats");

        assert_eq!(
            wire.messages[0]["content"][1],
            json!({"type": "image", "source": {"type": "url", "url": "https://example.com/cat.png"}})
        );
    }

    #[test]
    fn inline_file_becomes_base64_document() {
        let message = Message::user("read").with_part(
            FileRef::new(ContentSource::inline_bytes("application/pdf", b"%PDF"))
                .with_filename("a.pdf"),
        );
        let wire = AnthropicFormatter::direct()
            .format(&[message])
            .expect("formats");
        let block = &wire.messages[0]["content"][1];

        assert_eq!(block["type"], "document");
        assert_eq!(block["source"]["type"], "base64");
        assert_eq!(block["source"]["media_type"], "application/pdf");
        assert_eq!(block["title"], "a.pdf");
    }

    #[test]
    fn json_response_tool_is_declared_first_and_forced() {
        let request = CompletionRequest::new(vec![Message::user("answer")])
            .with_response_format(ResponseFormat::json(answer_schema()));

        let body = build_body(
            &request,
            &AnthropicFormatter::direct(),
            &AnthropicTools,
            sampling(),
        )
        .expect("builds");
        let tools = body.tools.expect("tools declared");

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], JSON_RESPONSE_TOOL_NAME);
        assert_eq!(tools[0]["input_schema"], answer_schema());
        assert_eq!(
            body.tool_choice,
            Some(json!({"type": "tool", "name": JSON_RESPONSE_TOOL_NAME}))
        );
    }

    #[test]
    fn declaration_order_is_json_then_developer_then_hosted() {
        let request = CompletionRequest::new(vec![Message::user("go")])
            .with_tool(ToolDescriptor::hosted(HostedToolKind::WebSearch))
            .with_tool(search_tool())
            .with_response_format(ResponseFormat::json(answer_schema()));

        let tools = AnthropicTools.build(&request).expect("builds");

        assert_eq!(tools[0]["name"], JSON_RESPONSE_TOOL_NAME);
        assert_eq!(tools[1]["name"], "search");
        assert_eq!(tools[2]["type"], "web_search_20250305");

        for declaration in tools.iter().filter_map(|tool| tool.get("input_schema")) {
            assert!(validate_schema(declaration).is_ok());
        }
    }

    #[test]
    fn json_tool_with_other_tools_requires_any_tool() {
        let request = CompletionRequest::new(vec![Message::user("go")])
            .with_tool(search_tool())
            .with_response_format(ResponseFormat::json(answer_schema()));

        let body = build_body(
            &request,
            &AnthropicFormatter::direct(),
            &AnthropicTools,
            sampling(),
        )
        .expect("builds");
        assert_eq!(body.tool_choice, Some(json!({"type": "any"})));
    }

    #[test]
    fn image_generation_has_no_mapping() {
        let err = AnthropicTools
            .hosted_tool(HostedToolKind::ImageGeneration)
            .expect_err("must fail");
        match err {
            ProviderError::UnsupportedCapability { provider, capability } => {
                assert_eq!(provider, ProviderKind::Anthropic);
                assert!(capability.contains("image_generation"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn normalize_response_extracts_tool_calls_and_text() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Looking up"},
                {"type": "tool_use", "id": "call_1", "name": "search", "input": {"query": "rust"}}
            ],
            "usage": {"input_tokens": 1, "output_tokens": 2}
        }))
        .expect("decodes");

        let completion = normalize_response(response, false);
        assert_eq!(completion.raw_text, "Looking up");
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "search");
        assert_eq!(completion.token_usage.total, 3);
    }

    #[test]
    fn normalize_response_handles_thinking_without_text() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "I should call a tool", "signature": "sig"},
                {"type": "server_tool_use", "id": "srv_1", "name": "web_search", "input": {}}
            ]
        }))
        .expect("decodes");

        let completion = normalize_response(response, false);
        assert!(completion.raw_text.is_empty());
        assert_eq!(completion.thinking.as_deref(), Some("I should call a tool"));
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn json_tool_call_becomes_raw_text() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "tool_use", "id": "t1", "name": JSON_RESPONSE_TOOL_NAME, "input": {"answer": "42"}}
            ]
        }))
        .expect("decodes");

        let completion = normalize_response(response, true);
        assert_eq!(completion.raw_text, "{\"answer\":\"42\"}");
        assert!(completion.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn invoke_sends_headers_and_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "key"))
            .and(header("anthropic-version", DEFAULT_API_VERSION))
            .and(body_partial_json(json!({"model": "claude-test", "system": "be brief"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "<answer>hi</answer>"}],
                "usage": {"input_tokens": 4, "output_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = AnthropicModel::new(
            AnthropicModelConfig::new("key", "claude-test").with_api_base_url(server.uri()),
        )
        .expect("model");
        let result = model
            .invoke(&CompletionRequest::new(vec![Message::user("hello")]).with_system_prompt("be brief"))
            .await
            .expect("invoke succeeds");

        assert_eq!(result.raw_text, "<answer>hi</answer>");
        assert_eq!(result.token_usage, TokenUsage::new(4, 2));
    }

    #[test]
    fn thinking_rejects_forced_json_tool() {
        let request = CompletionRequest::new(vec![Message::user("answer")])
            .with_response_format(ResponseFormat::json(answer_schema()));
        let sampling = Sampling {
            max_tokens: 2048,
            thinking_budget_tokens: Some(1024),
            ..sampling()
        };

        let err = build_body(
            &request,
            &AnthropicFormatter::direct(),
            &AnthropicTools,
            sampling,
        )
        .expect_err("must fail");
        assert!(matches!(
            err,
            ProviderError::UnsupportedCapability {
                provider: ProviderKind::Anthropic,
                ..
            }
        ));
    }

    #[test]
    fn thinking_allows_auto_tool_choice() {
        let request = CompletionRequest::new(vec![Message::user("go")]).with_tool(search_tool());
        let sampling = Sampling {
            max_tokens: 2048,
            thinking_budget_tokens: Some(1024),
            ..sampling()
        };

        let body = build_body(
            &request,
            &AnthropicFormatter::direct(),
            &AnthropicTools,
            sampling,
        )
        .expect("builds");
        assert_eq!(body.tool_choice, Some(json!({"type": "auto"})));
        assert_eq!(
            body.thinking,
            Some(json!({"type": "enabled", "budget_tokens": 1024}))
        );
    }

    #[tokio::test]
    async fn thinking_with_forced_tool_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config =
            AnthropicModelConfig::new("key", "claude-test").with_api_base_url(server.uri());
        config.thinking_budget_tokens = Some(1024);
        config.max_tokens = 2048;
        let model = AnthropicModel::new(config).expect("model");

        let request = CompletionRequest::new(vec![Message::user("go")])
            .with_tool(search_tool())
            .with_tool_choice(ToolChoice::Required);
        let err = model.invoke(&request).await.expect_err("must fail");
        assert!(matches!(err, ProviderError::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn code_execution_sends_beta_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("anthropic-beta", CODE_EXECUTION_BETA))
            .and(body_partial_json(json!({
                "tools": [{"type": "code_execution_20250522", "name": "code_execution"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "<answer>4</answer>"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = AnthropicModel::new(
            AnthropicModelConfig::new("key", "claude-test").with_api_base_url(server.uri()),
        )
        .expect("model");
        let request = CompletionRequest::new(vec![Message::user("2+2")])
            .with_tool(ToolDescriptor::hosted(HostedToolKind::CodeExecution));

        let result = model.invoke(&request).await.expect("invoke succeeds");
        assert_eq!(result.raw_text, "<answer>4</answer>");
    }

    #[test]
    fn web_search_needs_no_beta() {
        let request = CompletionRequest::new(vec![Message::user("go")])
            .with_tool(ToolDescriptor::hosted(HostedToolKind::WebSearch));

        let body = build_body(
            &request,
            &AnthropicFormatter::direct(),
            &AnthropicTools,
            sampling(),
        )
        .expect("builds");
        assert!(body.betas.is_empty());
    }
}
