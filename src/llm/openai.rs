use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::content::{FileRef, ImageRef, Message, Role, ToolCall};
use crate::error::ProviderError;
use crate::llm::format::effective_role;
use crate::llm::http::{build_client, send_json};
use crate::llm::{
    ChatModel, CompletionRequest, CompletionResult, MessageFormatter, ProviderKind,
    ResponseFormat, TokenUsage, ToolChoice, ToolDeclarationBuilder,
};
use crate::tools::{HostedToolKind, validate_schema};

pub(crate) const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Runtime configuration shared by [`OpenAiChatModel`] and
/// [`OpenAiResponsesModel`](crate::llm::OpenAiResponsesModel).
#[derive(Debug, Clone)]
pub struct OpenAiModelConfig {
    /// Bearer API key.
    pub api_key: String,
    /// Model id (for example `gpt-4.1`).
    pub model: String,
    /// Optional base URL override for proxies or compatible endpoints.
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Maximum output tokens per call.
    pub max_output_tokens: Option<u32>,
    /// Whole-request HTTP timeout.
    pub request_timeout_ms: Option<u64>,
}

impl OpenAiModelConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base_url: None,
            temperature: None,
            top_p: None,
            max_output_tokens: Some(4096),
            request_timeout_ms: Some(600_000),
        }
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        let base = self
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/{path}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatFormatter;

impl MessageFormatter for OpenAiChatFormatter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiChat
    }

    fn format_text(&self, _role: Role, text: &str) -> Result<Value, ProviderError> {
        Ok(json!({"type": "text", "text": text}))
    }

    fn format_image(&self, _role: Role, image: &ImageRef) -> Result<Value, ProviderError> {
        Ok(json!({
            "type": "image_url",
            "image_url": {"url": image.source.to_uri()}
        }))
    }

    fn format_file(&self, _role: Role, file: &FileRef) -> Result<Value, ProviderError> {
        if file.source.is_url() {
            return Err(ProviderError::unsupported(
                self.provider(),
                "URL-sourced files; send inline bytes or use the responses API",
            ));
        }

        let mut payload = json!({"file_data": file.source.to_uri()});
        if let Some(filename) = &file.filename {
            payload["filename"] = json!(filename);
        }
        Ok(json!({"type": "file", "file": payload}))
    }

    fn format_message(&self, message: &Message) -> Result<Vec<Value>, ProviderError> {
        let role = effective_role(message);

        if role == Role::Tool {
            return Ok(vec![json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id,
                "content": message.text(),
            })]);
        }

        let mut converted = json!({"role": role.as_str()});
        if !message.content.is_empty() {
            converted["content"] = Value::Array(self.format_content(message)?);
        }

        if role == Role::Assistant && !message.tool_calls.is_empty() {
            converted["tool_calls"] = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
        }

        Ok(vec![converted])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatTools;

impl ToolDeclarationBuilder for OpenAiChatTools {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiChat
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn function_declaration(&self, name: &str, description: &str, parameters: &Value) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": parameters,
                "strict": true,
            }
        })
    }

    fn hosted_tool(&self, kind: HostedToolKind) -> Result<Value, ProviderError> {
        Err(ProviderError::unsupported(
            self.provider(),
            format!(
                "provider-managed tool `{kind}`; the chat completions API has no hosted tools, use OpenAiResponsesModel instead"
            ),
        ))
    }
}

#[derive(Debug, Clone)]
/// OpenAI chat completions adapter implementing [`ChatModel`].
pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiModelConfig,
    formatter: OpenAiChatFormatter,
    tools: OpenAiChatTools,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiModelConfig) -> Result<Self, ProviderError> {
        let client = build_client(ProviderKind::OpenAiChat, config.request_timeout_ms)?;
        Ok(Self {
            client,
            config,
            formatter: OpenAiChatFormatter,
            tools: OpenAiChatTools,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiChat
    }

    async fn invoke(&self, request: &CompletionRequest) -> Result<CompletionResult, ProviderError> {
        let body = build_request(request, &self.config, &self.formatter, &self.tools)?;

        debug!(
            provider = %self.provider(),
            model = %self.config.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending chat completion"
        );

        let response = send_json::<ChatCompletionResponse>(
            self.provider(),
            self.client
                .post(self.config.endpoint("chat/completions"))
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await?;

        normalize_response(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

fn build_request(
    request: &CompletionRequest,
    config: &OpenAiModelConfig,
    formatter: &OpenAiChatFormatter,
    tools: &OpenAiChatTools,
) -> Result<ChatCompletionRequest, ProviderError> {
    let wire = formatter.format(&request.messages)?;

    let mut messages = Vec::with_capacity(wire.messages.len() + 1);
    if let Some(system_prompt) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        messages.push(json!({
            "role": "system",
            "content": [formatter.format_text(Role::System, system_prompt)?],
        }));
    }
    messages.extend(wire.messages);

    if messages.is_empty() {
        return Err(ProviderError::invalid_model_input(
            "messages",
            "at least one message is required",
        ));
    }

    let declarations = tools.build(request)?;
    let tool_choice = if declarations.is_empty() {
        None
    } else {
        Some(match &request.tool_choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Required => json!("required"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
        })
    };

    let response_format = match &request.response_format {
        ResponseFormat::Text => None,
        ResponseFormat::Json { name, schema } => {
            validate_schema(schema)?;
            Some(json!({
                "type": "json_schema",
                "json_schema": {"name": name, "schema": schema, "strict": true}
            }))
        }
    };

    Ok(ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        tools: if declarations.is_empty() {
            None
        } else {
            Some(declarations)
        },
        tool_choice,
        response_format,
        temperature: config.temperature,
        top_p: config.top_p,
        max_completion_tokens: config.max_output_tokens,
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatAssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatAssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ChatToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

fn normalize_response(response: ChatCompletionResponse) -> Result<CompletionResult, ProviderError> {
    let provider = ProviderKind::OpenAiChat;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::vendor(provider, "response missing choices"))?;

    let message = choice
        .message
        .ok_or_else(|| ProviderError::vendor(provider, "response missing choice message"))?;

    if let Some(refusal) = message.refusal.filter(|text| !text.is_empty()) {
        return Err(ProviderError::vendor(
            provider,
            format!("model refused: {refusal}"),
        ));
    }

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| decode_tool_call(provider, call.id, call.function.name, &call.function.arguments))
        .collect::<Result<Vec<_>, _>>()?;

    let token_usage = response
        .usage
        .map(|usage| {
            let mut token_usage = TokenUsage::new(
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
            );
            if let Some(total) = usage.total_tokens {
                token_usage.total = total;
            }
            token_usage
        })
        .unwrap_or_default();

    Ok(CompletionResult {
        raw_text: message.content.unwrap_or_default(),
        token_usage,
        tool_calls,
        thinking: None,
    })
}

/// Native tool-call arguments arrive as a JSON string.
pub(crate) fn decode_tool_call(
    provider: ProviderKind,
    id: String,
    name: String,
    arguments: &str,
) -> Result<ToolCall, ProviderError> {
    let arguments = if arguments.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str::<Value>(arguments).map_err(|err| {
            ProviderError::vendor(
                provider,
                format!("tool call arguments for '{name}' are not valid JSON: {err}"),
            )
        })?
    };

    Ok(ToolCall {
        id,
        name,
        arguments,
    })
}
