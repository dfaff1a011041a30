use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::content::{FileRef, ImageRef, Message, Role};
use crate::error::ProviderError;
use crate::llm::format::effective_role;
use crate::llm::http::{build_client, send_json};
use crate::llm::openai::decode_tool_call;
use crate::llm::{
    ChatModel, CompletionRequest, CompletionResult, MessageFormatter, OpenAiModelConfig,
    ProviderKind, ResponseFormat, TokenUsage, ToolChoice, ToolDeclarationBuilder,
};
use crate::tools::{HostedToolKind, validate_schema};

const DEFAULT_FILENAME: &str = "attachment";

/// Responses-API formatter. Text is tagged `input_text` or `output_text`
/// depending on who authored it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponsesFormatter;

impl MessageFormatter for OpenAiResponsesFormatter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiResponses
    }

    fn format_text(&self, role: Role, text: &str) -> Result<Value, ProviderError> {
        let tag = if role == Role::Assistant {
            "output_text"
        } else {
            "input_text"
        };
        Ok(json!({"type": tag, "text": text}))
    }

    fn format_image(&self, role: Role, image: &ImageRef) -> Result<Value, ProviderError> {
        if role == Role::Assistant {
            return Err(ProviderError::unsupported(
                self.provider(),
                "images in assistant messages",
            ));
        }
        Ok(json!({
            "type": "input_image",
            "image_url": image.source.to_uri(),
            "detail": "auto",
        }))
    }

    fn format_file(&self, role: Role, file: &FileRef) -> Result<Value, ProviderError> {
        if role == Role::Assistant {
            return Err(ProviderError::unsupported(
                self.provider(),
                "files in assistant messages",
            ));
        }

        if file.source.is_url() {
            return Ok(json!({"type": "input_file", "file_url": file.source.to_uri()}));
        }

        Ok(json!({
            "type": "input_file",
            "filename": file.filename.as_deref().unwrap_or(DEFAULT_FILENAME),
            "file_data": file.source.to_uri(),
        }))
    }

    fn format_message(&self, message: &Message) -> Result<Vec<Value>, ProviderError> {
        let role = effective_role(message);

        if role == Role::Tool {
            return Ok(vec![json!({
                "type": "function_call_output",
                "call_id": message.tool_call_id,
                "output": message.text(),
            })]);
        }

        let mut items = Vec::new();
        if !message.content.is_empty() {
            items.push(json!({
                "role": role.as_str(),
                "content": self.format_content(message)?,
            }));
        }

        if role == Role::Assistant {
            for call in &message.tool_calls {
                items.push(json!({
                    "type": "function_call",
                    "call_id": call.id,
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                }));
            }
        }

        Ok(items)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponsesTools;

impl ToolDeclarationBuilder for OpenAiResponsesTools {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiResponses
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn function_declaration(&self, name: &str, description: &str, parameters: &Value) -> Value {
        json!({
            "type": "function",
            "name": name,
            "description": description,
            "parameters": parameters,
            "strict": true,
        })
    }

    fn hosted_tool(&self, kind: HostedToolKind) -> Result<Value, ProviderError> {
        Ok(match kind {
            HostedToolKind::WebSearch => json!({"type": "web_search_preview"}),
            HostedToolKind::CodeExecution => {
                json!({"type": "code_interpreter", "container": {"type": "auto"}})
            }
            HostedToolKind::ImageGeneration => json!({"type": "image_generation"}),
        })
    }
}

#[derive(Debug, Clone)]
/// OpenAI responses API adapter implementing [`ChatModel`].
pub struct OpenAiResponsesModel {
    client: Client,
    config: OpenAiModelConfig,
    formatter: OpenAiResponsesFormatter,
    tools: OpenAiResponsesTools,
}

impl OpenAiResponsesModel {
    pub fn new(config: OpenAiModelConfig) -> Result<Self, ProviderError> {
        let client = build_client(ProviderKind::OpenAiResponses, config.request_timeout_ms)?;
        Ok(Self {
            client,
            config,
            formatter: OpenAiResponsesFormatter,
            tools: OpenAiResponsesTools,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiResponsesModel {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAiResponses
    }

    async fn invoke(&self, request: &CompletionRequest) -> Result<CompletionResult, ProviderError> {
        let body = build_request(request, &self.config, &self.formatter, &self.tools)?;

        debug!(
            provider = %self.provider(),
            model = %self.config.model,
            items = body.input.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending response request"
        );

        let response = send_json::<ResponsesResponse>(
            self.provider(),
            self.client
                .post(self.config.endpoint("responses"))
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await?;

        normalize_response(response)
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

fn build_request(
    request: &CompletionRequest,
    config: &OpenAiModelConfig,
    formatter: &OpenAiResponsesFormatter,
    tools: &OpenAiResponsesTools,
) -> Result<ResponsesRequest, ProviderError> {
    let wire = formatter.format(&request.messages)?;
    if wire.messages.is_empty() {
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
            ToolChoice::Tool(name) => json!({"type": "function", "name": name}),
        })
    };

    let text = match &request.response_format {
        ResponseFormat::Text => None,
        ResponseFormat::Json { name, schema } => {
            validate_schema(schema)?;
            Some(json!({
                "format": {"type": "json_schema", "name": name, "schema": schema, "strict": true}
            }))
        }
    };

    Ok(ResponsesRequest {
        model: config.model.clone(),
        input: wire.messages,
        instructions: request.system_prompt.clone().filter(|s| !s.is_empty()),
        tools: if declarations.is_empty() {
            None
        } else {
            Some(declarations)
        },
        tool_choice,
        text,
        temperature: config.temperature,
        top_p: config.top_p,
        max_output_tokens: config.max_output_tokens,
    })
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: Option<ResponsesUsage>,
    error: Option<ResponsesError>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<ReasoningSummary>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ReasoningSummary {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesError {
    message: Option<String>,
}

fn normalize_response(response: ResponsesResponse) -> Result<CompletionResult, ProviderError> {
    let provider = ProviderKind::OpenAiResponses;

    if let Some(error) = response.error {
        return Err(ProviderError::vendor(
            provider,
            error
                .message
                .unwrap_or_else(|| "response failed".to_string()),
        ));
    }

    let mut text_parts = Vec::new();
    let mut thinking_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for item in response.output {
        match item {
            OutputItem::Message { content } => {
                for part in content {
                    match part {
                        OutputContent::OutputText { text } => text_parts.push(text),
                        OutputContent::Refusal { refusal } => {
                            return Err(ProviderError::vendor(
                                provider,
                                format!("model refused: {refusal}"),
                            ));
                        }
                        OutputContent::Other => {}
                    }
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => tool_calls.push(decode_tool_call(provider, call_id, name, &arguments)?),
            OutputItem::Reasoning { summary } => {
                thinking_parts.extend(summary.into_iter().map(|part| part.text));
            }
            OutputItem::Other => {}
        }
    }

    let token_usage = response
        .usage
        .map(|usage| {
            let mut token_usage = TokenUsage::new(
                usage.input_tokens.unwrap_or(0),
                usage.output_tokens.unwrap_or(0),
            );
            if let Some(total) = usage.total_tokens {
                token_usage.total = total;
            }
            token_usage
        })
        .unwrap_or_default();

    Ok(CompletionResult {
        raw_text: text_parts.join("\n"),
        token_usage,
        tool_calls,
        thinking: if thinking_parts.is_empty() {
            None
        } else {
            Some(thinking_parts.join("\n"))
        },
    })
}
