//! Vendor-neutral message model.
//!
//! Every adapter consumes these types; none of them know about a specific
//! wire format. Upstream JSON can be ingested with [`Message::from_value`].

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};

use crate::error::ProviderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProviderError;

    /// Accepts the role spellings used across vendors, case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" | "developer" => Ok(Role::System),
            "user" | "human" => Ok(Role::User),
            "assistant" | "model" | "ai" => Ok(Role::Assistant),
            "tool" | "function" => Ok(Role::Tool),
            other => Err(ProviderError::invalid_model_input(
                "role",
                format!("unknown role `{other}`"),
            )),
        }
    }
}

/// Where the bytes of an image or file live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentSource {
    Url(String),
    Inline {
        mime_type: String,
        data_base64: String,
    },
}

impl ContentSource {
    pub fn url(url: impl Into<String>) -> Result<Self, ProviderError> {
        let url = url.into();
        url::Url::parse(&url)
            .map_err(|err| ProviderError::invalid_model_input("url", format!("`{url}`: {err}")))?;
        Ok(Self::Url(url))
    }

    pub fn inline_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Inline {
            mime_type: mime_type.into(),
            data_base64: BASE64.encode(bytes),
        }
    }

    pub fn inline_base64(
        mime_type: impl Into<String>,
        data_base64: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let mime_type = mime_type.into();
        let data_base64 = data_base64.into();
        if mime_type.trim().is_empty() {
            return Err(ProviderError::invalid_model_input(
                "mime_type",
                "inline content requires a mime type",
            ));
        }
        BASE64
            .decode(data_base64.as_bytes())
            .map_err(|err| ProviderError::invalid_model_input("bytes_base64", err.to_string()))?;
        Ok(Self::Inline {
            mime_type,
            data_base64,
        })
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }

    /// `data:` URI for inline content, the URL itself otherwise.
    pub fn to_uri(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Inline {
                mime_type,
                data_base64,
            } => format!("data:{mime_type};base64,{data_base64}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub source: ContentSource,
}

impl ImageRef {
    pub fn new(source: ContentSource) -> Self {
        Self { source }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub source: ContentSource,
    pub filename: Option<String>,
}

impl FileRef {
    pub fn new(source: ContentSource) -> Self {
        Self {
            source,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(ImageRef),
    File(FileRef),
}

impl From<&str> for ContentPart {
    fn from(value: &str) -> Self {
        ContentPart::Text(value.to_string())
    }
}

impl From<String> for ContentPart {
    fn from(value: String) -> Self {
        ContentPart::Text(value)
    }
}

impl From<ImageRef> for ContentPart {
    fn from(value: ImageRef) -> Self {
        ContentPart::Image(value)
    }
}

impl From<FileRef> for ContentPart {
    fn from(value: FileRef) -> Self {
        ContentPart::File(value)
    }
}

/// A tool invocation requested natively by a model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Native tool calls made by an assistant turn.
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool results that answer a native tool call.
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text(text.into())],
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: parts,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Result of a native tool call, addressed by the call id.
    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, text);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Tool output that is not tied to a native call id.
    pub fn observation(text: impl Into<String>) -> Self {
        Self::new(Role::Tool, text)
    }

    pub fn with_part(mut self, part: impl Into<ContentPart>) -> Self {
        self.content.push(part.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Concatenated text parts, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image(_) | ContentPart::File(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn ensure_not_empty(&self) -> Result<(), ProviderError> {
        if self.content.is_empty() && self.tool_calls.is_empty() {
            return Err(ProviderError::invalid_model_input(
                "content",
                format!("{} message has no content", self.role),
            ));
        }
        Ok(())
    }

    /// Builds a message from loosely-typed upstream JSON.
    ///
    /// `content` may be a bare string or an array mixing strings and part
    /// objects tagged `text`, `image` or `file`.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        let object = value
            .as_object()
            .ok_or_else(|| {
                ProviderError::invalid_model_input("message", "expected a JSON object")
            })?;

        let role = object
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::invalid_model_input("role", "expected a string"))?
            .parse::<Role>()?;

        let content = match object.get("content") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(text)) => vec![ContentPart::Text(text.clone())],
            Some(Value::Array(parts)) => parts
                .iter()
                .enumerate()
                .map(|(index, part)| parse_part(index, part))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ProviderError::invalid_model_input(
                    "content",
                    format!("expected a string or an array of parts, got {other}"),
                ));
            }
        };

        let tool_calls = match object.get("tool_calls") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(calls)) => calls
                .iter()
                .enumerate()
                .map(|(index, call)| parse_tool_call(index, call))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ProviderError::invalid_model_input(
                    "tool_calls",
                    "expected an array",
                ));
            }
        };

        let tool_call_id = object
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let message = Self {
            role,
            content,
            tool_calls,
            tool_call_id,
        };
        message.ensure_not_empty()?;
        Ok(message)
    }
}

fn parse_part(index: usize, part: &Value) -> Result<ContentPart, ProviderError> {
    let field = |name: &str| format!("content[{index}].{name}");

    let object = match part {
        Value::String(text) => return Ok(ContentPart::Text(text.clone())),
        Value::Object(object) => object,
        other => {
            return Err(ProviderError::invalid_model_input(
                format!("content[{index}]"),
                format!("expected a string or a part object, got {other}"),
            ));
        }
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_model_input(field("type"), "missing part type"))?;

    match kind {
        "text" => object
            .get("text")
            .or_else(|| object.get("value"))
            .and_then(Value::as_str)
            .map(|text| ContentPart::Text(text.to_string()))
            .ok_or_else(|| ProviderError::invalid_model_input(field("text"), "expected a string")),
        "image" => Ok(ContentPart::Image(ImageRef::new(parse_source(
            object, &field,
        )?))),
        "file" => {
            let mut file = FileRef::new(parse_source(object, &field)?);
            file.filename = object
                .get("filename")
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(ContentPart::File(file))
        }
        other => Err(ProviderError::invalid_model_input(
            field("type"),
            format!("unknown content part type `{other}`"),
        )),
    }
}

fn parse_source(
    object: &Map<String, Value>,
    field: &dyn Fn(&str) -> String,
) -> Result<ContentSource, ProviderError> {
    if let Some(url) = object.get("url").and_then(Value::as_str) {
        return ContentSource::url(url)
            .map_err(|err| ProviderError::invalid_model_input(field("url"), err.to_string()));
    }

    let mime_type = object.get("mime_type").and_then(Value::as_str);
    let data = object.get("bytes_base64").and_then(Value::as_str);
    match (mime_type, data) {
        (Some(mime_type), Some(data)) => ContentSource::inline_base64(mime_type, data)
            .map_err(|err| {
                ProviderError::invalid_model_input(field("bytes_base64"), err.to_string())
            }),
        _ => Err(ProviderError::invalid_model_input(
            field("source"),
            "expected `url` or `mime_type` with `bytes_base64`",
        )),
    }
}

fn parse_tool_call(index: usize, call: &Value) -> Result<ToolCall, ProviderError> {
    let field = |name: &str| format!("tool_calls[{index}].{name}");

    let id = call
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_model_input(field("id"), "expected a string"))?;
    let name = call
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_model_input(field("name"), "expected a string"))?;
    let arguments = match call.get("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|err| {
                ProviderError::invalid_model_input(field("arguments"), err.to_string())
            })?,
        Some(other) => other.clone(),
    };

    Ok(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    })
}
