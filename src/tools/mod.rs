mod schema;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};

pub use schema::{MAX_NESTING_DEPTH, MAX_PROPERTIES, validate_schema};

/// Capabilities a vendor runs on its own infrastructure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostedToolKind {
    WebSearch,
    CodeExecution,
    ImageGeneration,
}

impl HostedToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostedToolKind::WebSearch => "web_search",
            HostedToolKind::CodeExecution => "code_execution",
            HostedToolKind::ImageGeneration => "image_generation",
        }
    }
}

impl fmt::Display for HostedToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A function the application implements; the model only asks for it.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolDescriptor {
    DeveloperManaged(FunctionTool),
    ProviderManaged(HostedToolKind),
}

impl ToolDescriptor {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self::DeveloperManaged(FunctionTool {
            name: name.into(),
            description: description.into(),
            parameters,
        })
    }

    pub fn hosted(kind: HostedToolKind) -> Self {
        Self::ProviderManaged(kind)
    }

    /// Tool name for developer tools, tool kind for hosted ones.
    pub fn identity(&self) -> &str {
        match self {
            ToolDescriptor::DeveloperManaged(function) => &function.name,
            ToolDescriptor::ProviderManaged(kind) => kind.as_str(),
        }
    }
}

/// What a tool hands back to the reasoning loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Json(value) => value.to_string(),
        }
    }
}

/// Runs developer-managed tools on behalf of the agent.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError>;
}

type ToolHandler = dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync;

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false,
            }),
            handler: Arc::new(|_args| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args| Box::pin(handler(args)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(&self.name, &self.description, self.json_schema.clone())
    }

    pub async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args).await
    }
}

/// In-process executor over a set of [`ToolSpec`]s.
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, rejecting duplicate names.
    pub fn register(&mut self, tool: ToolSpec) -> Result<(), ToolError> {
        if self.by_name.contains_key(tool.name()) {
            return Err(ToolError::Execution(format!(
                "duplicate tool registered: {}",
                tool.name()
            )));
        }
        self.by_name.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.by_name.get(name).map(|index| &self.tools[*index])
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(ToolSpec::descriptor).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let args_obj = args
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: "arguments must be a JSON object".to_string(),
        })?;

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: "tool schema must be a JSON object".to_string(),
        })?;

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field in required {
            let Some(field_name) = field.as_str() else {
                continue;
            };
            if !args_obj.contains_key(field_name) {
                return Err(ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("missing required field: {field_name}"),
                });
            }
        }
    }

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        for key in args_obj.keys() {
            if !properties.contains_key(key) {
                return Err(ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("unknown field: {key}"),
                });
            }
        }
    }

    for (key, value) in args_obj {
        if let Some(field_schema) = properties.get(key) {
            if !value_matches_schema_type(value, field_schema.get("type")) {
                return Err(ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("field '{key}' has the wrong type"),
                });
            }
        }
    }

    Ok(())
}

fn value_matches_schema_type(value: &Value, type_spec: Option<&Value>) -> bool {
    match type_spec {
        Some(Value::String(type_name)) => value_matches_type(value, type_name),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|type_name| value_matches_type(value, type_name)),
        _ => true,
    }
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn echo_tool() -> ToolSpec {
        ToolSpec::new("echo", "echo a value")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "value": {"type": "string"},
                    "times": {"type": ["integer", "null"]}
                },
                "required": ["value", "times"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|args| async move {
                let value = args
                    .get("value")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Execution("value missing".to_string()))?;
                let times = args.get("times").and_then(Value::as_u64).unwrap_or(1);
                Ok(ToolOutput::Text(value.repeat(times as usize)))
            })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = ToolSpec::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(result.is_err());
    }

    #[test]
    fn default_schema_is_strict() {
        let tool = ToolSpec::new("noop", "does nothing");
        assert!(validate_schema(tool.json_schema()).is_ok());
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let err = echo_tool()
            .execute(json!({"times": 2}))
            .await
            .expect_err("should fail");

        assert!(err.to_string().contains("missing required field: value"));
    }

    #[tokio::test]
    async fn argument_validation_accepts_nullable_fields() {
        let output = echo_tool()
            .execute(json!({"value": "ab", "times": null}))
            .await
            .expect("tool executes");
        assert_eq!(output, ToolOutput::Text("ab".to_string()));
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).expect("registers");

        let output = registry
            .execute("echo", json!({"value": "x", "times": 3}))
            .await
            .expect("tool executes");
        assert_eq!(output, ToolOutput::Text("xxx".to_string()));

        let err = registry
            .execute("missing", json!({}))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).expect("registers");
        assert!(registry.register(echo_tool()).is_err());
    }

    #[test]
    fn descriptor_identity() {
        assert_eq!(echo_tool().descriptor().identity(), "echo");
        assert_eq!(
            ToolDescriptor::hosted(HostedToolKind::CodeExecution).identity(),
            "code_execution"
        );
    }
}
