use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::{CompletionRequest, ProviderKind, ResponseFormat};
use crate::tools::{HostedToolKind, ToolDescriptor, validate_schema};

/// Name of the tool synthesized for JSON responses on vendors without
/// native structured output.
pub const JSON_RESPONSE_TOOL_NAME: &str = "json_response";

const JSON_RESPONSE_TOOL_DESCRIPTION: &str =
    "Respond with a JSON object that matches the input schema exactly.";

/// Converts tool descriptors (and a JSON response requirement) into one
/// vendor's tool declarations.
///
/// Declaration order is fixed: the synthesized JSON response tool, then
/// developer tools, then provider-managed tools, each group in caller order.
pub trait ToolDeclarationBuilder: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn supports_structured_output(&self) -> bool;

    fn function_declaration(&self, name: &str, description: &str, parameters: &Value) -> Value;

    fn hosted_tool(&self, kind: HostedToolKind) -> Result<Value, ProviderError>;

    /// True when `build` will prepend the JSON response tool.
    fn synthesizes_json_tool(&self, request: &CompletionRequest) -> bool {
        matches!(request.response_format, ResponseFormat::Json { .. })
            && !self.supports_structured_output()
    }

    fn build(&self, request: &CompletionRequest) -> Result<Vec<Value>, ProviderError> {
        let mut declarations = Vec::new();

        if let ResponseFormat::Json { schema, .. } = &request.response_format {
            if !self.supports_structured_output() {
                validate_schema(schema)?;
                declarations.push(self.function_declaration(
                    JSON_RESPONSE_TOOL_NAME,
                    JSON_RESPONSE_TOOL_DESCRIPTION,
                    schema,
                ));
            }
        }

        for tool in &request.tools {
            if let ToolDescriptor::DeveloperManaged(function) = tool {
                validate_schema(&function.parameters)?;
                declarations.push(self.function_declaration(
                    &function.name,
                    &function.description,
                    &function.parameters,
                ));
            }
        }

        for tool in &request.tools {
            if let ToolDescriptor::ProviderManaged(kind) = tool {
                declarations.push(self.hosted_tool(*kind)?);
            }
        }

        debug!(
            provider = %self.provider(),
            declared = declarations.len(),
            "built tool declarations"
        );

        Ok(declarations)
    }
}
