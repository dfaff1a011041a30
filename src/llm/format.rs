use serde_json::Value;

use crate::content::{ContentPart, FileRef, ImageRef, Message, Role};
use crate::error::ProviderError;
use crate::llm::ProviderKind;

/// Where a vendor expects system instructions to live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemPlacement {
    /// System messages stay in the message list.
    Inline,
    /// System messages are lifted into a top-level field.
    TopLevel,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WireMessages {
    pub system: Option<String>,
    pub messages: Vec<Value>,
}

/// Converts vendor-neutral messages into one vendor's wire JSON.
///
/// Implementors supply the per-part conversions and the message envelope;
/// part dispatch, system handling and empty-content checks are shared.
pub trait MessageFormatter: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn system_placement(&self) -> SystemPlacement {
        SystemPlacement::Inline
    }

    fn format_text(&self, role: Role, text: &str) -> Result<Value, ProviderError>;

    fn format_image(&self, role: Role, image: &ImageRef) -> Result<Value, ProviderError>;

    fn format_file(&self, role: Role, file: &FileRef) -> Result<Value, ProviderError>;

    /// Wraps one message. May emit several wire items (tool calls, for example).
    fn format_message(&self, message: &Message) -> Result<Vec<Value>, ProviderError>;

    fn format_part(&self, role: Role, part: &ContentPart) -> Result<Value, ProviderError> {
        match part {
            ContentPart::Text(text) => self.format_text(role, text),
            ContentPart::Image(image) => self.format_image(role, image),
            ContentPart::File(file) => self.format_file(role, file),
        }
    }

    fn format_content(&self, message: &Message) -> Result<Vec<Value>, ProviderError> {
        let role = effective_role(message);
        message
            .content
            .iter()
            .map(|part| self.format_part(role, part))
            .collect()
    }

    fn format(&self, messages: &[Message]) -> Result<WireMessages, ProviderError> {
        let mut system_lines = Vec::new();
        let mut wire = Vec::new();

        for message in messages {
            message.ensure_not_empty()?;

            if message.role == Role::System && self.system_placement() == SystemPlacement::TopLevel
            {
                if message
                    .content
                    .iter()
                    .any(|part| !matches!(part, ContentPart::Text(_)))
                {
                    return Err(ProviderError::unsupported(
                        self.provider(),
                        "non-text content in system messages",
                    ));
                }
                system_lines.push(message.text());
                continue;
            }

            wire.extend(self.format_message(message)?);
        }

        let system = if system_lines.is_empty() {
            None
        } else {
            Some(system_lines.join("\n\n"))
        };

        Ok(WireMessages {
            system,
            messages: wire,
        })
    }
}

/// Tool output without a native call id is sent as user-authored text.
pub(crate) fn effective_role(message: &Message) -> Role {
    if message.role == Role::Tool && message.tool_call_id.is_none() {
        Role::User
    } else {
        message.role
    }
}

/// Merges a caller-level system prompt with any system text found in messages.
pub(crate) fn merge_system(prompt: Option<&str>, lifted: Option<String>) -> Option<String> {
    match (prompt.filter(|text| !text.is_empty()), lifted) {
        (Some(prompt), Some(lifted)) => Some(format!("{prompt}\n\n{lifted}")),
        (Some(prompt), None) => Some(prompt.to_string()),
        (None, lifted) => lifted,
    }
}
