use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

static THOUGHT: LazyLock<Regex> = LazyLock::new(|| tag_pattern("thought"));
static ACTION: LazyLock<Regex> = LazyLock::new(|| tag_pattern("action"));
static ANSWER: LazyLock<Regex> = LazyLock::new(|| tag_pattern("answer"));
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").expect("static regex")
});

fn tag_pattern(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).expect("static regex")
}

/// The three optional sections of one model turn. Each is extracted on its
/// own; any combination may be present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentParseResult {
    pub thought: Option<String>,
    /// Decoded `<action>` object. Absent when the tag is missing or its
    /// body is not a JSON object.
    pub action: Option<Value>,
    pub answer: Option<String>,
}

/// A tool call recovered from an action payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: Value,
}

impl AgentParseResult {
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.answer.is_none()
    }

    /// Reads the tool name from `tool` (or `name`). Arguments come from an
    /// `arguments` object when present, otherwise from the remaining keys.
    pub fn invocation(&self) -> Option<ToolInvocation> {
        let object = self.action.as_ref()?.as_object()?;
        let (name_key, tool) = ["tool", "name"]
            .into_iter()
            .find_map(|key| object.get(key).and_then(Value::as_str).map(|tool| (key, tool)))?;

        let arguments = match object.get("arguments") {
            Some(Value::Object(arguments)) => Value::Object(arguments.clone()),
            _ => Value::Object(
                object
                    .iter()
                    .filter(|(key, _)| key.as_str() != name_key && key.as_str() != "arguments")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<Map<_, _>>(),
            ),
        };

        Some(ToolInvocation {
            tool: tool.to_string(),
            arguments,
        })
    }
}

/// Extracts thought, action and answer from raw model text. Never fails.
pub fn parse(raw_text: &str) -> AgentParseResult {
    AgentParseResult {
        thought: section(&THOUGHT, raw_text),
        action: section(&ACTION, raw_text).and_then(|body| decode_action(&body)),
        answer: section(&ANSWER, raw_text),
    }
}

fn section(pattern: &Regex, raw_text: &str) -> Option<String> {
    let body = pattern.captures(raw_text)?.get(1)?.as_str().trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

fn decode_action(body: &str) -> Option<Value> {
    let unfenced = CODE_FENCE
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map_or(body, |inner| inner.as_str());

    match serde_json::from_str::<Value>(unfenced) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(other) => {
            debug!(kind = json_kind(&other), "ignoring non-object action");
            None
        }
        Err(err) => {
            debug!(error = %err, "ignoring malformed action");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
