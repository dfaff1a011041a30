mod parser;

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::Message;
use crate::error::{AgentError, ProviderError};
use crate::llm::{CallOptions, ChatModel, CompletionRequest, Interrupted};
use crate::tools::{
    FunctionTool, HostedToolKind, ToolDescriptor, ToolExecutor, ToolRegistry, ToolSpec,
};

pub use parser::{AgentParseResult, ToolInvocation, parse};

const PROTOCOL: &str = "Work step by step. Every reply starts with your reasoning inside \
<thought></thought>, followed by exactly one of:\n\
- <action>{\"tool\": \"<tool name>\", \"arguments\": {...}}</action> to call a tool; \
its result comes back in the next message as an observation.\n\
- <answer>...</answer> once you can answer the user.";

const EMPTY_TURN_NUDGE: &str = "Your last reply had neither an <action> nor an <answer>. \
Reply with <thought>...</thought> and then either one <action> or one <answer>.";

const UNUSABLE_ACTION_NUDGE: &str = "Your last <action> could not be used. It must be a JSON \
object such as {\"tool\": \"<tool name>\", \"arguments\": {...}}. Try again or give an <answer>.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on model calls per query.
    pub max_iterations: u32,
    /// Consecutive turns without action or answer tolerated before failing.
    pub max_empty_turns: u32,
    pub system_prompt: Option<String>,
    pub call_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 24,
            max_empty_turns: 2,
            system_prompt: None,
            call_timeout: None,
            tool_timeout: None,
            cancellation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Thought {
        content: String,
    },
    Action {
        tool: String,
        arguments: Value,
    },
    Observation {
        tool: String,
        content: String,
        is_error: bool,
    },
    /// A reply with neither a usable action nor an answer.
    EmptyTurn {
        turn: u32,
        raw_text: String,
    },
    FinalAnswer {
        content: String,
    },
}

#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Vec<ToolSpec>,
    executor: Option<(Arc<dyn ToolExecutor>, Vec<FunctionTool>)>,
    hosted_tools: Vec<HostedToolKind>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn model<M>(mut self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn shared_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Runs tools through an external executor. `tools` describes what it
    /// can run and is rendered into the prompt.
    pub fn executor<E>(mut self, executor: E, tools: Vec<FunctionTool>) -> Self
    where
        E: ToolExecutor + 'static,
    {
        self.executor = Some((Arc::new(executor), tools));
        self
    }

    /// A vendor-run tool declared natively in every request.
    pub fn hosted_tool(mut self, kind: HostedToolKind) -> Self {
        if !self.hosted_tools.contains(&kind) {
            self.hosted_tools.push(kind);
        }
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn max_empty_turns(mut self, max_empty_turns: u32) -> Self {
        self.config.max_empty_turns = max_empty_turns;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = Some(timeout);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(model) = self.model else {
            return Err(AgentError::Config(
                "agent model must be configured via AgentBuilder::model(...)".to_string(),
            ));
        };

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let (executor, functions): (Arc<dyn ToolExecutor>, Vec<FunctionTool>) =
            match self.executor {
                Some(_) if !self.tools.is_empty() => {
                    return Err(AgentError::Config(
                        "register tools on the external executor, not alongside it".to_string(),
                    ));
                }
                Some((executor, functions)) => (executor, functions),
                None => {
                    let mut registry = ToolRegistry::new();
                    for tool in self.tools {
                        registry
                            .register(tool)
                            .map_err(|err| AgentError::Config(err.to_string()))?;
                    }
                    let functions = registry
                        .descriptors()
                        .into_iter()
                        .filter_map(|descriptor| match descriptor {
                            ToolDescriptor::DeveloperManaged(function) => Some(function),
                            ToolDescriptor::ProviderManaged(_) => None,
                        })
                        .collect();
                    (Arc::new(registry), functions)
                }
            };

        let prompt = render_system_prompt(self.config.system_prompt.as_deref(), &functions);

        Ok(Agent {
            model,
            executor,
            functions,
            hosted_tools: self.hosted_tools,
            prompt,
            config: self.config,
            history: Vec::new(),
        })
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    executor: Arc<dyn ToolExecutor>,
    functions: Vec<FunctionTool>,
    hosted_tools: Vec<HostedToolKind>,
    prompt: String,
    config: AgentConfig,
    history: Vec<Message>,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn messages_len(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// System prompt sent with every model call.
    pub fn system_prompt(&self) -> &str {
        &self.prompt
    }

    pub fn tools(&self) -> &[FunctionTool] {
        &self.functions
    }

    pub async fn query(&mut self, user_message: impl Into<String>) -> Result<String, AgentError> {
        let stream = self.query_stream(user_message);
        futures_util::pin_mut!(stream);

        let mut final_answer: Option<String> = None;

        while let Some(event) = stream.next().await {
            match event? {
                AgentEvent::FinalAnswer { content } => final_answer = Some(content),
                AgentEvent::Thought { .. }
                | AgentEvent::Action { .. }
                | AgentEvent::Observation { .. }
                | AgentEvent::EmptyTurn { .. } => {}
            }
        }

        final_answer.ok_or(AgentError::MissingFinalAnswer)
    }

    pub fn query_stream(
        &mut self,
        user_message: impl Into<String>,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
        let user_message = user_message.into();

        try_stream! {
            self.history.push(Message::user(user_message));

            let hosted = self
                .hosted_tools
                .iter()
                .copied()
                .map(ToolDescriptor::hosted)
                .collect::<Vec<_>>();
            let call_options = self.call_options(self.config.call_timeout);
            let mut empty_turns = 0u32;

            for iteration in 1..=self.config.max_iterations {
                self.ensure_not_cancelled()?;

                let request = CompletionRequest::new(self.history.clone())
                    .with_tools(hosted.clone())
                    .with_system_prompt(self.prompt.clone());

                debug!(
                    provider = %self.model.provider(),
                    iteration,
                    messages = self.history.len(),
                    "agent calling model"
                );

                let completion = self
                    .model
                    .invoke_with(&request, &call_options)
                    .await
                    .map_err(agent_error)?;

                let parsed = parse(&completion.raw_text);
                // Vendors reject assistant messages without content.
                if !completion.raw_text.trim().is_empty() {
                    self.history.push(Message::assistant(completion.raw_text.clone()));
                }

                if let Some(thought) = parsed.thought.clone() {
                    yield AgentEvent::Thought { content: thought };
                }

                if let Some(answer) = parsed.answer.clone() {
                    info!(iteration, "agent produced final answer");
                    yield AgentEvent::FinalAnswer { content: answer };
                    return;
                }

                let invocation = match parsed.invocation() {
                    Some(invocation) => invocation,
                    None => {
                        empty_turns += 1;
                        yield AgentEvent::EmptyTurn {
                            turn: empty_turns,
                            raw_text: completion.raw_text,
                        };

                        if empty_turns > self.config.max_empty_turns {
                            warn!(turns = empty_turns, "agent stopped making progress");
                            Err::<(), AgentError>(AgentError::NoProgress { turns: empty_turns })?;
                        }

                        let nudge = if parsed.action.is_some() {
                            UNUSABLE_ACTION_NUDGE
                        } else {
                            EMPTY_TURN_NUDGE
                        };
                        self.history.push(Message::user(nudge));
                        continue;
                    }
                };

                empty_turns = 0;
                yield AgentEvent::Action {
                    tool: invocation.tool.clone(),
                    arguments: invocation.arguments.clone(),
                };

                let (content, is_error) = self.run_tool(&invocation).await?;
                self.history.push(Message::observation(format!(
                    "Observation from `{}`:\n{content}",
                    invocation.tool
                )));

                yield AgentEvent::Observation {
                    tool: invocation.tool,
                    content,
                    is_error,
                };
            }

            warn!(max_iterations = self.config.max_iterations, "agent exhausted iterations");
            Err::<(), AgentError>(AgentError::MaxIterationsReached {
                max_iterations: self.config.max_iterations,
            })?;
        }
    }

    fn call_options(&self, timeout: Option<Duration>) -> CallOptions {
        CallOptions {
            timeout,
            cancellation: self.config.cancellation.clone(),
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), AgentError> {
        match &self.config.cancellation {
            Some(token) if token.is_cancelled() => Err(AgentError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Tool failures become error observations; only timeouts and
    /// cancellation end the run.
    async fn run_tool(&self, invocation: &ToolInvocation) -> Result<(String, bool), AgentError> {
        let options = self.call_options(self.config.tool_timeout);
        let execution = self
            .executor
            .execute(&invocation.tool, invocation.arguments.clone());

        match options.run(execution).await {
            Ok(Ok(output)) => Ok((output.render(), false)),
            Ok(Err(err)) => {
                debug!(tool = %invocation.tool, error = %err, "tool failed");
                Ok((err.to_string(), true))
            }
            Err(Interrupted::TimedOut(after)) => {
                let timeout_ms = after.as_millis() as u64;
                warn!(tool = %invocation.tool, timeout_ms, "tool timed out");
                Err(AgentError::ToolTimedOut {
                    tool: invocation.tool.clone(),
                    timeout_ms,
                })
            }
            Err(Interrupted::Cancelled) => Err(AgentError::Cancelled),
        }
    }
}

fn agent_error(err: ProviderError) -> AgentError {
    match err {
        ProviderError::Cancelled { .. } => AgentError::Cancelled,
        other => AgentError::Provider(other),
    }
}

fn render_system_prompt(preamble: Option<&str>, functions: &[FunctionTool]) -> String {
    let mut prompt = String::new();
    if let Some(preamble) = preamble.map(str::trim).filter(|text| !text.is_empty()) {
        prompt.push_str(preamble);
        prompt.push_str("\n\n");
    }
    prompt.push_str(PROTOCOL);

    if functions.is_empty() {
        prompt.push_str("\n\nNo tools are available. Reply with an <answer>.");
        return prompt;
    }

    prompt.push_str("\n\nAvailable tools:");
    for function in functions {
        prompt.push_str(&format!(
            "\n- {}: {}\n  arguments schema: {}",
            function.name, function.description, function.parameters
        ));
    }
    prompt
}

pub async fn query(
    agent: &mut Agent,
    user_message: impl Into<String>,
) -> Result<String, AgentError> {
    agent.query(user_message).await
}

pub fn query_stream(
    agent: &mut Agent,
    user_message: impl Into<String>,
) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
    agent.query_stream(user_message)
}
