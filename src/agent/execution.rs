//! Execution loop - one bounded think/act/observe cycle per run.
//!
//! Each iteration sends the transcript to the decision interface:
//! 1. `EndTurn` finalizes successfully
//! 2. `ToolUse` runs every requested call sequentially, in order, appending
//!    one tool-role observation per call, then iterates again
//! 3. `MaxTokens` is non-terminal; partial content is kept and the loop continues
//! 4. `Error` or a provider failure ends the run as failed
//!
//! Exhausting `max_iterations` ends the run as failed.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::events::{AgentEvent, EventListener, notify};
use super::result::{ExecutionResult, FailureKind, ToolCallRecord};
use super::worker::Worker;
use crate::bus::AgentBus;
use crate::config::AgentConfig;
use crate::error::{MeshError, Result};
use crate::id::{generate_agent_id, generate_call_id, truncate_chars};
use crate::llm::{CompletionRequest, LlmClient, Message, ProviderRegistry, StopReason, ToolDefinition};
use crate::tools::{ToolRegistry, collaboration_tools};

pub const MAX_ITERATIONS_ERROR: &str = "max_iterations_reached";

/// A tool-using worker driven by an `LlmClient`
pub struct Agent {
    id: String,
    kind: String,
    client: Arc<dyn LlmClient>,
    model: String,
    tools: ToolRegistry,
    tool_tags: Vec<String>,
    instructions: String,
    pub(super) max_iterations: u32,
    max_tokens: u32,
    pub(super) event_buffer: usize,
    listeners: Vec<Arc<dyn EventListener>>,
    bus: Option<Arc<AgentBus>>,
}

/// Delivers events to listeners and, for streaming runs, to a bounded channel
struct Emitter<'a> {
    listeners: &'a [Arc<dyn EventListener>],
    sink: Option<&'a mpsc::Sender<AgentEvent>>,
}

impl Emitter<'_> {
    async fn emit(&self, event: AgentEvent) {
        notify(self.listeners, &event).await;
        if let Some(sink) = self.sink
            && sink.send(event).await.is_err()
        {
            log::debug!("Event receiver dropped; continuing without streaming");
        }
    }
}

impl Agent {
    pub fn builder(kind: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Model name sent to the provider (without any `provider/` prefix)
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn bus(&self) -> Option<&Arc<AgentBus>> {
        self.bus.as_ref()
    }

    /// Render the system prompt, appending a context section when one is given
    pub fn system_prompt(&self, context: Option<&str>) -> String {
        match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("{}\n\n## Context\n{}", self.instructions, context),
            None => self.instructions.clone(),
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let tags: Vec<&str> = self.tool_tags.iter().map(String::as_str).collect();
        self.tools.get_definitions(&[], &tags)
    }

    /// Single question, single completion; no tools and no iteration
    pub async fn ask(&self, question: &str) -> Result<String> {
        let request = CompletionRequest {
            system_prompt: self.system_prompt(None),
            messages: vec![Message::user(question)],
            tools: Vec::new(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
        };
        let response = self.client.complete(request).await.map_err(MeshError::from)?;
        Ok(response.content)
    }

    pub(super) async fn execute(
        &self,
        task: &str,
        context: Option<&str>,
        sink: Option<&mpsc::Sender<AgentEvent>>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let emitter = Emitter {
            listeners: &self.listeners,
            sink,
        };
        let system_prompt = self.system_prompt(context);
        let tools = self.tool_definitions();
        let mut transcript = vec![Message::user(task)];
        let mut result = ExecutionResult::succeeded(&self.id, &self.kind, "");

        log::info!("Agent {} starting: {}", self.id, truncate_chars(task, 100));
        emitter.emit(AgentEvent::start(&self.id, task)).await;

        for iteration in 0..self.max_iterations {
            result.iterations = iteration + 1;
            emitter.emit(AgentEvent::thinking(&self.id, iteration)).await;

            let request = CompletionRequest {
                system_prompt: system_prompt.clone(),
                messages: transcript.clone(),
                tools: tools.clone(),
                model: self.model.clone(),
                max_tokens: self.max_tokens,
            };

            let response = match self.client.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    log::error!("Agent {} failed: {}", self.id, e);
                    emitter.emit(AgentEvent::error(&self.id, &e.to_string())).await;
                    return self.finish_failed(result, FailureKind::Provider, e.to_string(), started);
                }
            };
            result.input_tokens += response.usage.input_tokens;
            result.output_tokens += response.usage.output_tokens;

            match response.stop_reason {
                StopReason::EndTurn => {
                    emitter.emit(AgentEvent::complete(&self.id, &response.content)).await;
                    result.content = response.content;
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    log::info!(
                        "Agent {} completed in {} iteration(s), {} tool call(s)",
                        self.id,
                        result.iterations,
                        result.tool_calls.len()
                    );
                    return result;
                }
                StopReason::ToolUse => {
                    let calls: Vec<_> = response
                        .tool_calls
                        .into_iter()
                        .map(|mut call| {
                            if call.id.is_empty() {
                                call.id = generate_call_id(iteration);
                            }
                            call
                        })
                        .collect();
                    if calls.is_empty() {
                        log::warn!("Agent {} got tool_use with no calls on iteration {}", self.id, iteration);
                    }
                    transcript.push(Message::assistant_with_tools(response.content, calls.clone()));

                    // Later calls may depend on side effects of earlier ones
                    for call in calls {
                        emitter
                            .emit(AgentEvent::tool_call(&self.id, &call.name, &call.arguments))
                            .await;
                        let outcome = self.tools.execute_call(&call).await;
                        emitter
                            .emit(AgentEvent::tool_result(
                                &self.id,
                                &call.name,
                                outcome.success,
                                &outcome.output,
                            ))
                            .await;
                        transcript.push(Message::tool(&call.id, outcome.observation()));
                        result.tool_calls.push(ToolCallRecord {
                            id: call.id,
                            name: call.name,
                            arguments: call.arguments,
                            iteration,
                            success: outcome.success,
                        });
                    }
                }
                StopReason::MaxTokens => {
                    log::warn!("Agent {} hit max_tokens on iteration {}", self.id, iteration);
                    if !response.content.is_empty() {
                        transcript.push(Message::assistant(response.content));
                    }
                }
                StopReason::Error => {
                    let error = if response.content.is_empty() {
                        "provider reported an error".to_string()
                    } else {
                        response.content
                    };
                    log::error!("Agent {} stopped with error: {}", self.id, error);
                    emitter.emit(AgentEvent::error(&self.id, &error)).await;
                    return self.finish_failed(result, FailureKind::StopError, error, started);
                }
            }
        }

        log::warn!("Agent {} exhausted {} iterations", self.id, self.max_iterations);
        emitter.emit(AgentEvent::error(&self.id, MAX_ITERATIONS_ERROR)).await;
        result.content = "Maximum iterations reached without completion.".to_string();
        self.finish_failed(result, FailureKind::IterationLimit, MAX_ITERATIONS_ERROR.to_string(), started)
    }

    fn finish_failed(
        &self,
        mut result: ExecutionResult,
        failure: FailureKind,
        error: String,
        started: Instant,
    ) -> ExecutionResult {
        result.success = false;
        result.failure = Some(failure);
        result.error = Some(error);
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}

#[async_trait]
impl Worker for Agent {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    async fn run(&self, task: &str, context: Option<&str>) -> ExecutionResult {
        self.execute(task, context, None).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("provider", &self.client.name())
            .field("model", &self.model)
            .field("tools", &self.tools.available())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

/// Builder for `Agent`
pub struct AgentBuilder {
    kind: String,
    id: Option<String>,
    client: Option<Arc<dyn LlmClient>>,
    providers: Option<ProviderRegistry>,
    model: String,
    tools: ToolRegistry,
    tool_tags: Vec<String>,
    instructions: Option<String>,
    max_iterations: u32,
    max_tokens: u32,
    event_buffer: usize,
    listeners: Vec<Arc<dyn EventListener>>,
    bus: Option<Arc<AgentBus>>,
}

impl AgentBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            kind: kind.into(),
            id: None,
            client: None,
            providers: None,
            model: defaults.model,
            tools: ToolRegistry::new(),
            tool_tags: Vec::new(),
            instructions: None,
            max_iterations: defaults.max_iterations,
            max_tokens: defaults.max_tokens,
            event_buffer: defaults.event_buffer,
            listeners: Vec::new(),
            bus: None,
        }
    }

    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.model = config.model.clone();
        self.max_iterations = config.max_iterations;
        self.max_tokens = config.max_tokens;
        self.event_buffer = config.event_buffer;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Use this client directly; any `provider/` prefix on the model is stripped
    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Resolve the client from the model id at build time
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Only expose tools carrying one of these tags to the decision interface
    pub fn with_tool_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Attach a bus; its collaboration tools are merged behind the agent's own tools
    pub fn with_bus(mut self, bus: Arc<AgentBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let id = self.id.unwrap_or_else(|| generate_agent_id(&self.kind));

        let (client, model) = match (self.client, &self.providers) {
            (Some(client), _) => {
                let model = match self.model.split_once('/') {
                    Some((_, model)) => model.to_string(),
                    None => self.model.clone(),
                };
                (client, model)
            }
            (None, Some(providers)) => providers.resolve(&self.model)?,
            (None, None) => return Err(MeshError::UnknownProvider(self.model)),
        };

        let mut tools = self.tools;
        if let Some(bus) = &self.bus {
            tools.merge(&collaboration_tools(Arc::clone(bus), &id)?);
        }

        let instructions = self.instructions.unwrap_or_else(|| {
            format!(
                "You are a {} agent. Complete the task, using the available tools when they help.",
                self.kind
            )
        });

        log::debug!("Built agent {} ({} via {}, {} tools)", id, model, client.name(), tools.len());
        Ok(Agent {
            id,
            kind: self.kind,
            client,
            model,
            tools,
            tool_tags: self.tool_tags,
            instructions,
            max_iterations: self.max_iterations.max(1),
            max_tokens: self.max_tokens,
            event_buffer: self.event_buffer.max(1),
            listeners: self.listeners,
            bus: self.bus,
        })
    }
}
