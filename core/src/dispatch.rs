//! The Model/Execute loop that runs one full-path turn.
//!
//! Each turn ping-pongs between asking the completion service what to do and
//! executing the single tool it asked for, until the model answers in prose,
//! names a tool the registry does not know, or too many tool calls in a row
//! fail. Tool failures never escape this loop: they are journalled and fed
//! back to the model as tool results. Only a completion-service error
//! propagates to the caller, leaving everything recorded so far in place.

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::client::ModelClient;
use crate::client::ModelResponse;
use crate::client::Prompt;
use crate::config::Config;
use crate::error::Result;
use crate::error_journal::ErrorDetails;
use crate::error_journal::ErrorJournal;
use crate::error_journal::ErrorKind;
use crate::models::RecordSource;
use crate::models::ToolCall;
use crate::models::ToolResultRef;
use crate::models::TurnRecord;
use crate::state::ConversationState;
use crate::tools::context::FailureKind;
use crate::tools::context::ToolCategory;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutcome;
use crate::tools::registry::ToolRegistry;
use crate::util::truncate_for_log;

const LOG_PREVIEW_CHARS: usize = 400;

/// How a full-path turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    /// The model replied without requesting a tool.
    Answered,
    /// The model requested a tool that is not registered.
    UnknownTool,
    /// Too many consecutive tool failures.
    CircuitBreakerTripped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchState {
    Model,
    Execute {
        category: ToolCategory,
        call: ToolCall,
    },
    End(TurnEnd),
}

/// Per-session output switches, toggled by `/debug` and `/verbose`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputMode {
    /// Include raw tool diagnostics in the tool results the model sees.
    pub debug: bool,
    /// Log tool arguments and results at `info` instead of `trace`.
    pub verbose: bool,
}

/// What the dispatch loop tells the model and the journal about one failed
/// tool call.
struct ToolFailure {
    kind: ErrorKind,
    category: Option<FailureKind>,
    raw_message: String,
    diagnostic: Option<String>,
    user_message: String,
}

pub struct ToolDispatchGraph {
    client: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    instructions: String,
    circuit_breaker_threshold: u32,
}

impl ToolDispatchGraph {
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        instructions: impl Into<String>,
        circuit_breaker_threshold: u32,
    ) -> Self {
        Self {
            client,
            registry,
            instructions: instructions.into(),
            circuit_breaker_threshold: circuit_breaker_threshold.max(1),
        }
    }

    pub fn from_config(
        config: &Config,
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self::new(
            client,
            registry,
            config.instructions.clone(),
            config.circuit_breaker_threshold,
        )
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn circuit_breaker_threshold(&self) -> u32 {
        self.circuit_breaker_threshold
    }

    /// Runs one turn over a message log that already ends with the user's
    /// utterance.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        journal: &mut ErrorJournal,
        mode: OutputMode,
    ) -> Result<TurnEnd> {
        state.begin_turn();
        let mut current = DispatchState::Model;
        loop {
            current = match current {
                DispatchState::Model => {
                    let prompt = self.build_prompt(state);
                    let response = self.client.complete(&prompt).await?;
                    self.on_model_response(response, state, journal)
                }
                DispatchState::Execute { category, call } => {
                    self.execute(category, call, state, journal, mode).await
                }
                DispatchState::End(end) => {
                    debug!(?end, messages = state.messages().len(), "turn ended");
                    return Ok(end);
                }
            };
        }
    }

    fn build_prompt(&self, state: &ConversationState) -> Prompt {
        Prompt {
            instructions: self.instructions.clone(),
            input: state.messages().to_vec(),
            tools: self.registry.tools_json(),
        }
    }

    fn on_model_response(
        &self,
        response: ModelResponse,
        state: &mut ConversationState,
        journal: &mut ErrorJournal,
    ) -> DispatchState {
        let ModelResponse { text, tool_calls } = response;

        let mut calls = tool_calls.into_iter();
        let Some(call) = calls.next() else {
            state.push_message(TurnRecord::assistant(text.unwrap_or_default()));
            return DispatchState::End(TurnEnd::Answered);
        };
        let ignored: Vec<String> = calls.map(|extra| extra.name).collect();
        if !ignored.is_empty() {
            debug!(
                honoured = call.name.as_str(),
                ?ignored,
                "model requested several tools; only the first runs this round"
            );
        }

        state.push_message(TurnRecord::assistant_tool_call(
            text.unwrap_or_default(),
            call.clone(),
        ));

        match self.registry.category_of(&call.name) {
            Some(category) => DispatchState::Execute { category, call },
            None => {
                warn!(tool = call.name.as_str(), "model requested an unknown tool");
                let user_message = format!("There is no tool named `{}`.", call.name);
                let record = journal.record(
                    &call.name,
                    ErrorDetails {
                        kind: ErrorKind::ToolNotFound,
                        category: None,
                        raw_message: format!("unsupported call: {}", call.name),
                        diagnostic: None,
                        user_message: user_message.clone(),
                    },
                    state.snapshot(&call.arguments),
                );
                let error_id = record.id;
                state.push_message(TurnRecord::tool_result(
                    user_message,
                    ToolResultRef {
                        call_id: call.call_id,
                        tool_name: call.name.clone(),
                        success: false,
                        error_id: Some(error_id),
                    },
                ));
                state.push_message(TurnRecord::assistant(format!(
                    "I tried to use `{}`, but no such tool is available.",
                    call.name
                )));
                DispatchState::End(TurnEnd::UnknownTool)
            }
        }
    }

    async fn execute(
        &self,
        category: ToolCategory,
        call: ToolCall,
        state: &mut ConversationState,
        journal: &mut ErrorJournal,
        mode: OutputMode,
    ) -> DispatchState {
        let Some(entry) = self.registry.get(&call.name) else {
            // category_of() resolved this name a moment ago and the registry
            // is immutable.
            return DispatchState::End(TurnEnd::UnknownTool);
        };

        if mode.verbose {
            info!(
                tool = call.name.as_str(),
                call_id = call.call_id.as_str(),
                category = category.as_str(),
                arguments = %truncate_for_log(&call.arguments, LOG_PREVIEW_CHARS),
                "executing tool"
            );
        } else {
            trace!(
                tool = call.name.as_str(),
                call_id = call.call_id.as_str(),
                arguments = call.arguments.as_str(),
                "executing tool"
            );
        }

        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(failure) => return self.on_failure(&call, failure, state, journal, mode),
        };

        let invocation = ToolInvocation {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            arguments,
            current_artifact: state.current_artifact_path().map(str::to_string),
        };
        let arguments = invocation.arguments.clone();

        match entry.handler.handle(invocation).await {
            Ok(ToolOutcome::Success { message, payload }) => {
                if mode.verbose {
                    info!(tool = call.name.as_str(), %message, "tool succeeded");
                } else {
                    trace!(tool = call.name.as_str(), %message, "tool succeeded");
                }
                if let Some(error_id) = state.record_tool_success(&call.name) {
                    if journal.mark_auto_fixed(error_id) {
                        info!(tool = call.name.as_str(), error_id, "auto-fix detected");
                    }
                }
                state.apply_payload(
                    entry.name(),
                    entry.category,
                    entry.contract,
                    payload,
                    &arguments,
                );
                state.push_message(TurnRecord::tool_result(
                    message,
                    ToolResultRef {
                        call_id: call.call_id,
                        tool_name: call.name,
                        success: true,
                        error_id: None,
                    },
                ));
                DispatchState::Model
            }
            Ok(ToolOutcome::Failure {
                kind,
                message,
                diagnostic,
            }) => {
                let failure = ToolFailure {
                    kind: ErrorKind::ToolExecutionFailure,
                    category: Some(kind),
                    raw_message: message.clone(),
                    diagnostic,
                    user_message: message,
                };
                self.on_failure(&call, failure, state, journal, mode)
            }
            Err(fault) => {
                warn!(tool = call.name.as_str(), error = %fault, "tool raised unexpectedly");
                let failure = ToolFailure {
                    kind: ErrorKind::ToolExecutionException,
                    category: None,
                    raw_message: fault.to_string(),
                    diagnostic: Some(format!("{fault:?}")),
                    user_message: format!("The `{}` tool stopped unexpectedly.", call.name),
                };
                self.on_failure(&call, failure, state, journal, mode)
            }
        }
    }

    fn on_failure(
        &self,
        call: &ToolCall,
        failure: ToolFailure,
        state: &mut ConversationState,
        journal: &mut ErrorJournal,
        mode: OutputMode,
    ) -> DispatchState {
        let ToolFailure {
            kind,
            category,
            raw_message,
            diagnostic,
            user_message,
        } = failure;

        let content = match (&diagnostic, mode.debug) {
            (Some(diagnostic), true) => format!("{user_message}\n\nDiagnostic:\n{diagnostic}"),
            _ => user_message.clone(),
        };

        let record = journal.record(
            &call.name,
            ErrorDetails {
                kind,
                category,
                raw_message,
                diagnostic,
                user_message: user_message.clone(),
            },
            state.snapshot(&call.arguments),
        );
        let error_id = record.id;

        let consecutive_errors = state.record_tool_failure(&call.name, Some(error_id));
        warn!(
            tool = call.name.as_str(),
            kind = kind.as_str(),
            error_id,
            consecutive_errors,
            "tool call failed"
        );

        state.push_message(TurnRecord::tool_result(
            content,
            ToolResultRef {
                call_id: call.call_id.clone(),
                tool_name: call.name.clone(),
                success: false,
                error_id: Some(error_id),
            },
        ));

        if consecutive_errors >= self.circuit_breaker_threshold {
            warn!(
                tool = call.name.as_str(),
                consecutive_errors,
                threshold = self.circuit_breaker_threshold,
                "circuit breaker tripped"
            );
            state.push_message(
                TurnRecord::assistant(format!(
                    "I stopped after {consecutive_errors} consecutive tool failures. \
                     The last one was: {user_message} \
                     Try rephrasing the request, or use /errors to see what went wrong."
                ))
                .with_source(RecordSource::CircuitBreaker),
            );
            return DispatchState::End(TurnEnd::CircuitBreakerTripped);
        }
        DispatchState::Model
    }
}

/// Tool arguments must be a JSON object. An empty string stands for no
/// arguments.
fn parse_arguments(raw: &str) -> std::result::Result<Map<String, Value>, ToolFailure> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let invalid = |detail: String| ToolFailure {
        kind: ErrorKind::ToolExecutionFailure,
        category: Some(FailureKind::InvalidArguments),
        raw_message: detail.clone(),
        diagnostic: Some(detail),
        user_message: "The tool arguments were not a JSON object.".to_string(),
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(invalid(format!("expected a JSON object, got: {other}"))),
        Err(e) => Err(invalid(format!("failed to parse tool arguments: {e}"))),
    }
}
