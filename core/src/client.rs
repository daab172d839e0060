use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::ToolCall;
use crate::models::TurnRecord;

/// API request payload for a single model turn.
#[derive(Default, Debug, Clone)]
pub struct Prompt {
    /// System preamble sent ahead of the message log.
    pub instructions: String,

    /// Conversation context input items.
    pub input: Vec<TurnRecord>,

    /// Tool schemas in the Chat Completions wire format.
    pub tools: Vec<Value>,
}

/// What the completion service decided for one turn.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: Option<String>,

    /// Tool calls in the order the service listed them. The dispatch loop
    /// honours only the first.
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            text: None,
            tool_calls: vec![call],
        }
    }
}

/// The completion service. Implementations own their transport, timeouts and
/// retry policy; a returned error means the turn cannot continue.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<ModelResponse>;
}
