#![allow(clippy::expect_used)]

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use tempfile::TempDir;

use vischat_core::ArtifactStore;
use vischat_core::ConversationSession;
use vischat_core::ModelClient;
use vischat_core::ModelResponse;
use vischat_core::Prompt;
use vischat_core::ToolFault;
use vischat_core::VischatErr;
use vischat_core::config::Config;
use vischat_core::config::ConfigOverrides;
use vischat_core::config::ConfigToml;
use vischat_core::error::Result;
use vischat_core::models::ToolCall;
use vischat_core::tools::JsonSchema;
use vischat_core::tools::ToolHandler;
use vischat_core::tools::ToolInvocation;
use vischat_core::tools::ToolOutcome;
use vischat_core::tools::ToolPayload;
use vischat_core::tools::ToolRegistry;
use vischat_core::tools::ToolSpec;
use vischat_core::tools::context::DataPayload;
use vischat_core::tools::context::FailureKind;
use vischat_core::tools::context::VisualizationPayload;

pub fn load_default_config_for_test(vischat_home: &TempDir) -> Config {
    Config::load_from_base_config_with_overrides(
        ConfigToml::default(),
        ConfigOverrides::default(),
        vischat_home.path().to_path_buf(),
    )
    .expect("defaults for test should always succeed")
}

/// A model that replays queued responses in order and records every prompt
/// it was sent. Once the queue is empty every further call fails as
/// unreachable, so an unexpected extra round trip shows up as an error.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ModelResponse>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: ModelResponse) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(response));
    }

    pub fn push_error(&self, error: VischatErr) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("responses lock").len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, prompt: &Prompt) -> Result<ModelResponse> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.clone());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(VischatErr::ModelUnreachable(
                    "scripted model has no more responses".to_string(),
                ))
            })
    }
}

type Behaviour = dyn Fn(&ToolInvocation, usize) -> std::result::Result<ToolOutcome, ToolFault>
    + Send
    + Sync;

/// A tool whose result is computed by a closure from the invocation and the
/// zero-based call number. Every invocation is recorded.
pub struct RecordingTool {
    behaviour: Box<Behaviour>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl RecordingTool {
    pub fn new<F>(behaviour: F) -> Arc<Self>
    where
        F: Fn(&ToolInvocation, usize) -> std::result::Result<ToolOutcome, ToolFault>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            behaviour: Box::new(behaviour),
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().expect("invocations lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.invocations.lock().expect("invocations lock").len()
    }
}

#[async_trait]
impl ToolHandler for RecordingTool {
    async fn handle(
        &self,
        invocation: ToolInvocation,
    ) -> std::result::Result<ToolOutcome, ToolFault> {
        let call_number = {
            let mut invocations = self.invocations.lock().expect("invocations lock");
            invocations.push(invocation.clone());
            invocations.len() - 1
        };
        (self.behaviour)(&invocation, call_number)
    }
}

/// Artifact store that keeps paths in memory. Paths listed as failing cannot
/// be deleted.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    deleted: Mutex<Vec<String>>,
    failing: BTreeSet<String>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            deleted: Mutex::new(Vec::new()),
            failing: paths.iter().map(|path| (*path).to_string()).collect(),
        })
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn delete(&self, path: &str) -> io::Result<()> {
        if self.failing.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot delete {path}"),
            ));
        }
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(path.to_string());
        Ok(())
    }
}

pub fn tool_call(call_id: &str, name: &str, arguments: Value) -> ModelResponse {
    ModelResponse::tool_call(ToolCall {
        call_id: call_id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    })
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn session_for_test(
    config: &Config,
    model: Arc<ScriptedModel>,
    registry: ToolRegistry,
    store: Arc<InMemoryArtifactStore>,
) -> ConversationSession {
    ConversationSession::new(config, model, Arc::new(registry), store)
}

/// Data tool that writes `/tmp/vischat/curves_<n>.npy` for every call.
pub fn generate_curves_tool() -> Arc<RecordingTool> {
    RecordingTool::new(|invocation, call_number| {
        let n_curves = invocation
            .arguments
            .get("n_curves")
            .and_then(Value::as_u64)
            .unwrap_or(10);
        Ok(ToolOutcome::success(
            format!("Generated {n_curves} curves."),
            ToolPayload::Data(DataPayload {
                artifact_path: format!("/tmp/vischat/curves_{call_number}.npy"),
                summary: None,
            }),
        ))
    })
}

/// Visualization tool that renders whatever parameters it is given.
pub fn boxplot_tool() -> Arc<RecordingTool> {
    RecordingTool::new(|invocation, call_number| {
        Ok(ToolOutcome::success(
            "Plotted the functional boxplot.",
            ToolPayload::Visualization(VisualizationPayload {
                parameters: invocation.arguments.clone(),
                output_path: Some(format!("/tmp/vischat/boxplot_{call_number}.png")),
            }),
        ))
    })
}

/// A tool that always reports a computation failure with a diagnostic.
pub fn failing_tool(message: &'static str) -> Arc<RecordingTool> {
    RecordingTool::new(move |_, _| {
        Ok(ToolOutcome::failure(FailureKind::Computation, message)
            .with_diagnostic("Traceback (most recent call last): ValueError"))
    })
}

pub fn spec(name: &str) -> ToolSpec {
    ToolSpec::new(name, format!("{name} test tool"), JsonSchema::empty_object())
}
