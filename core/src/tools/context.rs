use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Everything a tool executor receives for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    /// The most recent data artifact, for tools that consume it.
    pub current_artifact: Option<String>,
}

/// Category a tool is registered under. Dispatch switches on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Data,
    Visualization,
    Statistics,
    Analysis,
}

impl ToolCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolCategory::Data => "data",
            ToolCategory::Visualization => "visualization",
            ToolCategory::Statistics => "statistics",
            ToolCategory::Analysis => "analysis",
        }
    }

    pub fn default_contract(self) -> ResultContract {
        match self {
            ToolCategory::Data => ResultContract::Artifact,
            ToolCategory::Visualization => ResultContract::VisualizationConfig,
            ToolCategory::Statistics => ResultContract::Statistics,
            ToolCategory::Analysis => ResultContract::Analysis,
        }
    }
}

/// Shape of payload a tool promises to return on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultContract {
    Artifact,
    VisualizationConfig,
    Statistics,
    Analysis,
    /// The tool only reports a message; nothing is merged into state.
    MessageOnly,
}

impl ResultContract {
    pub fn accepts(self, payload: &ToolPayload) -> bool {
        matches!(
            (self, payload),
            (ResultContract::Artifact, ToolPayload::Data(_))
                | (ResultContract::VisualizationConfig, ToolPayload::Visualization(_))
                | (ResultContract::Statistics, ToolPayload::Statistics(_))
                | (ResultContract::Analysis, ToolPayload::Analysis(_))
                | (ResultContract::MessageOnly, ToolPayload::None)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    pub artifact_path: String,
    #[serde(default)]
    pub summary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationPayload {
    /// Effective parameters the plot was rendered with.
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsPayload {
    pub values: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub report: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolPayload {
    #[default]
    None,
    Data(DataPayload),
    Visualization(VisualizationPayload),
    Statistics(StatisticsPayload),
    Analysis(AnalysisPayload),
}

/// Why a tool reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidArguments,
    MissingArtifact,
    Computation,
    Other,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::MissingArtifact => "missing_artifact",
            FailureKind::Computation => "computation",
            FailureKind::Other => "other",
        }
    }
}

/// Result of a tool call that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success {
        message: String,
        payload: ToolPayload,
    },
    Failure {
        kind: FailureKind,
        /// Short, non-technical text shown to the model and the user.
        message: String,
        /// Raw diagnostic text (tracebacks, stderr), surfaced only in debug mode.
        diagnostic: Option<String>,
    },
}

impl ToolOutcome {
    pub fn success(message: impl Into<String>, payload: ToolPayload) -> Self {
        ToolOutcome::Success {
            message: message.into(),
            payload,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            kind,
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(self, text: impl Into<String>) -> Self {
        match self {
            ToolOutcome::Failure { kind, message, .. } => ToolOutcome::Failure {
                kind,
                message,
                diagnostic: Some(text.into()),
            },
            other => other,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}
