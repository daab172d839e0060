//! Direct parameter tweaks that skip the completion service.
//!
//! A short imperative such as `colormap plasma` or `median width 2.5` maps to
//! exactly one parameter of the most recent visualization. When it matches,
//! the visualization tool is re-run with the updated parameters and the model
//! is never consulted.

use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::error_journal::ErrorJournal;
use crate::models::RecordSource;
use crate::models::TurnRecord;
use crate::state::ConversationState;
use crate::state::VisualizationConfig;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutcome;
use crate::tools::registry::ToolRegistry;

/// Visualization parameters the command grammar can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisParameter {
    Palette,
    Percentile,
    Isovalue,
    ShowMedian,
    ShowOutliers,
    MedianColor,
    MedianWidth,
    MedianAlpha,
    OutliersColor,
    OutliersWidth,
    OutliersAlpha,
    Scale,
    Alpha,
}

impl VisParameter {
    /// Key the parameter is stored under in a visualization config.
    pub fn as_str(self) -> &'static str {
        match self {
            VisParameter::Palette => "palette",
            VisParameter::Percentile => "percentile",
            VisParameter::Isovalue => "isovalue",
            VisParameter::ShowMedian => "show_median",
            VisParameter::ShowOutliers => "show_outliers",
            VisParameter::MedianColor => "median_color",
            VisParameter::MedianWidth => "median_width",
            VisParameter::MedianAlpha => "median_alpha",
            VisParameter::OutliersColor => "outliers_color",
            VisParameter::OutliersWidth => "outliers_width",
            VisParameter::OutliersAlpha => "outliers_alpha",
            VisParameter::Scale => "scale",
            VisParameter::Alpha => "alpha",
        }
    }
}

impl fmt::Display for VisParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl ParameterValue {
    pub fn to_json(&self) -> Value {
        match self {
            ParameterValue::Text(text) => Value::String(text.clone()),
            ParameterValue::Number(number) => serde_json::Number::from_f64(*number)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParameterValue::Flag(flag) => Value::Bool(*flag),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Text(text) => f.write_str(text),
            ParameterValue::Number(number) => write!(f, "{number}"),
            ParameterValue::Flag(true) => f.write_str("on"),
            ParameterValue::Flag(false) => f.write_str("off"),
        }
    }
}

/// A parsed parameter tweak.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommand {
    pub parameter: VisParameter,
    pub value: ParameterValue,
}

impl SimpleCommand {
    /// Writes the value into `parameters`, replacing any previous one.
    pub fn apply(&self, parameters: &mut Map<String, Value>) {
        parameters.insert(self.parameter.as_str().to_string(), self.value.to_json());
    }
}

#[derive(Clone, Copy)]
enum ValueShape {
    Text,
    Number,
    /// The first capture is `show` or `hide`.
    Toggle,
}

struct CommandRule {
    pattern: &'static str,
    parameter: VisParameter,
    shape: ValueShape,
}

const NUMBER: &str = r"([-+]?(?:\d+(?:\.\d*)?|\.\d+))";
const NAME: &str = r"([A-Za-z0-9_#\-]+)";

const RULES: &[CommandRule] = &[
    CommandRule {
        pattern: r"^colormap\s+{NAME}$",
        parameter: VisParameter::Palette,
        shape: ValueShape::Text,
    },
    CommandRule {
        pattern: r"^percentile\s+{NUMBER}$",
        parameter: VisParameter::Percentile,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^isovalue\s+{NUMBER}$",
        parameter: VisParameter::Isovalue,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^(show|hide)\s+median$",
        parameter: VisParameter::ShowMedian,
        shape: ValueShape::Toggle,
    },
    CommandRule {
        pattern: r"^(show|hide)\s+outliers$",
        parameter: VisParameter::ShowOutliers,
        shape: ValueShape::Toggle,
    },
    CommandRule {
        pattern: r"^median\s+color\s+{NAME}$",
        parameter: VisParameter::MedianColor,
        shape: ValueShape::Text,
    },
    CommandRule {
        pattern: r"^median\s+width\s+{NUMBER}$",
        parameter: VisParameter::MedianWidth,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^median\s+alpha\s+{NUMBER}$",
        parameter: VisParameter::MedianAlpha,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^outliers\s+color\s+{NAME}$",
        parameter: VisParameter::OutliersColor,
        shape: ValueShape::Text,
    },
    CommandRule {
        pattern: r"^outliers\s+width\s+{NUMBER}$",
        parameter: VisParameter::OutliersWidth,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^outliers\s+alpha\s+{NUMBER}$",
        parameter: VisParameter::OutliersAlpha,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^scale\s+{NUMBER}$",
        parameter: VisParameter::Scale,
        shape: ValueShape::Number,
    },
    CommandRule {
        pattern: r"^alpha\s+{NUMBER}$",
        parameter: VisParameter::Alpha,
        shape: ValueShape::Number,
    },
];

struct CompiledRule {
    regex: Regex,
    parameter: VisParameter,
    shape: ValueShape,
}

static COMPILED_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|rule| {
            let pattern = format!(
                "(?i){}",
                rule.pattern
                    .replace("{NUMBER}", NUMBER)
                    .replace("{NAME}", NAME)
            );
            match Regex::new(&pattern) {
                Ok(regex) => Some(CompiledRule {
                    regex,
                    parameter: rule.parameter,
                    shape: rule.shape,
                }),
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "skipping invalid command pattern");
                    None
                }
            }
        })
        .collect()
});

/// Recognizes the closed grammar of parameter commands. Matching is
/// case-insensitive and ignores surrounding whitespace; values keep the case
/// the user typed.
#[derive(Debug, Default, Clone)]
pub struct CommandParser;

impl CommandParser {
    /// Returns `None` for anything outside the grammar.
    pub fn parse(&self, input: &str) -> Option<SimpleCommand> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        COMPILED_RULES.iter().find_map(|rule| {
            let captures = rule.regex.captures(input)?;
            let raw = captures.get(1)?.as_str();
            let value = match rule.shape {
                ValueShape::Text => ParameterValue::Text(raw.to_string()),
                ValueShape::Number => {
                    ParameterValue::Number(raw.parse::<f64>().ok().filter(|n| n.is_finite())?)
                }
                ValueShape::Toggle => ParameterValue::Flag(raw.eq_ignore_ascii_case("show")),
            };
            Some(SimpleCommand {
                parameter: rule.parameter,
                value,
            })
        })
    }
}

/// What happened when an utterance was offered to the fast path.
#[derive(Debug, Clone, PartialEq)]
pub enum FastPathResult {
    /// There is no visualization to tweak.
    NoVisualization,
    /// The utterance is not a parameter command.
    NoMatch,
    /// The visualization was re-rendered with the new parameter.
    Applied(SimpleCommand),
    /// The command parsed but the re-render did not succeed. State is
    /// unchanged.
    Failed(String),
}

impl FastPathResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, FastPathResult::Applied(_))
    }
}

/// Applies parsed commands against the last visualization by re-invoking the
/// tool that produced it.
pub struct FastPath {
    parser: CommandParser,
    registry: Arc<ToolRegistry>,
}

impl FastPath {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            parser: CommandParser,
            registry,
        }
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// Tries to satisfy `utterance` without the model. Only an `Applied`
    /// result touches `state` or `journal`.
    pub async fn try_apply(
        &self,
        utterance: &str,
        state: &mut ConversationState,
        journal: &mut ErrorJournal,
    ) -> FastPathResult {
        let Some(last) = state.last_visualization() else {
            return FastPathResult::NoVisualization;
        };
        let Some(command) = self.parser.parse(utterance) else {
            return FastPathResult::NoMatch;
        };

        let tool_name = last.tool_name.clone();
        let Some(entry) = self.registry.get(&tool_name) else {
            warn!(tool = %tool_name, "last visualization tool is no longer registered");
            return FastPathResult::Failed(format!("tool {tool_name} is not registered"));
        };

        let mut parameters = last.parameters.clone();
        command.apply(&mut parameters);

        let invocation = ToolInvocation {
            call_id: format!("fastpath_{}", Uuid::new_v4()),
            tool_name: tool_name.clone(),
            arguments: parameters.clone(),
            current_artifact: state.current_artifact_path().map(str::to_string),
        };
        debug!(
            tool = %tool_name,
            parameter = command.parameter.as_str(),
            "re-running visualization from fast path"
        );

        let (message, payload) = match entry.handler.handle(invocation).await {
            Ok(ToolOutcome::Success { message, payload }) => (message, payload),
            Ok(ToolOutcome::Failure { message, .. }) => {
                warn!(tool = %tool_name, %message, "fast path re-render failed; falling back");
                return FastPathResult::Failed(message);
            }
            Err(fault) => {
                warn!(
                    tool = %tool_name,
                    error = %fault,
                    "fast path re-render faulted; falling back"
                );
                return FastPathResult::Failed(fault.to_string());
            }
        };

        state.push_message(TurnRecord::user(utterance).with_source(RecordSource::FastPath));
        if let Some(error_id) = state.record_tool_success(&tool_name) {
            if journal.mark_auto_fixed(error_id) {
                info!(tool = %tool_name, error_id, "auto-fix detected");
            }
        }
        state.set_visualization(VisualizationConfig {
            tool_name: tool_name.clone(),
            parameters: parameters.clone(),
        });
        state.apply_payload(
            &tool_name,
            entry.category,
            entry.contract,
            payload,
            &parameters,
        );

        let mut confirmation = format!("Set {} to {}.", command.parameter, command.value);
        if !message.is_empty() {
            confirmation.push(' ');
            confirmation.push_str(&message);
        }
        state.push_message(
            TurnRecord::assistant(confirmation).with_source(RecordSource::FastPath),
        );

        FastPathResult::Applied(command)
    }
}
