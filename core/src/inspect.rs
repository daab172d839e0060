//! Slash commands that inspect a session without driving the model.
//!
//! Only `/debug`, `/verbose`, `/reset` and `/clear` change anything; the rest
//! read the conversation state and the error journal.

use std::fmt::Write as _;

use thiserror::Error;

use crate::error_journal::ErrorRecord;
use crate::session::ConversationSession;
use crate::state::ContextSummary;
use crate::state::ExecutionStats;

const RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectCommand {
    Context,
    Stats,
    Errors,
    Trace(u64),
    Debug(bool),
    Verbose(bool),
    Reset,
    Clear,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InspectParseError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl InspectCommand {
    /// Parses a slash command. Returns `None` when `input` is not one, so the
    /// caller can send it to the conversation instead.
    pub fn parse(input: &str) -> Option<Result<Self, InspectParseError>> {
        let rest = input.trim().strip_prefix('/')?;
        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();
        let extra = words.next();

        let parsed = match (name.as_str(), arg, extra) {
            ("context", None, None) => Ok(InspectCommand::Context),
            ("stats", None, None) => Ok(InspectCommand::Stats),
            ("errors", None, None) => Ok(InspectCommand::Errors),
            ("reset", None, None) => Ok(InspectCommand::Reset),
            ("clear", None, None) => Ok(InspectCommand::Clear),
            ("help", None, None) => Ok(InspectCommand::Help),
            ("trace", Some(id), None) => id
                .trim_start_matches('#')
                .parse()
                .map(InspectCommand::Trace)
                .map_err(|_| InspectParseError::Usage("/trace <id>")),
            ("trace", _, _) => Err(InspectParseError::Usage("/trace <id>")),
            ("debug", Some(value), None) => parse_switch(value)
                .map(InspectCommand::Debug)
                .ok_or(InspectParseError::Usage("/debug on|off")),
            ("debug", _, _) => Err(InspectParseError::Usage("/debug on|off")),
            ("verbose", Some(value), None) => parse_switch(value)
                .map(InspectCommand::Verbose)
                .ok_or(InspectParseError::Usage("/verbose on|off")),
            ("verbose", _, _) => Err(InspectParseError::Usage("/verbose on|off")),
            (
                "context" | "stats" | "errors" | "reset" | "clear" | "help",
                _,
                _,
            ) => Err(InspectParseError::Usage("command takes no arguments")),
            (other, _, _) => Err(InspectParseError::Unknown(other.to_string())),
        };
        Some(parsed)
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Runs `command` against `session` and returns the text to show the user.
pub async fn run_inspect(session: &mut ConversationSession, command: InspectCommand) -> String {
    match command {
        InspectCommand::Context => render_context(&session.context_summary()),
        InspectCommand::Stats => render_stats(&session.stats()),
        InspectCommand::Errors => render_errors(
            session.journal().recent(RECENT_ERRORS),
            session.mode().debug,
        ),
        InspectCommand::Trace(id) => match session.journal().get_by_id(id) {
            Some(record) => render_trace(record),
            None => format!("No error #{id} in the journal."),
        },
        InspectCommand::Debug(on) => {
            session.set_debug(on);
            format!("Debug mode {}.", if on { "on" } else { "off" })
        }
        InspectCommand::Verbose(on) => {
            session.set_verbose(on);
            format!("Verbose mode {}.", if on { "on" } else { "off" })
        }
        InspectCommand::Reset => {
            session.reset();
            "Conversation reset. Files were kept.".to_string()
        }
        InspectCommand::Clear => {
            let report = session.clear().await;
            let mut out = format!(
                "Conversation cleared. Removed {} artifact(s).",
                report.removed
            );
            for (path, reason) in &report.failed {
                let _ = write!(out, "\n  could not remove {path}: {reason}");
            }
            out
        }
        InspectCommand::Help => HELP.to_string(),
    }
}

const HELP: &str = "\
/context          show the current artifact and visualization
/stats            tool success and failure counts
/errors           recent tool errors
/trace <id>       full detail for one error
/debug on|off     include raw diagnostics in tool results
/verbose on|off   log tool arguments and results
/reset            start over, keeping files
/clear            start over and delete this session's files
/help             this list";

pub fn render_context(summary: &ContextSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Turns: {} ({} messages, {} tool executions)",
        summary.user_turns, summary.message_count, summary.executions
    );
    let _ = writeln!(
        out,
        "Current artifact: {}",
        summary.current_artifact_path.as_deref().unwrap_or("none")
    );
    match &summary.last_visualization {
        Some(vis) => {
            let parameters =
                serde_json::to_string(&vis.parameters).unwrap_or_else(|_| "{}".to_string());
            let _ = writeln!(out, "Last visualization: {} {parameters}", vis.tool_name);
        }
        None => {
            let _ = writeln!(out, "Last visualization: none");
        }
    }
    let _ = writeln!(
        out,
        "Statistics: {}  Analysis: {}",
        if summary.has_statistics { "yes" } else { "no" },
        if summary.has_analysis { "yes" } else { "no" }
    );
    let _ = writeln!(out, "Session artifacts: {}", summary.session_artifact_count);
    let _ = write!(
        out,
        "Consecutive errors: {}",
        summary.consecutive_error_count
    );
    if let Some(id) = summary.pending_error_id {
        let _ = write!(out, " (last error #{id})");
    }
    out
}

pub fn render_stats(stats: &ExecutionStats) -> String {
    let Some(rate) = stats.success_rate() else {
        return "No tools have run yet.".to_string();
    };
    let mut out = format!(
        "Tool executions: {} ({} succeeded, {} failed, {rate:.0}% success)\nAuto-fixes: {}",
        stats.total, stats.successes, stats.failures, stats.auto_fixes
    );
    for (tool, counts) in &stats.per_tool {
        let _ = write!(
            out,
            "\n  {tool}: {} ok, {} failed",
            counts.successes, counts.failures
        );
    }
    out
}

pub fn render_errors(records: Vec<&ErrorRecord>, debug: bool) -> String {
    if records.is_empty() {
        return "No errors recorded.".to_string();
    }
    let mut out = String::from("Recent errors (newest first):");
    for record in records {
        let _ = write!(
            out,
            "\n  #{} {} {} [{}]: {}",
            record.id,
            record.timestamp.format("%H:%M:%S"),
            record.tool_name,
            record.kind.as_str(),
            record.user_message
        );
        if record.auto_fixed() {
            out.push_str(" (auto-fixed)");
        }
        if debug {
            let _ = write!(out, "\n      {}", record.raw_message);
        }
    }
    out
}

pub fn render_trace(record: &ErrorRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Error #{} ({})", record.id, record.kind.as_str());
    let _ = writeln!(out, "Time: {}", record.timestamp.to_rfc3339());
    let _ = writeln!(out, "Tool: {}", record.tool_name);
    if let Some(category) = record.category {
        let _ = writeln!(out, "Category: {}", category.as_str());
    }
    let _ = writeln!(out, "Auto-fixed: {}", if record.auto_fixed() { "yes" } else { "no" });
    let _ = writeln!(out, "Message: {}", record.user_message);
    let _ = writeln!(out, "Raw: {}", record.raw_message);
    if let Some(diagnostic) = &record.diagnostic {
        let _ = writeln!(out, "Diagnostic:\n{diagnostic}");
    }
    let context = serde_json::to_string_pretty(&record.context)
        .unwrap_or_else(|e| format!("<unavailable: {e}>"));
    let _ = write!(out, "Context:\n{context}");
    out
}
