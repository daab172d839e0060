use thiserror::Error;

/// An unexpected fault raised by a tool executor.
///
/// Ordinary failures (bad arguments, missing data) are reported through
/// `ToolOutcome::Failure`; this channel is for collaborators that crashed or
/// could not be reached at all.
#[derive(Debug, Error, PartialEq)]
pub enum ToolFault {
    #[error("tool crashed: {0}")]
    Crashed(String),
    #[error("tool backend unavailable: {0}")]
    Unavailable(String),
}
