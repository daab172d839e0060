use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VischatErr>;

/// Errors that escape a conversation turn.
///
/// Tool failures are not represented here: they are recovered inside the
/// dispatch loop and recorded in the error journal instead.
#[derive(Error, Debug)]
pub enum VischatErr {
    /// The completion service could not be reached, or gave up after its own
    /// retry budget was exhausted.
    #[error("completion service unreachable: {0}")]
    ModelUnreachable(String),

    /// The completion service answered with a non-retryable status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// The completion service answered 200 but the body was not a usable
    /// chat completion.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

impl VischatErr {
    /// Whether this error means the completion service could not produce a
    /// turn. These propagate to the caller of `send()` unchanged.
    pub fn is_model_unreachable(&self) -> bool {
        matches!(
            self,
            VischatErr::ModelUnreachable(_)
                | VischatErr::UnexpectedStatus { .. }
                | VischatErr::MalformedResponse(_)
                | VischatErr::Reqwest(_)
        )
    }
}
