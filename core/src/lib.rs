//! Root of the `vischat-core` library.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the caller or the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod artifact_store;
mod chat_completions;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod error_journal;
pub mod fast_path;
mod flags;
pub mod function_tool;
pub mod inspect;
pub mod models;
pub mod session;
pub mod state;
pub mod tools;
mod util;

pub use artifact_store::ArtifactStore;
pub use artifact_store::FsArtifactStore;
pub use chat_completions::ChatCompletionsClient;
pub use client::ModelClient;
pub use client::ModelResponse;
pub use client::Prompt;
pub use config::Config;
pub use config::ConfigOverrides;
pub use dispatch::OutputMode;
pub use dispatch::ToolDispatchGraph;
pub use dispatch::TurnEnd;
pub use error::VischatErr;
pub use error_journal::ErrorJournal;
pub use function_tool::ToolFault;
pub use session::ClearReport;
pub use session::ConversationSession;
pub use state::ConversationState;
