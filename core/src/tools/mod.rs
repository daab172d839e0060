pub mod context;
pub mod registry;
pub mod spec;

pub use context::ToolCategory;
pub use context::ToolInvocation;
pub use context::ToolOutcome;
pub use context::ToolPayload;
pub use registry::ToolHandler;
pub use registry::ToolRegistry;
pub use registry::ToolRegistryBuilder;
pub use spec::JsonSchema;
pub use spec::ToolSpec;
