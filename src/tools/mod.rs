//! Tool system - specs, handlers, the registry, and bus-backed collaboration tools

mod collaboration;
mod definition;
mod handler;
mod registry;
mod result;

pub use collaboration::{COLLABORATION_TAG, collaboration_tools};
pub use definition::ToolSpec;
pub use handler::{ApprovalGate, FnHandler, ToolHandler, handler_fn};
pub use registry::ToolRegistry;
pub use result::{ToolOutput, ToolResult};
