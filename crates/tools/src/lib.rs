//! Tool handler implementations for Parley.
//!
//! Tools give the model a way to reach outside the conversation. Handlers
//! here are built from configuration; embedders can also register their own
//! closures with `parley_core::tool_fn`.

pub mod http_tool;

pub use http_tool::{HttpTool, build_http_tools};
