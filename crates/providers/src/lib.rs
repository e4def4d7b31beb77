//! Completion client implementations for Parley.
//!
//! All clients implement the `parley_core::CompletionClient` trait.
//! The router builds the configured client from `AppConfig`.

pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;
pub use router::{ClientRouter, build_from_config};
