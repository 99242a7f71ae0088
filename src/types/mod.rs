//! OpenAI- and Ollama-compatible request/response types
//!
//! Some fields are deserialized for API compatibility but never used by
//! the model (e.g., `temperature`, `max_tokens`, `options`).

#![allow(dead_code)]

mod chat;
mod error;
mod ollama;

pub use chat::*;
pub use error::*;
pub use ollama::*;
