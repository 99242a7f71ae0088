//! Vision model backends
//!
//! A backend is picked once at startup: [`LocalEngine`] runs the provisioned
//! model artifact, [`RemoteEngine`] forwards to the Moondream cloud API.

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;

mod local;
mod remote;
pub(crate) mod runtime;

#[cfg(test)]
pub(crate) mod mock;

pub use local::LocalEngine;
pub use remote::RemoteEngine;
pub use runtime::RuntimeModel;

/// Estimated token counts for one exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Process memory in mebibytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub resident_mb: f64,
    pub virtual_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Local,
    Remote,
}

/// Everything the gateway needs from a model, whatever runs it
#[async_trait]
pub trait VisionBackend: Send + Sync {
    fn mode(&self) -> BackendMode;

    /// Answer `prompt` about `image`. The image is already size-bounded.
    async fn analyze(&self, image: DynamicImage, prompt: &str) -> eyre::Result<String>;

    fn token_cost(&self, prompt: &str, answer: &str) -> TokenUsage;

    fn memory_usage(&self) -> MemoryUsage;
}

/// Two-step model interface: encode the image once, then query it.
///
/// Implementations are owned by the inference thread and need not be `Sync`.
pub trait VisionModel {
    type Encoded;

    fn encode_image(&mut self, image: &DynamicImage) -> eyre::Result<Self::Encoded>;

    fn query(&mut self, encoded: &Self::Encoded, question: &str) -> eyre::Result<String>;

    /// Process id of an out-of-process runtime, for memory reporting
    fn runtime_pid(&self) -> Option<u32> {
        None
    }
}

/// Character-length token approximation
pub(crate) fn char_count(text: &str) -> u32 {
    text.chars().count() as u32
}
