//! Dedicated thread owning the local model
//!
//! Handlers talk to it through an mpsc channel and get answers back on
//! oneshot channels, so model calls are serialized.

mod request;
mod thread;

pub use request::{send_and_wait, InferenceRequest, ModelReady};
pub use thread::spawn_inference_thread;
