//! Test doubles for the model and the backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;

use super::{char_count, BackendMode, MemoryUsage, TokenUsage, VisionBackend, VisionModel};

/// In-process model answering `"<answer> (<prompt>, <w>x<h>)"`
pub struct ScriptedModel {
    answer: String,
}

impl ScriptedModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
        }
    }
}

impl VisionModel for ScriptedModel {
    type Encoded = (u32, u32);

    fn encode_image(&mut self, image: &DynamicImage) -> eyre::Result<(u32, u32)> {
        Ok((image.width(), image.height()))
    }

    fn query(&mut self, encoded: &(u32, u32), question: &str) -> eyre::Result<String> {
        Ok(format!("{} ({}, {}x{})", self.answer, question, encoded.0, encoded.1))
    }
}

/// Backend that records what it was asked and replies with a canned answer
#[derive(Clone)]
pub struct MockBackend {
    answer: Result<String, String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(String, u32, u32)>>>,
}

impl MockBackend {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            answer: Err(error.to_string()),
            ..Self::answering("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(prompt, width, height)` of every analyzed image
    pub fn seen(&self) -> Vec<(String, u32, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionBackend for MockBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Local
    }

    async fn analyze(&self, image: DynamicImage, prompt: &str) -> eyre::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((prompt.to_string(), image.width(), image.height()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone().map_err(|e| eyre::eyre!(e))
    }

    fn token_cost(&self, prompt: &str, answer: &str) -> TokenUsage {
        TokenUsage {
            prompt_tokens: char_count(prompt),
            completion_tokens: char_count(answer),
        }
    }

    fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage {
            resident_mb: 512.0,
            virtual_mb: 1024.5,
        }
    }
}
