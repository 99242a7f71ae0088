//! File-backed model running on the inference thread

use std::path::PathBuf;

use async_trait::async_trait;
use image::DynamicImage;
use sysinfo::{Pid, System};
use tiktoken_rs::CoreBPE;
use tokio::sync::mpsc;

use super::{char_count, BackendMode, MemoryUsage, RuntimeModel, TokenUsage, VisionBackend, VisionModel};
use crate::error::VisionError;
use crate::inference::{self, InferenceRequest};
use crate::utils::to_mb;

pub struct LocalEngine {
    inference_tx: mpsc::Sender<InferenceRequest>,
    tokenizer: CoreBPE,
    runtime_pid: Option<u32>,
}

impl LocalEngine {
    /// Start the model runtime on the provisioned artifact.
    pub async fn start(runtime_command: &str, model_path: PathBuf) -> Result<Self, VisionError> {
        let command = runtime_command.to_string();
        Self::with_loader(move || RuntimeModel::spawn(&command, &model_path)).await
    }

    /// Load a model on a fresh inference thread and wait until it is ready.
    pub async fn with_loader<M, F>(loader: F) -> Result<Self, VisionError>
    where
        M: VisionModel + 'static,
        F: FnOnce() -> eyre::Result<M> + Send + 'static,
    {
        let tokenizer = tiktoken_rs::cl100k_base()
            .map_err(|e| VisionError::ModelLoad(format!("Failed to load cl100k_base tokenizer: {}", e)))?;

        let (inference_tx, ready_rx) = inference::spawn_inference_thread(loader);
        let ready = ready_rx
            .await
            .map_err(|_| VisionError::ModelLoad("inference thread exited during startup".to_string()))?
            .map_err(|e| VisionError::ModelLoad(format!("{:#}", e)))?;

        Ok(Self {
            inference_tx,
            tokenizer,
            runtime_pid: ready.runtime_pid,
        })
    }
}

#[async_trait]
impl VisionBackend for LocalEngine {
    fn mode(&self) -> BackendMode {
        BackendMode::Local
    }

    async fn analyze(&self, image: DynamicImage, prompt: &str) -> eyre::Result<String> {
        let prompt = prompt.to_string();
        inference::send_and_wait(&self.inference_tx, |response_tx| InferenceRequest::Analyze {
            image,
            prompt,
            response_tx,
        })
        .await
    }

    /// Prompt tokens are approximated by character count; the answer is
    /// measured with the cl100k_base BPE vocabulary.
    fn token_cost(&self, prompt: &str, answer: &str) -> TokenUsage {
        TokenUsage {
            prompt_tokens: char_count(prompt),
            completion_tokens: self.tokenizer.encode_with_special_tokens(answer).len() as u32,
        }
    }

    /// Memory of this server plus the model runtime process, if separate
    fn memory_usage(&self) -> MemoryUsage {
        let mut pids = Vec::with_capacity(2);
        match sysinfo::get_current_pid() {
            Ok(pid) => pids.push(pid),
            Err(e) => tracing::warn!("Failed to resolve current pid: {}", e),
        }
        if let Some(pid) = self.runtime_pid {
            pids.push(Pid::from_u32(pid));
        }

        let mut system = System::new();
        let mut usage = MemoryUsage::default();
        for pid in pids {
            system.refresh_process(pid);
            if let Some(process) = system.process(pid) {
                usage.resident_mb += to_mb(process.memory());
                usage.virtual_mb += to_mb(process.virtual_memory());
            }
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::ScriptedModel;
    use image::RgbImage;

    #[tokio::test]
    async fn analyze_goes_through_the_inference_thread() {
        let engine = LocalEngine::with_loader(|| Ok(ScriptedModel::new("two cats")))
            .await
            .unwrap();
        let answer = engine
            .analyze(DynamicImage::ImageRgb8(RgbImage::new(3, 5)), "count")
            .await
            .unwrap();
        assert_eq!(answer, "two cats (count, 3x5)");
        assert_eq!(engine.mode(), BackendMode::Local);
    }

    #[tokio::test]
    async fn load_errors_become_model_load_errors() {
        let result =
            LocalEngine::with_loader::<ScriptedModel, _>(|| Err(eyre::eyre!("bad weights"))).await;
        assert!(matches!(result, Err(VisionError::ModelLoad(msg)) if msg.contains("bad weights")));
    }

    #[tokio::test]
    async fn token_cost_uses_chars_for_prompt_and_bpe_for_answer() {
        let engine = LocalEngine::with_loader(|| Ok(ScriptedModel::new("x"))).await.unwrap();
        let usage = engine.token_cost("what is in the image?", "hello world");
        assert_eq!(usage.prompt_tokens, 21);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total(), 23);
    }

    #[tokio::test]
    async fn reports_process_memory() {
        let engine = LocalEngine::with_loader(|| Ok(ScriptedModel::new("x"))).await.unwrap();
        let memory = engine.memory_usage();
        assert!(memory.resident_mb > 0.0);
        assert!(memory.virtual_mb >= memory.resident_mb);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn starts_the_runtime_on_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let command = crate::engines::runtime::tests::fake_runtime(dir.path(), "a lighthouse");
        let artifact = dir.path().join("moondream-0_5b-int8");
        std::fs::write(&artifact, b"weights").unwrap();

        let engine = LocalEngine::start(&command, artifact).await.unwrap();
        let answer = engine
            .analyze(DynamicImage::ImageRgb8(RgbImage::new(4, 4)), "what is it?")
            .await
            .unwrap();
        assert_eq!(answer, "a lighthouse");
    }
}
