//! Vision gateway
//!
//! Owns the model backend for the lifetime of the process and wraps every
//! model call with resizing, timing, a timeout and error translation.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::config::Config;
use crate::engines::{LocalEngine, MemoryUsage, RemoteEngine, VisionBackend};
use crate::error::VisionError;
use crate::provision::{self, Provisioned};

/// Answer plus bookkeeping for one analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub text: String,
    pub prompt_token_estimate: u32,
    pub completion_token_estimate: u32,
    pub elapsed_nanos: u64,
}

/// Lifecycle of the model handle. `Ready` and `Failed` are terminal.
#[derive(Clone)]
pub enum GatewayState {
    Uninitialized,
    Provisioning,
    Ready(Arc<dyn VisionBackend>),
    Failed(String),
}

impl GatewayState {
    fn describe(&self) -> String {
        match self {
            Self::Uninitialized => "model not provisioned".to_string(),
            Self::Provisioning => "model is still provisioning".to_string(),
            Self::Ready(_) => "ready".to_string(),
            Self::Failed(e) => format!("provisioning failed: {}", e),
        }
    }
}

pub struct VisionGateway {
    model_name: String,
    inference_timeout: Duration,
    state: RwLock<GatewayState>,
}

impl VisionGateway {
    pub fn new(model_name: impl Into<String>, inference_timeout: Duration) -> Self {
        Self {
            model_name: model_name.into(),
            inference_timeout,
            state: RwLock::new(GatewayState::Uninitialized),
        }
    }

    /// Gateway around an already constructed backend
    #[cfg(test)]
    pub fn ready(
        model_name: impl Into<String>,
        inference_timeout: Duration,
        backend: Arc<dyn VisionBackend>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            inference_timeout,
            state: RwLock::new(GatewayState::Ready(backend)),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn state(&self) -> GatewayState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: GatewayState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Provision the model and bring up the matching backend.
    ///
    /// Only valid from `Uninitialized`; there is no re-provisioning.
    pub async fn provision(&self, config: &Config) -> Result<(), VisionError> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !matches!(*state, GatewayState::Uninitialized) {
                return Err(VisionError::ModelLoad(format!(
                    "cannot provision twice ({})",
                    state.describe()
                )));
            }
            *state = GatewayState::Provisioning;
        }

        match Self::build_backend(config).await {
            Ok(backend) => {
                tracing::info!(
                    "Model {} loaded successfully ({:?} backend)",
                    self.model_name,
                    backend.mode()
                );
                self.set_state(GatewayState::Ready(backend));
                Ok(())
            }
            Err(e) => {
                self.set_state(GatewayState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn build_backend(config: &Config) -> Result<Arc<dyn VisionBackend>, VisionError> {
        let backend: Arc<dyn VisionBackend> = match provision::provision(config).await? {
            Provisioned::Remote { endpoint, api_key } => Arc::new(
                RemoteEngine::new(&endpoint, &api_key, config.inference_timeout)
                    .map_err(|e| VisionError::ModelLoad(format!("{:#}", e)))?,
            ),
            Provisioned::Local(path) => {
                Arc::new(LocalEngine::start(&config.runtime_command, path).await?)
            }
        };
        Ok(backend)
    }

    fn backend(&self) -> Result<Arc<dyn VisionBackend>, VisionError> {
        match self.state() {
            GatewayState::Ready(backend) => Ok(backend),
            other => Err(VisionError::ModelNotReady(other.describe())),
        }
    }

    /// Resize `image` off the runtime, ask the model `prompt` and estimate token usage.
    pub async fn analyze(
        &self,
        image: DynamicImage,
        prompt: &str,
    ) -> Result<AnalysisResult, VisionError> {
        let backend = self.backend()?;

        let start = Instant::now();
        let call = async {
            let image = tokio::task::spawn_blocking(move || crate::image::resize(image))
                .await
                .map_err(|e| eyre::eyre!("resize task failed: {}", e))?;
            let answer = backend.analyze(image, prompt).await?;
            Ok::<_, eyre::Report>(answer)
        };
        let answer = tokio::time::timeout(self.inference_timeout, call)
            .await
            .map_err(|_| {
                VisionError::ImageAnalysis(format!(
                    "model did not answer within {}s",
                    self.inference_timeout.as_secs()
                ))
            })?
            .map_err(|e| VisionError::ImageAnalysis(format!("{:#}", e)))?;
        let elapsed = start.elapsed();
        tracing::info!("Query execution time: {:.2} seconds", elapsed.as_secs_f64());

        let text = answer.trim().to_string();
        let usage = backend.token_cost(prompt, &text);
        Ok(AnalysisResult {
            text,
            prompt_token_estimate: usage.prompt_tokens,
            completion_token_estimate: usage.completion_tokens,
            elapsed_nanos: elapsed.as_nanos() as u64,
        })
    }

    pub fn memory_usage(&self) -> Result<MemoryUsage, VisionError> {
        Ok(self.backend()?.memory_usage())
    }
}
