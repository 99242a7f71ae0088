use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::engines::VisionModel;

use super::{InferenceRequest, ModelReady};

/// Capacity of the request queue in front of the model
const QUEUE_DEPTH: usize = 32;

/// Spawn the thread that owns the local model (models are not Send/Sync).
///
/// The model is built by `loader` on the inference thread itself. The returned
/// receiver resolves once loading finished, with the load error if it failed.
pub fn spawn_inference_thread<M, F>(
    loader: F,
) -> (
    mpsc::Sender<InferenceRequest>,
    oneshot::Receiver<eyre::Result<ModelReady>>,
)
where
    M: VisionModel + 'static,
    F: FnOnce() -> eyre::Result<M> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("inference".to_string())
        .spawn(move || match loader() {
            Ok(model) => {
                let _ = ready_tx.send(Ok(ModelReady {
                    runtime_pid: model.runtime_pid(),
                }));
                inference_thread(model, rx);
            }
            Err(e) => {
                tracing::error!("Failed to load vision model: {:#}", e);
                let _ = ready_tx.send(Err(e));
            }
        })
        .map(|_| ())
        .unwrap_or_else(|e| tracing::error!("Failed to spawn inference thread: {}", e));

    (tx, ready_rx)
}

/// Process requests one at a time until every sender is dropped
fn inference_thread<M: VisionModel>(mut model: M, mut rx: mpsc::Receiver<InferenceRequest>) {
    tracing::info!("Inference thread ready, processing requests...");

    while let Some(request) = rx.blocking_recv() {
        match request {
            InferenceRequest::Analyze {
                image,
                prompt,
                response_tx,
            } => {
                let start = Instant::now();
                let result = model
                    .encode_image(&image)
                    .and_then(|encoded| model.query(&encoded, &prompt));
                tracing::debug!("Encode + query took {:?}", start.elapsed());
                let _ = response_tx.send(result);
            }
        }
    }

    tracing::info!("Inference thread shutting down");
}
