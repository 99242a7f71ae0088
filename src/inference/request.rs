use image::DynamicImage;
use tokio::sync::{mpsc, oneshot};

/// Request sent to the inference thread
pub enum InferenceRequest {
    /// Encode `image`, then ask `prompt` about it
    Analyze {
        image: DynamicImage,
        prompt: String,
        response_tx: oneshot::Sender<eyre::Result<String>>,
    },
}

/// Sent once by the inference thread after the model finished loading
#[derive(Debug, Clone, Copy)]
pub struct ModelReady {
    /// Process id of an out-of-process model runtime, if any
    pub runtime_pid: Option<u32>,
}

/// Send an inference request and wait for the response.
///
/// `make_request` receives a oneshot sender and returns the InferenceRequest variant.
pub async fn send_and_wait<T>(
    tx: &mpsc::Sender<InferenceRequest>,
    make_request: impl FnOnce(oneshot::Sender<eyre::Result<T>>) -> InferenceRequest,
) -> eyre::Result<T> {
    let (response_tx, response_rx) = oneshot::channel();
    tx.send(make_request(response_tx))
        .await
        .map_err(|_| eyre::eyre!("inference thread is not running"))?;

    response_rx
        .await
        .map_err(|_| eyre::eyre!("inference thread dropped the request"))?
}
