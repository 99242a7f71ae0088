use salvo::prelude::*;
use serde::de::DeserializeOwned;

use crate::error::VisionError;
use crate::extract::ExtractError;
use crate::state::AppState;

/// Body limit for JSON requests carrying base64 images
const MAX_BODY_SIZE: usize = 20 * 1024 * 1024;

pub(crate) fn get_state(depot: &Depot) -> Result<&AppState, VisionError> {
    depot
        .obtain::<AppState>()
        .map_err(|_| VisionError::ModelNotReady("application state missing".to_string()))
}

/// Parse the JSON body, rejecting malformed payloads with a 400.
pub(crate) async fn parse_body<T: DeserializeOwned>(req: &mut Request) -> Result<T, VisionError> {
    req.parse_json_with_max_size::<T>(MAX_BODY_SIZE)
        .await
        .map_err(|e| {
            tracing::error!("Failed to parse request: {}", e);
            VisionError::BadRequest(ExtractError::InvalidBody(e.to_string()))
        })
}

/// Echo the requested model name, falling back to the served one
pub(crate) fn response_model(requested: Option<String>, state: &AppState) -> String {
    requested
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.gateway.model_name().to_string())
}

pub(crate) fn warn_if_streaming(stream: Option<bool>) {
    if stream.unwrap_or(false) {
        tracing::warn!("Streaming not implemented, falling back to non-streaming");
    }
}
