use salvo::prelude::*;

use crate::error::VisionError;
use crate::extract::{extract_openai, ExtractError};
use crate::types::{ChatCompletionRequest, ChatCompletionResponse};

use super::helpers::{get_state, parse_body, response_model, warn_if_streaming};

/// POST /v1/chat/completions - OpenAI-compatible chat completions
#[handler]
pub async fn chat_completions(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), VisionError> {
    let state = get_state(depot)?;

    let request: ChatCompletionRequest = parse_body(req).await?;
    warn_if_streaming(request.stream);

    let normalized = extract_openai(&request)?;
    let image = state
        .fetcher
        .load(&normalized.image)
        .await
        .map_err(|e| ExtractError::ImageLoad(e.to_string()))?;

    let result = state.gateway.analyze(image, &normalized.prompt).await?;
    let model = response_model(normalized.model_hint, state);

    res.render(Json(ChatCompletionResponse::from_analysis(model, &result)));
    Ok(())
}
