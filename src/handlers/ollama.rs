use std::time::Instant;

use salvo::prelude::*;

use crate::error::VisionError;
use crate::extract::{extract_generate, extract_ollama, ExtractError};
use crate::model_card;
use crate::types::{
    GenerateTimings, OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest,
    OllamaGenerateResponse, OllamaShowRequest,
};

use super::helpers::{get_state, parse_body, response_model, warn_if_streaming};

/// POST /api/chat - Ollama-compatible chat
#[handler]
pub async fn chat(req: &mut Request, depot: &mut Depot, res: &mut Response) -> Result<(), VisionError> {
    let state = get_state(depot)?;

    let request: OllamaChatRequest = parse_body(req).await?;
    warn_if_streaming(request.stream);

    let normalized = extract_ollama(&request)?;
    let image = state
        .fetcher
        .load(&normalized.image)
        .await
        .map_err(|e| ExtractError::InvalidImage(e.to_string()))?;

    let result = state.gateway.analyze(image, &normalized.prompt).await?;
    let model = response_model(normalized.model_hint, state);

    res.render(Json(OllamaChatResponse::from_analysis(model, &result)));
    Ok(())
}

/// POST /api/generate - one prompt over one or more images
///
/// Every image is analyzed with the same prompt; only the last answer is
/// returned.
#[handler]
pub async fn generate(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), VisionError> {
    let start = Instant::now();
    let state = get_state(depot)?;

    let request: OllamaGenerateRequest = parse_body(req).await?;
    warn_if_streaming(request.stream);
    let (prompt, sources) = extract_generate(&request)?;

    let load_start = Instant::now();
    let mut images = Vec::with_capacity(sources.len());
    for source in &sources {
        let image = state
            .fetcher
            .load(source)
            .await
            .map_err(|e| ExtractError::InvalidImageFormat(e.to_string()))?;
        images.push(image);
    }
    let load = load_start.elapsed();

    let eval_start = Instant::now();
    let mut answer = String::new();
    for image in images {
        answer = state.gateway.analyze(image, &prompt).await?.text;
    }
    let prompt_eval = eval_start.elapsed();

    let timings = GenerateTimings {
        total: start.elapsed().as_nanos() as u64,
        load: load.as_nanos() as u64,
        prompt_eval: prompt_eval.as_nanos() as u64,
    };
    let model = response_model(request.model.clone(), state);

    res.render(Json(OllamaGenerateResponse::new(model, &prompt, answer, timings)));
    Ok(())
}

/// POST /api/show - static model metadata for known aliases
#[handler]
pub async fn show(req: &mut Request, depot: &mut Depot, res: &mut Response) -> Result<(), VisionError> {
    let state = get_state(depot)?;
    let request: OllamaShowRequest = parse_body(req).await?;

    match model_card::lookup(&request.model, state.gateway.model_name()) {
        Some(card) => res.render(Json(card)),
        None => {
            tracing::warn!("Unknown model requested: {}", request.model);
            crate::error::render_error(
                res,
                StatusCode::NOT_FOUND,
                &format!("Model {} not found", request.model),
                "not_found_error",
            );
        }
    }
    Ok(())
}
