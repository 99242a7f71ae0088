//! moondream-api: OpenAI- and Ollama-compatible HTTP gateway for Moondream
//!
//! Provides endpoints for:
//! - GET  /health - Liveness, model name and memory usage
//! - POST /v1/chat/completions - OpenAI-style image question answering
//! - POST /api/chat - Ollama-style chat with an attached image
//! - POST /api/generate - Ollama-style prompt over one or more images
//! - POST /api/show - Mocked Ollama model metadata
//!
//! The model runtime is not Send/Sync, so local inference runs on a
//! dedicated thread fed through channels. With `MOONDREAM_API_KEY` set the
//! hosted Moondream API is used instead.

use std::sync::Arc;

use eyre::WrapErr;
use salvo::prelude::*;

mod config;
mod error;
mod state;

mod engines;
mod extract;
mod gateway;
mod handlers;
mod image;
mod inference;
mod model_card;
mod provision;
mod router;
mod types;
mod utils;

use config::Config;
use gateway::VisionGateway;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moondream_api=info".into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Starting moondream-api server on port {}", config.port);
    tracing::info!("Using model: {}", config.model_name);

    // Download (if needed) and load the model before accepting traffic
    let gateway = Arc::new(VisionGateway::new(
        config.model_name.clone(),
        config.inference_timeout,
    ));
    gateway
        .provision(&config)
        .await
        .wrap_err("Failed to initialize vision service")?;

    let fetcher = crate::image::ImageFetcher::new(config.image_fetch_timeout)
        .wrap_err("Failed to build image fetch client")?;

    let state = AppState { gateway, fetcher };
    let router = router::build_router(state);

    let listen_addr = format!("0.0.0.0:{}", config.port);
    let acceptor = TcpListener::new(&listen_addr).bind().await;

    tracing::info!("HTTP server listening on http://{}", listen_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  POST /v1/chat/completions");
    tracing::info!("  POST /api/chat");
    tracing::info!("  POST /api/generate");
    tracing::info!("  POST /api/show");

    Server::new(acceptor).serve(router).await;

    Ok(())
}
