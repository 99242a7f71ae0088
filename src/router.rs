use salvo::cors::*;
use salvo::prelude::*;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .hoop(affix_state::inject(state))
        .hoop(
            Cors::new()
                .allow_origin(AllowOrigin::any())
                .allow_methods(AllowMethods::any())
                .allow_headers(AllowHeaders::any())
                .into_handler(),
        )
        // Health
        .push(Router::with_path("health").get(handlers::health::health))
        // OpenAI-compatible
        .push(Router::with_path("v1/chat/completions").post(handlers::chat::chat_completions))
        // Ollama-compatible
        .push(Router::with_path("api/chat").post(handlers::ollama::chat))
        .push(Router::with_path("api/generate").post(handlers::ollama::generate))
        .push(Router::with_path("api/show").post(handlers::ollama::show))
}
