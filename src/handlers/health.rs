use salvo::prelude::*;

use crate::state::AppState;
use crate::utils::utc_timestamp;

/// GET /health - Health check for container orchestration
///
/// Always answers 200; an unprovisioned model is reported as `"status": "error"`.
#[handler]
pub async fn health(depot: &mut Depot, res: &mut Response) {
    let timestamp = utc_timestamp();

    let Ok(state) = depot.obtain::<AppState>() else {
        res.render(Json(serde_json::json!({
            "status": "error",
            "message": "Vision service not initialized",
            "timestamp": timestamp,
        })));
        return;
    };

    match state.gateway.memory_usage() {
        Ok(memory) => res.render(Json(serde_json::json!({
            "status": "healthy",
            "model": state.gateway.model_name(),
            "memory": {
                "resident_mb": format!("{:.2}", memory.resident_mb),
                "virtual_mb": format!("{:.2}", memory.virtual_mb),
            },
            "timestamp": timestamp,
        }))),
        Err(e) => res.render(Json(serde_json::json!({
            "status": "error",
            "message": e.to_string(),
            "timestamp": timestamp,
        }))),
    }
}
