use crate::error::AppResult;
use crate::proving::CircuitKind;
use crate::state::AppState;
use axum::extract::State;
use axum::Json as AxumJson;
use serde_json::json;
use std::sync::Arc;

pub async fn health() -> AxumJson<serde_json::Value> {
    AxumJson(json!({ "ok": true }))
}

pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> AppResult<AxumJson<serde_json::Value>> {
    let tools = state.pipeline.probe();
    let mut circuits = serde_json::Map::new();
    for kind in CircuitKind::ALL {
        let s = state.pipeline.status(kind.name())?;
        circuits.insert(
            kind.name().to_string(),
            json!({ "compiled": s.compiled, "setup": s.setup }),
        );
    }

    Ok(AxumJson(json!({
        "ready": state.has_relayer_key(),
        "relayer_pubkey": state.config.relayer_pubkey().map(|k| k.to_string()),
        "program_id": state.config.program_id.to_string(),
        "tools": tools,
        "circuits": circuits,
    })))
}
