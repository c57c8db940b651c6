use crate::error::{AppError, AppResult};
use crate::handlers::{parse_body, reject};
use crate::proving::{CircuitKind, CircuitStatus};
use crate::rate_limit::rate_limit_ok;
use crate::state::AppState;
use crate::types::{ProveResponse, VerifyRequest, VerifyResponse};
use crate::validation::parse_pubkey;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::Json as AxumJson;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

pub async fn prove_status(
    State(state): State<Arc<AppState>>,
    Path(circuit): Path<String>,
) -> AppResult<AxumJson<CircuitStatus>> {
    Ok(AxumJson(state.pipeline.status(&circuit)?))
}

/// min_balance without an explicit `balance`: read it from the owner's token account.
async fn resolve_min_balance(state: &Arc<AppState>, inputs: &mut Value) -> AppResult<()> {
    let Some(obj) = inputs.as_object_mut() else {
        return Ok(());
    };
    if obj.get("balance").is_some_and(|v| !v.is_null()) {
        return Ok(());
    }
    let (Some(Value::String(owner)), Some(Value::String(mint))) =
        (obj.get("owner"), obj.get("token_mint"))
    else {
        return Ok(());
    };
    let owner = parse_pubkey("owner", owner)?;
    let mint = parse_pubkey("token_mint", mint)?;

    // Everything except the balance must validate before the chain is asked.
    let mut placeholder = obj.clone();
    placeholder.insert("balance".into(), Value::from(0u64));
    CircuitKind::MinBalance.prover_input(&Value::Object(placeholder))?;

    let rpc = state.rpc.clone();
    let balance = tokio::task::spawn_blocking(move || rpc.token_balance(&owner, &mint))
        .await
        .map_err(|e| AppError::Internal(format!("balance lookup task failed: {e}")))??;
    debug!("min_balance: balance resolved from chain");
    obj.insert("balance".into(), Value::from(balance));
    Ok(())
}

pub async fn prove(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(circuit): Path<String>,
    body: Bytes,
) -> AppResult<AxumJson<ProveResponse>> {
    rate_limit_ok(&state, peer.ip())?;
    let kind = CircuitKind::from_name(&circuit).map_err(|e| reject(&state, peer, e))?;
    let mut inputs = parse_body(&body);
    if kind == CircuitKind::MinBalance {
        resolve_min_balance(&state, &mut inputs)
            .await
            .map_err(|e| reject(&state, peer, e))?;
    }
    let res = state
        .pipeline
        .generate_full_proof(kind.name(), &inputs)
        .await
        .map_err(|e| reject(&state, peer, e))?;
    Ok(AxumJson(res.into()))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(circuit): Path<String>,
    body: Bytes,
) -> AppResult<AxumJson<VerifyResponse>> {
    rate_limit_ok(&state, peer.ip())?;
    let kind = CircuitKind::from_name(&circuit).map_err(|e| reject(&state, peer, e))?;
    let v = parse_body(&body);
    let missing: Vec<String> = ["proof", "publicInputs"]
        .into_iter()
        .filter(|k| v.get(*k).map(Value::is_null).unwrap_or(true))
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(reject(&state, peer, AppError::MissingParameters(missing)));
    }
    let req: VerifyRequest = serde_json::from_value(v).map_err(|e| {
        reject(
            &state,
            peer,
            AppError::BadRequest(format!("invalid verify request: {e}")),
        )
    })?;

    let valid = state
        .pipeline
        .verify_proof(kind.name(), &req.proof, &req.public_inputs)
        .await
        .map_err(|e| reject(&state, peer, e))?;
    Ok(AxumJson(VerifyResponse {
        success: true,
        circuit: kind.name().to_string(),
        valid,
    }))
}
