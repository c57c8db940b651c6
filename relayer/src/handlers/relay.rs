use crate::error::AppResult;
use crate::handlers::{parse_body, reject};
use crate::rate_limit::rate_limit_ok;
use crate::relay::RelayerRequest;
use crate::state::AppState;
use crate::types::RelayResponse;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::Json as AxumJson;
use std::net::SocketAddr;
use std::sync::Arc;

pub async fn relay_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> AppResult<AxumJson<RelayResponse>> {
    rate_limit_ok(&state, peer.ip())?;
    let req = RelayerRequest::from_value(&parse_body(&body)).map_err(|e| reject(&state, peer, e))?;
    let out = state
        .relay
        .relay(req)
        .await
        .map_err(|e| reject(&state, peer, e))?;
    Ok(AxumJson(RelayResponse {
        success: true,
        signature: out.signature,
        nullifier: out.nullifier,
    }))
}
