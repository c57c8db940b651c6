pub mod prove;
pub mod public;
pub mod relay;

use crate::error::AppError;
use crate::metrics;
use crate::rate_limit::rate_limit_bad;
use crate::state::AppState;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Malformed JSON reads as an empty object, so the caller reports every
/// required field as missing.
pub(crate) fn parse_body(body: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => Value::Object(Default::default()),
        Err(e) => {
            debug!(len = body.len(), "request body is not JSON: {e}");
            Value::Object(Default::default())
        }
    }
}

/// Client errors also draw from the stricter "bad" bucket; once that is empty
/// the caller sees 429 instead of the original error.
pub(crate) fn reject(state: &Arc<AppState>, peer: SocketAddr, e: AppError) -> AppError {
    if e.status_code().is_client_error() {
        metrics::inc_bad_payload_total();
        if let Err(rl_e) = rate_limit_bad(state, peer.ip()) {
            return rl_e;
        }
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_objects_become_empty() {
        assert_eq!(parse_body(b"not json"), serde_json::json!({}));
        assert_eq!(parse_body(b"[1,2]"), serde_json::json!({}));
        assert_eq!(parse_body(br#"{"a":1}"#)["a"], 1);
    }
}
