use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json as AxumJson;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// The circuit's constraints rejected the inputs (e.g. balance below threshold).
    /// `reason` is fixed per circuit and never contains witness values.
    #[error("Requirement not met: {reason}")]
    BusinessRule { reason: String },
    #[error("Eligibility verification failed: {0}")]
    EligibilityVerificationFailed(String),
    #[error("Unknown circuit: {0}")]
    UnknownCircuit(String),
    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),
    #[error("Proving tools not available: {0}")]
    ToolsNotAvailable(String),
    #[error("Circuit not compiled: {0}")]
    CircuitNotCompiled(String),
    #[error("Witness generation failed: {0}")]
    WitnessGenerationFailed(String),
    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),
    #[error("Proof verification failed: {0}")]
    VerificationFailed(String),
    #[error("Transaction simulation failed: {message}")]
    SimulationFailed {
        message: String,
        logs: Vec<String>,
        debug: Value,
    },
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("Internal Error: {0}")]
    Internal(String),
    #[error("Bad Gateway: {0}")]
    BadGateway(String),
}

impl AppError {
    /// Stable machine-readable code, part of the HTTP contract.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingParameters(_) => "MISSING_PARAMETERS",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::BusinessRule { .. } => "INVALID_OR_BELOW_THRESHOLD",
            AppError::EligibilityVerificationFailed(_) => "ELIGIBILITY_VERIFICATION_FAILED",
            AppError::UnknownCircuit(_) => "UNKNOWN_CIRCUIT",
            AppError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            AppError::ToolsNotAvailable(_) => "TOOLS_NOT_AVAILABLE",
            AppError::CircuitNotCompiled(_) => "CIRCUIT_NOT_COMPILED",
            AppError::WitnessGenerationFailed(_) => "WITNESS_GENERATION_FAILED",
            AppError::ProofGenerationFailed(_) => "PROOF_GENERATION_FAILED",
            AppError::VerificationFailed(_) => "VERIFICATION_FAILED",
            AppError::SimulationFailed { .. } => "SIMULATION_FAILED",
            AppError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::BadGateway(_) => "RPC_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingParameters(_)
            | AppError::BadRequest(_)
            | AppError::BusinessRule { .. }
            | AppError::EligibilityVerificationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownCircuit(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ToolsNotAvailable(_)
            | AppError::CircuitNotCompiled(_)
            | AppError::WitnessGenerationFailed(_)
            | AppError::ProofGenerationFailed(_)
            | AppError::VerificationFailed(_)
            | AppError::SimulationFailed { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human summary; the full text goes into `details`.
    fn summary(&self) -> String {
        match self {
            AppError::MissingParameters(_) => "Missing required parameters".into(),
            AppError::BusinessRule { reason } => reason.clone(),
            AppError::SimulationFailed { .. } => "Transaction simulation failed".into(),
            AppError::CircuitNotCompiled(_) => {
                "Circuit is not compiled; run the build step for this circuit".into()
            }
            AppError::ToolsNotAvailable(_) => "Proving toolchain is not installed".into(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Value {
        match self {
            AppError::MissingParameters(fields) => serde_json::json!(fields),
            AppError::SimulationFailed { message, .. } => Value::String(message.clone()),
            AppError::BusinessRule { .. } => Value::Null,
            other => Value::String(other.to_string()),
        }
    }

    pub fn to_body(&self) -> Value {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "success": false,
            "error": self.code(),
            "message": self.summary(),
            "details": self.details(),
            "status": status.as_u16(),
        });
        if let AppError::SimulationFailed { logs, debug, .. } = self {
            body["logs"] = serde_json::json!(logs);
            body["debug"] = debug.clone();
        }
        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{self}");
        } else {
            tracing::debug!(code = self.code(), "{self}");
        }
        (status, AxumJson(self.to_body())).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_is_client_error_without_details() {
        let e = AppError::BusinessRule {
            reason: "balance below threshold".into(),
        };
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        let body = e.to_body();
        assert_eq!(body["error"], "INVALID_OR_BELOW_THRESHOLD");
        assert_eq!(body["message"], "balance below threshold");
        assert!(body["details"].is_null());
        assert_eq!(body["status"], 400);
    }

    #[test]
    fn simulation_failure_carries_logs_and_debug() {
        let e = AppError::SimulationFailed {
            message: "InstructionError(2, Custom(6008))".into(),
            logs: vec!["Program log: Nullifier already spent".into()],
            debug: serde_json::json!({ "instruction": "withdraw_shielded" }),
        };
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = e.to_body();
        assert_eq!(body["error"], "SIMULATION_FAILED");
        assert_eq!(body["logs"][0], "Program log: Nullifier already spent");
        assert_eq!(body["debug"]["instruction"], "withdraw_shielded");
    }

    #[test]
    fn missing_parameters_lists_fields() {
        let e = AppError::MissingParameters(vec!["accounts".into(), "proof".into()]);
        let body = e.to_body();
        assert_eq!(body["error"], "MISSING_PARAMETERS");
        assert_eq!(body["details"][0], "accounts");
        assert_eq!(body["details"][1], "proof");
    }
}
