use crate::proving::ProofResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProveResponse {
    pub success: bool,
    pub circuit: String,
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
    pub metadata: Value,
}

impl From<ProofResult> for ProveResponse {
    fn from(r: ProofResult) -> Self {
        Self {
            success: true,
            circuit: r.circuit,
            proof: r.proof,
            public_inputs: r.public_inputs,
            metadata: r.metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub circuit: String,
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub success: bool,
    pub signature: String,
    pub nullifier: Value,
}
