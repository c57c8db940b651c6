//! Relay submission: validate -> eligibility -> nullifier + instruction ->
//! compute budget -> sign -> simulate -> send -> confirm.
//!
//! Nothing is broadcast unless simulation of the exact signed transaction
//! came back clean.

use crate::config::Config;
use crate::constants::{
    MAX_ELIGIBILITY_PROOFS, MAX_INSTRUCTION_B64_LEN, MAX_PROOF_BYTES, MAX_PUBLIC_INPUT_BYTES,
    MAX_TX_SIZE,
};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::proving::ProofPipeline;
use crate::relay::eligibility::{check_eligibility, verify_offchain, EligibilityProof};
use crate::relay::instruction::{
    build_instruction, nullifier_meta_for, AccountMap, GatedInstruction, NullifierMeta,
};
use crate::relay::rpc::{ChainRpc, ConfirmPolicy};
use crate::validation::{ensure_bytes_len, ensure_len_le, ensure_pubkey_len};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const MAX_ACCOUNTS: usize = 32;
const MAX_ACCOUNT_NAME_LEN: usize = 64;
const REQUIRED_FIELDS: [&str; 4] = ["proof", "publicInputs", "instructionData", "accounts"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerRequest {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
    /// Base64 Anchor instruction payload.
    pub instruction_data: String,
    pub accounts: AccountMap,
    #[serde(default)]
    pub eligibility_proofs: Vec<EligibilityProof>,
    #[serde(default)]
    pub require_eligibility: bool,
}

impl RelayerRequest {
    /// Absent (or null) required fields are reported together before any type check.
    pub fn from_value(v: &Value) -> AppResult<Self> {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|k| v.get(**k).map(Value::is_null).unwrap_or(true))
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::MissingParameters(missing));
        }
        serde_json::from_value(v.clone())
            .map_err(|e| AppError::BadRequest(format!("invalid relayer request: {e}")))
    }

    pub fn validate(&self) -> AppResult<()> {
        ensure_bytes_len("proof", &self.proof, MAX_PROOF_BYTES)?;
        ensure_bytes_len("publicInputs", &self.public_inputs, MAX_PUBLIC_INPUT_BYTES)?;
        let ix = self.instruction_data.trim();
        if ix.is_empty() {
            return Err(AppError::BadRequest("instructionData is required".into()));
        }
        ensure_len_le("instructionData", ix, MAX_INSTRUCTION_B64_LEN)?;
        if self.accounts.is_empty() {
            return Err(AppError::MissingParameters(vec!["accounts".into()]));
        }
        if self.accounts.len() > MAX_ACCOUNTS {
            return Err(AppError::BadRequest(format!(
                "too many accounts: {} (max {MAX_ACCOUNTS})",
                self.accounts.len()
            )));
        }
        for (name, key) in &self.accounts {
            ensure_len_le("account name", name, MAX_ACCOUNT_NAME_LEN)?;
            ensure_pubkey_len(&format!("accounts.{name}"), key)?;
        }
        if self.eligibility_proofs.len() > MAX_ELIGIBILITY_PROOFS {
            return Err(AppError::BadRequest(format!(
                "too many eligibility proofs (max {MAX_ELIGIBILITY_PROOFS})"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayOutcome {
    pub signature: String,
    pub nullifier: Value,
}

struct Submission {
    instruction: Instruction,
    debug: Value,
    compute_unit_limit: u32,
    compute_unit_price: u64,
    policy: ConfirmPolicy,
}

fn head_hex(b: &[u8]) -> String {
    hex::encode(&b[..b.len().min(32)])
}

fn debug_snapshot(
    req: &RelayerRequest,
    ix: &GatedInstruction,
    nullifier: &NullifierMeta,
    config: &Config,
) -> Value {
    json!({
        "instruction": ix.name(),
        "nullifier": nullifier.to_json(),
        "accounts": req.accounts,
        "proofLen": req.proof.len(),
        "publicInputsLen": req.public_inputs.len(),
        "proofHead": head_hex(&req.proof),
        "publicInputsHead": head_hex(&req.public_inputs),
        "computeUnitLimit": config.compute_unit_limit,
        "computeUnitPriceMicroLamports": config.compute_unit_price_micro_lamports,
    })
}

fn submit_blocking(
    rpc: &dyn ChainRpc,
    payer: &Keypair,
    sub: Submission,
) -> AppResult<Signature> {
    let ixs = [
        ComputeBudgetInstruction::set_compute_unit_limit(sub.compute_unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(sub.compute_unit_price),
        sub.instruction,
    ];

    let (recent, last_valid_block_height) = rpc.latest_blockhash()?;
    let mut tx = Transaction::new_unsigned(Message::new(&ixs, Some(&payer.pubkey())));
    tx.try_sign(&[payer], recent)
        .map_err(|e| AppError::Internal(format!("tx signing failed: {e}")))?;

    // Hard safety: prevent "transaction too large" failures at send-time.
    let tx_bytes = bincode::serialize(&tx)
        .map_err(|e| AppError::Internal(format!("tx serialize failed: {e}")))?;
    if tx_bytes.len() > MAX_TX_SIZE {
        return Err(AppError::BadRequest(format!(
            "relay transaction too large: {} > {MAX_TX_SIZE} bytes (legacy tx)",
            tx_bytes.len()
        )));
    }

    let sim = rpc.simulate(&tx)?;
    if let Some(err) = sim.err {
        let mut debug = sub.debug;
        debug["unitsConsumed"] = json!(sim.units_consumed);
        debug["txSize"] = json!(tx_bytes.len());
        return Err(AppError::SimulationFailed {
            message: err,
            logs: sim.logs,
            debug,
        });
    }
    info!(
        units_consumed = sim.units_consumed,
        tx_size = tx_bytes.len(),
        "simulation ok; sending"
    );

    let sig = rpc.send(&tx)?;
    info!(%sig, "relay tx sent; confirming");
    rpc.confirm(&sig, last_valid_block_height, &sub.policy)?;
    Ok(sig)
}

pub struct RelayEngine {
    config: Arc<Config>,
    rpc: Arc<dyn ChainRpc>,
    pipeline: Arc<ProofPipeline>,
}

impl RelayEngine {
    pub fn new(config: Arc<Config>, rpc: Arc<dyn ChainRpc>, pipeline: Arc<ProofPipeline>) -> Self {
        Self {
            config,
            rpc,
            pipeline,
        }
    }

    pub async fn relay(&self, req: RelayerRequest) -> AppResult<RelayOutcome> {
        let t0 = Instant::now();
        let res = self.relay_inner(req).await;
        let outcome = match &res {
            Ok(_) => "confirmed",
            Err(AppError::SimulationFailed { .. }) => "simulation_failed",
            Err(e) if e.status_code().is_client_error() => "rejected",
            Err(AppError::Unavailable(_)) => "rejected",
            Err(_) => "error",
        };
        metrics::inc_relay(outcome);
        match &res {
            Ok(o) => info!(
                signature = %o.signature,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "relay confirmed"
            ),
            Err(e) => warn!(code = e.code(), outcome, "relay failed"),
        }
        res
    }

    async fn relay_inner(&self, req: RelayerRequest) -> AppResult<RelayOutcome> {
        req.validate()?;
        let payer = self
            .config
            .relayer_keypair
            .clone()
            .ok_or_else(|| AppError::Unavailable("relay authority key is not configured".into()))?;

        let kinds = check_eligibility(&req.eligibility_proofs, req.require_eligibility)?;
        if self.config.verify_eligibility_offchain && !kinds.is_empty() {
            verify_offchain(&self.pipeline, &req.eligibility_proofs, &kinds).await?;
        }

        let ix_data = general_purpose::STANDARD
            .decode(req.instruction_data.trim())
            .map_err(|_| AppError::BadRequest("instructionData is not valid base64".into()))?;
        let ix = GatedInstruction::decode(&ix_data)?;
        let nullifier =
            nullifier_meta_for(&ix, &req.public_inputs, &req.accounts, &self.config.program_id)?;
        let instruction = build_instruction(&ix_data, &req.accounts, &nullifier, &payer.pubkey())?;
        info!(
            instruction = ix.name(),
            nullifier = %nullifier.address,
            accounts = instruction.accounts.len(),
            "relay instruction built"
        );

        let sub = Submission {
            instruction,
            debug: debug_snapshot(&req, &ix, &nullifier, &self.config),
            compute_unit_limit: self.config.compute_unit_limit,
            compute_unit_price: self.config.compute_unit_price_micro_lamports,
            policy: ConfirmPolicy {
                timeout: self.config.confirm_timeout,
                max_polls: self.config.confirm_max_polls,
            },
        };
        let rpc = self.rpc.clone();
        let sig = tokio::task::spawn_blocking(move || submit_blocking(rpc.as_ref(), &payer, sub))
            .await
            .map_err(|e| AppError::Internal(format!("relay task failed: {e}")))??;

        Ok(RelayOutcome {
            signature: sig.to_string(),
            nullifier: nullifier.to_json(),
        })
    }
}
