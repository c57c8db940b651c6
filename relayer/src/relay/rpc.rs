//! Chain RPC port. The engine only talks to the cluster through [`ChainRpc`],
//! so tests substitute a recording fake.

use crate::constants::{SPL_ASSOCIATED_TOKEN_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID};
use crate::error::{AppError, AppResult};
use crate::utils::associated_token_address;
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::TransactionConfirmationStatus;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub timeout: Duration,
    pub max_polls: u32,
}

pub trait ChainRpc: Send + Sync {
    /// Blockhash plus the last block height at which it is still valid.
    fn latest_blockhash(&self) -> AppResult<(Hash, u64)>;
    fn simulate(&self, tx: &Transaction) -> AppResult<SimulationOutcome>;
    fn send(&self, tx: &Transaction) -> AppResult<Signature>;
    fn confirm(
        &self,
        sig: &Signature,
        last_valid_block_height: u64,
        policy: &ConfirmPolicy,
    ) -> AppResult<()>;
    /// Balance of the owner's associated token account; 0 when it does not exist.
    fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> AppResult<u64>;
}

pub struct SolanaRpc {
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(rpc_url: String, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                rpc_url,
                timeout,
                CommitmentConfig::confirmed(),
            ),
        }
    }
}

impl ChainRpc for SolanaRpc {
    fn latest_blockhash(&self) -> AppResult<(Hash, u64)> {
        self.client
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .map_err(|e| AppError::BadGateway(format!("get_latest_blockhash failed: {e}")))
    }

    fn simulate(&self, tx: &Transaction) -> AppResult<SimulationOutcome> {
        let cfg = RpcSimulateTransactionConfig {
            sig_verify: true,
            replace_recent_blockhash: false,
            commitment: Some(CommitmentConfig::confirmed()),
            ..RpcSimulateTransactionConfig::default()
        };
        let res = self
            .client
            .simulate_transaction_with_config(tx, cfg)
            .map_err(|e| AppError::BadGateway(format!("simulate_transaction failed: {e}")))?;
        let v = res.value;
        Ok(SimulationOutcome {
            err: v.err.map(|e| format!("{e:?}")),
            logs: v.logs.unwrap_or_default(),
            units_consumed: v.units_consumed,
        })
    }

    fn send(&self, tx: &Transaction) -> AppResult<Signature> {
        let cfg = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, cfg)
            .map_err(|e| AppError::BadGateway(format!("send_transaction failed: {e}")))
    }

    fn confirm(
        &self,
        sig: &Signature,
        last_valid_block_height: u64,
        policy: &ConfirmPolicy,
    ) -> AppResult<()> {
        let t0 = Instant::now();
        let mut backoff_ms: u64 = 250;
        for poll in 1..=policy.max_polls {
            if t0.elapsed() > policy.timeout {
                return Err(AppError::BadGateway(format!(
                    "tx confirmation timeout after {}s",
                    policy.timeout.as_secs()
                )));
            }

            let st = self
                .client
                .get_signature_statuses(&[*sig])
                .map_err(|e| AppError::BadGateway(format!("get_signature_statuses failed: {e}")))?;

            if let Some(s0) = st.value.first().and_then(|v| v.as_ref()) {
                if let Some(err) = &s0.err {
                    warn!(%sig, ?err, "tx failed while confirming");
                    return Err(AppError::BadGateway(format!("transaction failed: {err:?}")));
                }
                if matches!(
                    s0.confirmation_status,
                    Some(
                        TransactionConfirmationStatus::Confirmed
                            | TransactionConfirmationStatus::Finalized
                    )
                ) {
                    debug!(%sig, poll, "tx confirmed");
                    return Ok(());
                }
            } else {
                let height = self
                    .client
                    .get_block_height()
                    .map_err(|e| AppError::BadGateway(format!("get_block_height failed: {e}")))?;
                if height > last_valid_block_height {
                    return Err(AppError::BadGateway(format!(
                        "transaction expired: block height {height} passed last valid {last_valid_block_height}"
                    )));
                }
            }

            std::thread::sleep(Duration::from_millis(backoff_ms));
            backoff_ms = (backoff_ms.saturating_mul(2)).min(2_000);
        }
        Err(AppError::BadGateway(format!(
            "tx not confirmed after {} polls",
            policy.max_polls
        )))
    }

    fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> AppResult<u64> {
        let ata = associated_token_address(
            owner,
            mint,
            &SPL_TOKEN_PROGRAM_ID,
            &SPL_ASSOCIATED_TOKEN_PROGRAM_ID,
        );
        let exists = self
            .client
            .get_account_with_commitment(&ata, CommitmentConfig::confirmed())
            .map_err(|e| AppError::BadGateway(format!("get_account failed: {e}")))?
            .value
            .is_some();
        if !exists {
            return Ok(0);
        }
        let bal = self
            .client
            .get_token_account_balance(&ata)
            .map_err(|e| AppError::BadGateway(format!("get_token_account_balance failed: {e}")))?;
        bal.amount
            .parse::<u64>()
            .map_err(|_| AppError::BadGateway("token balance is not an integer".into()))
    }
}
