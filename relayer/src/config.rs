//! Environment-driven configuration, loaded once at startup.
//!
//! Components receive an `Arc<Config>` in their constructors; nothing below
//! `main` reads the environment.

use crate::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_CIRCUITS_DIR, DEFAULT_COMPUTE_UNIT_LIMIT,
    DEFAULT_COMPUTE_UNIT_PRICE_MICRO_LAMPORTS, DEFAULT_CONFIRM_MAX_POLLS,
    DEFAULT_CONFIRM_TIMEOUT_SECS, DEFAULT_NARGO_PATH, DEFAULT_PROGRAM_ID, DEFAULT_RPC_TIMEOUT_SECS,
    DEFAULT_RL_BAD_PER_MIN, DEFAULT_RL_OK_PER_MIN, DEFAULT_RPC_URL, DEFAULT_SUNSPOT_PATH,
    MAX_COMPUTE_UNIT_LIMIT,
};
use anyhow::Context;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct Config {
    /// Solana HTTP RPC endpoint.
    pub rpc_url: String,
    /// Gated program id; owner of the nullifier PDAs.
    pub program_id: Pubkey,
    /// Circuit-artifact root. Each circuit lives in `<circuits_dir>/<name>/`.
    pub circuits_dir: PathBuf,
    /// Secondary location for `<name>.vk` when the circuit's own target dir has none.
    pub verifier_keys_dir: Option<PathBuf>,
    /// Relay authority (fee payer + signer). `None` disables `/api/relayer`.
    pub relayer_keypair: Option<Arc<Keypair>>,
    pub bind_addr: String,
    pub rpc_timeout: Duration,
    pub confirm_timeout: Duration,
    pub confirm_max_polls: u32,
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    pub nargo_path: PathBuf,
    pub sunspot_path: PathBuf,
    /// Also run the verifier on eligibility proofs before relaying.
    pub verify_eligibility_offchain: bool,
    /// Scratch space for verify temp files.
    pub tmpdir: PathBuf,
    /// Token-bucket budgets per client IP, per minute.
    pub rl_ok_per_min: u32,
    pub rl_bad_per_min: u32,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let s = v.trim().to_lowercase();
            matches!(s.as_str(), "1" | "true" | "yes" | "y" | "on")
        })
        .unwrap_or(default)
}

fn clamp_u64(key: &str, v: u64, min: u64, max: u64) -> u64 {
    let c = v.clamp(min, max);
    if c != v {
        warn!(key, value = v, clamped = c, "config value out of range; clamped");
    }
    c
}

/// Prefer tmpfs if available. Override via RELAYER_TMPDIR.
fn pick_tmpdir(explicit: Option<String>) -> PathBuf {
    let mut opts: Vec<PathBuf> = Vec::new();
    if let Some(v) = explicit {
        opts.push(PathBuf::from(v));
    }
    opts.push(PathBuf::from("/dev/shm"));
    for p in opts {
        if p.is_dir() {
            return p;
        }
    }
    env::temp_dir()
}

fn load_relayer_keypair() -> anyhow::Result<Option<Arc<Keypair>>> {
    let path = env_opt("RELAYER_KEYPAIR_PATH");
    let b58 = env_opt("RELAYER_PRIVATE_KEY");
    match (path, b58) {
        (Some(_), Some(_)) => {
            anyhow::bail!("set only one of RELAYER_KEYPAIR_PATH or RELAYER_PRIVATE_KEY")
        }
        (Some(p), None) => {
            let kp = read_keypair_file(&p)
                .map_err(|e| anyhow::anyhow!("failed to read RELAYER_KEYPAIR_PATH '{p}': {e}"))?;
            Ok(Some(Arc::new(kp)))
        }
        (None, Some(s)) => {
            let bytes = bs58::decode(&s)
                .into_vec()
                .context("RELAYER_PRIVATE_KEY is not valid base58")?;
            if bytes.len() != 64 {
                anyhow::bail!(
                    "RELAYER_PRIVATE_KEY must decode to 64 bytes, got {}",
                    bytes.len()
                );
            }
            let kp = Keypair::from_bytes(&bytes)
                .map_err(|e| anyhow::anyhow!("RELAYER_PRIVATE_KEY is not a valid keypair: {e}"))?;
            Ok(Some(Arc::new(kp)))
        }
        (None, None) => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let rpc_url = env_opt("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let program_id = Pubkey::from_str(
            &env_opt("PROGRAM_ID").unwrap_or_else(|| DEFAULT_PROGRAM_ID.to_string()),
        )
        .context("Invalid PROGRAM_ID")?;

        let circuits_dir = PathBuf::from(
            env_opt("CIRCUITS_DIR").unwrap_or_else(|| DEFAULT_CIRCUITS_DIR.to_string()),
        );
        if !circuits_dir.is_dir() {
            warn!(
                path = %circuits_dir.display(),
                "CIRCUITS_DIR does not exist; proving endpoints will report not ready"
            );
        }

        let rpc_timeout_secs = clamp_u64(
            "RPC_TIMEOUT_SECS",
            env_u64("RPC_TIMEOUT_SECS", DEFAULT_RPC_TIMEOUT_SECS),
            1,
            300,
        );
        let confirm_timeout_secs = clamp_u64(
            "CONFIRM_TIMEOUT_SECS",
            env_u64("CONFIRM_TIMEOUT_SECS", DEFAULT_CONFIRM_TIMEOUT_SECS),
            5,
            600,
        );
        let confirm_max_polls = clamp_u64(
            "CONFIRM_MAX_POLLS",
            env_u64("CONFIRM_MAX_POLLS", DEFAULT_CONFIRM_MAX_POLLS as u64),
            1,
            1_000,
        ) as u32;
        let compute_unit_limit = clamp_u64(
            "COMPUTE_UNIT_LIMIT",
            env_u64("COMPUTE_UNIT_LIMIT", DEFAULT_COMPUTE_UNIT_LIMIT as u64),
            10_000,
            MAX_COMPUTE_UNIT_LIMIT as u64,
        ) as u32;

        Ok(Self {
            rpc_url,
            program_id,
            circuits_dir,
            verifier_keys_dir: env_opt("VERIFIER_KEYS_DIR").map(PathBuf::from),
            relayer_keypair: load_relayer_keypair()?,
            bind_addr: env_opt("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            confirm_timeout: Duration::from_secs(confirm_timeout_secs),
            confirm_max_polls,
            compute_unit_limit,
            compute_unit_price_micro_lamports: env_u64(
                "COMPUTE_UNIT_PRICE_MICRO_LAMPORTS",
                DEFAULT_COMPUTE_UNIT_PRICE_MICRO_LAMPORTS,
            ),
            nargo_path: PathBuf::from(
                env_opt("NARGO_PATH").unwrap_or_else(|| DEFAULT_NARGO_PATH.to_string()),
            ),
            sunspot_path: PathBuf::from(
                env_opt("SUNSPOT_PATH").unwrap_or_else(|| DEFAULT_SUNSPOT_PATH.to_string()),
            ),
            verify_eligibility_offchain: env_bool("VERIFY_ELIGIBILITY_OFFCHAIN", false),
            tmpdir: pick_tmpdir(env_opt("RELAYER_TMPDIR")),
            rl_ok_per_min: clamp_u64(
                "RELAYER_RL_OK_PER_MIN",
                env_u64("RELAYER_RL_OK_PER_MIN", DEFAULT_RL_OK_PER_MIN as u64),
                1,
                10_000,
            ) as u32,
            rl_bad_per_min: clamp_u64(
                "RELAYER_RL_BAD_PER_MIN",
                env_u64("RELAYER_RL_BAD_PER_MIN", DEFAULT_RL_BAD_PER_MIN as u64),
                1,
                10_000,
            ) as u32,
        })
    }

    /// Defaults without touching the environment. Used by tests and tooling.
    pub fn with_circuits_dir(circuits_dir: impl Into<PathBuf>) -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            program_id: Pubkey::from_str(DEFAULT_PROGRAM_ID).unwrap_or_default(),
            circuits_dir: circuits_dir.into(),
            verifier_keys_dir: None,
            relayer_keypair: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            confirm_timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
            confirm_max_polls: DEFAULT_CONFIRM_MAX_POLLS,
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
            compute_unit_price_micro_lamports: DEFAULT_COMPUTE_UNIT_PRICE_MICRO_LAMPORTS,
            nargo_path: PathBuf::from(DEFAULT_NARGO_PATH),
            sunspot_path: PathBuf::from(DEFAULT_SUNSPOT_PATH),
            verify_eligibility_offchain: false,
            tmpdir: env::temp_dir(),
            rl_ok_per_min: DEFAULT_RL_OK_PER_MIN,
            rl_bad_per_min: DEFAULT_RL_BAD_PER_MIN,
        }
    }

    pub fn relayer_pubkey(&self) -> Option<Pubkey> {
        use solana_sdk::signer::Signer;
        self.relayer_keypair.as_ref().map(|k| k.pubkey())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_program_id() {
        let cfg = Config::with_circuits_dir("/tmp/circuits");
        assert_eq!(cfg.program_id.to_string(), DEFAULT_PROGRAM_ID);
        assert!(cfg.relayer_pubkey().is_none());
        assert_eq!(cfg.compute_unit_limit, DEFAULT_COMPUTE_UNIT_LIMIT);
    }

    #[test]
    fn clamp_keeps_in_range_values() {
        assert_eq!(clamp_u64("X", 50, 1, 100), 50);
        assert_eq!(clamp_u64("X", 0, 1, 100), 1);
        assert_eq!(clamp_u64("X", 500, 1, 100), 100);
    }
}
