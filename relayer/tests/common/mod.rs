#![allow(dead_code)]

use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zkgate_relayer::proving::artifacts::{ArtifactKind, CircuitConfig};
use zkgate_relayer::proving::toolchain::{
    FailureKind, ToolError, ToolStatus, ToolchainStatus,
};
use zkgate_relayer::proving::Toolchain;
use zkgate_relayer::relay::rpc::{ConfirmPolicy, SimulationOutcome};
use zkgate_relayer::relay::ChainRpc;
use zkgate_relayer::{AppError, AppResult, AppState, Config};

pub const CIRCUITS: [&str; 4] = ["min_balance", "token_holder", "not_blacklisted", "shielded_spend"];

fn io(source: std::io::Error) -> ToolError {
    ToolError::Io {
        step: "fake",
        source,
    }
}

fn field_u64(doc: &toml::Table, key: &str) -> u64 {
    match doc.get(key) {
        Some(toml::Value::String(s)) => s.parse().unwrap_or(0),
        Some(toml::Value::Integer(n)) => *n as u64,
        _ => 0,
    }
}

/// Writes fixture artifacts and evaluates the min_balance constraint itself.
#[derive(Default)]
pub struct FakeToolchain;

impl Toolchain for FakeToolchain {
    fn probe(&self) -> ToolchainStatus {
        let ok = || ToolStatus {
            configured: "fake".into(),
            resolved: Some("fake".into()),
            available: true,
        };
        ToolchainStatus {
            nargo: ok(),
            sunspot: ok(),
        }
    }

    fn compile(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        fs::create_dir_all(&cfg.artifact_dir).map_err(io)?;
        fs::write(cfg.path(ArtifactKind::Program), b"{}").map_err(io)
    }

    fn execute(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        let raw = fs::read_to_string(cfg.prover_input_path()).map_err(io)?;
        let doc: toml::Table = raw.parse().unwrap_or_default();
        if cfg.name == "min_balance" && field_u64(&doc, "balance") < field_u64(&doc, "threshold") {
            return Err(ToolError::Failed {
                tool: "nargo",
                step: "execute",
                code: Some(1),
                signal: None,
                stdout: String::new(),
                stderr: "error: Failed constraint".into(),
                kind: FailureKind::ConstraintViolation,
            });
        }
        fs::write(cfg.path(ArtifactKind::Witness), b"witness").map_err(io)
    }

    fn compile_ccs(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        fs::write(cfg.path(ArtifactKind::ConstraintSystem), b"ccs").map_err(io)
    }

    fn setup(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        fs::write(cfg.path(ArtifactKind::ProvingKey), b"pk").map_err(io)?;
        fs::write(cfg.path(ArtifactKind::VerifyingKey), b"vk").map_err(io)
    }

    fn prove(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        fs::write(cfg.path(ArtifactKind::Proof), [9u8; 324]).map_err(io)?;
        fs::write(cfg.path(ArtifactKind::PublicWitness), [0u8; 12 + 4 * 32]).map_err(io)
    }

    fn verify(
        &self,
        _cfg: &CircuitConfig,
        _vk: &Path,
        proof: &Path,
        _public_witness: &Path,
    ) -> Result<bool, ToolError> {
        let bytes = fs::read(proof).map_err(io)?;
        Ok(bytes.iter().all(|b| *b == 9))
    }
}

/// Counts every call; all chain operations fail so a stray call is visible.
#[derive(Default)]
pub struct FakeRpc {
    pub calls: AtomicUsize,
    pub balance: u64,
}

impl FakeRpc {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChainRpc for FakeRpc {
    fn latest_blockhash(&self) -> AppResult<(Hash, u64)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::BadGateway("offline".into()))
    }
    fn simulate(&self, _tx: &Transaction) -> AppResult<SimulationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::BadGateway("offline".into()))
    }
    fn send(&self, _tx: &Transaction) -> AppResult<Signature> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::BadGateway("offline".into()))
    }
    fn confirm(&self, _: &Signature, _: u64, _: &ConfirmPolicy) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::BadGateway("offline".into()))
    }
    fn token_balance(&self, _: &Pubkey, _: &Pubkey) -> AppResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance)
    }
}

/// A circuits root with a Noir project per known circuit.
pub fn circuits_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in CIRCUITS {
        let c = dir.path().join(name);
        fs::create_dir_all(c.join("src")).unwrap();
        fs::write(c.join("Nargo.toml"), "[package]\n").unwrap();
        fs::write(c.join("src/main.nr"), "fn main() {}\n").unwrap();
    }
    dir
}

pub fn state(root: &Path, rpc: Arc<FakeRpc>, config: impl FnOnce(&mut Config)) -> Arc<AppState> {
    let mut cfg = Config::with_circuits_dir(root);
    cfg.tmpdir = root.to_path_buf();
    config(&mut cfg);
    Arc::new(AppState::new(cfg, Arc::new(FakeToolchain), rpc))
}
