//! Proof pipeline: compile -> witness -> setup -> prove, plus the verify path.
//!
//! One run per circuit at a time. The keyed lock is taken before the input
//! document is written and released only after the proof bytes are read back,
//! on every exit path. Different circuits never wait on each other.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::field::public_witness_fields;
use crate::metrics;
use crate::proving::artifacts::{self, ArtifactKind, CircuitConfig};
use crate::proving::circuits::CircuitKind;
use crate::proving::preflight::ensure_file_nonempty;
use crate::proving::toolchain::{FailureKind, ToolError, Toolchain, ToolchainStatus};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Keyed lock table: circuit name -> async mutex.
#[derive(Default)]
pub struct CircuitLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CircuitLocks {
    pub async fn acquire(&self, circuit: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(circuit.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Uncompiled,
    Compiled,
    WitnessPending,
    Witnessed,
    SetupPending,
    SetupDone,
    Proven,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Uncompiled => "UNCOMPILED",
            PipelineStage::Compiled => "COMPILED",
            PipelineStage::WitnessPending => "WITNESS_PENDING",
            PipelineStage::Witnessed => "WITNESSED",
            PipelineStage::SetupPending => "SETUP_PENDING",
            PipelineStage::SetupDone => "SETUP_DONE",
            PipelineStage::Proven => "PROVEN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResult {
    pub circuit: String,
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub circuit: String,
    pub ready: bool,
    pub tools: ToolchainStatus,
    pub compiled: bool,
    pub setup: bool,
    pub artifacts: BTreeMap<&'static str, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
}

/// State of one pipeline run. Only used on the blocking pool.
struct Run<'a> {
    circuit: CircuitKind,
    cfg: &'a CircuitConfig,
    stage: PipelineStage,
    stage_ms: BTreeMap<&'static str, u128>,
    compile_skipped: bool,
    setup_skipped: bool,
}

impl<'a> Run<'a> {
    fn new(circuit: CircuitKind, cfg: &'a CircuitConfig) -> Self {
        Self {
            circuit,
            cfg,
            stage: PipelineStage::Uncompiled,
            stage_ms: BTreeMap::new(),
            compile_skipped: false,
            setup_skipped: false,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        info!(
            circuit = self.circuit.name(),
            from = self.stage.as_str(),
            to = next.as_str(),
            "pipeline stage"
        );
        self.stage = next;
    }

    fn timed<T>(
        &mut self,
        step: &'static str,
        f: impl FnOnce() -> AppResult<T>,
    ) -> AppResult<T> {
        let t0 = Instant::now();
        let out = f();
        let ms = t0.elapsed().as_millis();
        self.stage_ms.insert(step, ms);
        metrics::observe_stage(self.circuit.name(), step, ms);
        out
    }

    fn record(&self, kind: ArtifactKind) {
        // A failed record leaves the old entry behind, which reads as stale next time.
        if let Err(e) = artifacts::record(self.cfg, kind) {
            warn!(circuit = %self.cfg.name, artifact = kind.label(), "artifact record failed: {e}");
        }
    }
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Internal(format!(
            "failed to remove stale '{}': {e}",
            path.display()
        ))),
    }
}

fn tools_missing(e: &ToolError) -> Option<AppError> {
    match e {
        ToolError::NotFound { .. } => Some(AppError::ToolsNotAvailable(e.to_string())),
        _ => None,
    }
}

fn compile_stage(run: &mut Run<'_>, tc: &dyn Toolchain) -> AppResult<()> {
    if !artifacts::needs_compile(run.cfg) {
        run.compile_skipped = true;
        metrics::inc_compile_skipped(run.circuit.name());
        debug!(circuit = %run.cfg.name, "compiled program is fresh; compile skipped");
        run.advance(PipelineStage::Compiled);
        return Ok(());
    }
    let cfg = run.cfg;
    run.timed("compile", || {
        tc.compile(cfg).map_err(|e| {
            tools_missing(&e).unwrap_or_else(|| AppError::CircuitNotCompiled(e.to_string()))
        })
    })?;
    if !cfg.path(ArtifactKind::Program).is_file() {
        return Err(AppError::CircuitNotCompiled(format!(
            "compiler produced no program at '{}'",
            cfg.path(ArtifactKind::Program).display()
        )));
    }
    run.record(ArtifactKind::Program);
    run.advance(PipelineStage::Compiled);
    Ok(())
}

fn witness_stage(run: &mut Run<'_>, tc: &dyn Toolchain, document: &str) -> AppResult<()> {
    let cfg = run.cfg;
    run.advance(PipelineStage::WitnessPending);
    fs::write(cfg.prover_input_path(), document)
        .map_err(|e| AppError::Internal(format!("failed to write prover input: {e}")))?;
    let witness = cfg.path(ArtifactKind::Witness);
    remove_if_exists(&witness)?;

    let circuit = run.circuit;
    run.timed("witness", || {
        tc.execute(cfg).map_err(|e| {
            if let Some(err) = tools_missing(&e) {
                return err;
            }
            match e {
                ToolError::Failed {
                    kind: FailureKind::ConstraintViolation,
                    ..
                } => AppError::BusinessRule {
                    reason: circuit.business_rule_reason().to_string(),
                },
                // Tool output may echo inputs; keep it out of the response.
                ToolError::Failed { code, signal, .. } => AppError::WitnessGenerationFailed(
                    format!("witness generator exited (code={code:?}, signal={signal:?})"),
                ),
                other => AppError::WitnessGenerationFailed(other.to_string()),
            }
        })
    })?;
    if !witness.is_file() {
        return Err(AppError::WitnessGenerationFailed(
            "witness generator produced no witness".into(),
        ));
    }
    run.record(ArtifactKind::Witness);
    run.advance(PipelineStage::Witnessed);
    Ok(())
}

fn setup_stage(run: &mut Run<'_>, tc: &dyn Toolchain) -> AppResult<()> {
    run.advance(PipelineStage::SetupPending);
    if !artifacts::needs_setup(run.cfg) {
        run.setup_skipped = true;
        debug!(circuit = %run.cfg.name, "keys are fresh; setup skipped");
        run.advance(PipelineStage::SetupDone);
        return Ok(());
    }
    let cfg = run.cfg;
    let infra = |e: ToolError| {
        tools_missing(&e).unwrap_or_else(|| AppError::ProofGenerationFailed(e.to_string()))
    };
    run.timed("setup", || {
        if !artifacts::is_fresh(cfg, ArtifactKind::ConstraintSystem) {
            tc.compile_ccs(cfg).map_err(infra)?;
            ensure_file_nonempty(&cfg.path(ArtifactKind::ConstraintSystem), "constraint system")?;
            if let Err(e) = artifacts::record(cfg, ArtifactKind::ConstraintSystem) {
                warn!(circuit = %cfg.name, "artifact record failed: {e}");
            }
        }
        tc.setup(cfg).map_err(infra)?;
        ensure_file_nonempty(&cfg.path(ArtifactKind::ProvingKey), "proving key")?;
        ensure_file_nonempty(&cfg.path(ArtifactKind::VerifyingKey), "verifying key")?;
        Ok(())
    })?;
    run.record(ArtifactKind::ProvingKey);
    run.record(ArtifactKind::VerifyingKey);
    run.advance(PipelineStage::SetupDone);
    Ok(())
}

fn prove_stage(run: &mut Run<'_>, tc: &dyn Toolchain) -> AppResult<(Vec<u8>, Vec<u8>)> {
    let cfg = run.cfg;
    let proof_path = cfg.path(ArtifactKind::Proof);
    let pw_path = cfg.path(ArtifactKind::PublicWitness);
    remove_if_exists(&proof_path)?;
    remove_if_exists(&pw_path)?;

    run.timed("prove", || {
        tc.prove(cfg).map_err(|e| {
            tools_missing(&e).unwrap_or_else(|| AppError::ProofGenerationFailed(e.to_string()))
        })
    })?;
    ensure_file_nonempty(&proof_path, "proof")?;
    ensure_file_nonempty(&pw_path, "public witness")?;
    let read = |p: &PathBuf| {
        fs::read(p).map_err(|e| {
            AppError::ProofGenerationFailed(format!("failed to read '{}': {e}", p.display()))
        })
    };
    let proof = read(&proof_path)?;
    let public_inputs = read(&pw_path)?;
    run.record(ArtifactKind::Proof);
    run.record(ArtifactKind::PublicWitness);
    run.advance(PipelineStage::Proven);
    Ok((proof, public_inputs))
}

fn run_pipeline(
    circuit: CircuitKind,
    cfg: &CircuitConfig,
    tc: &dyn Toolchain,
    document: &str,
) -> AppResult<ProofResult> {
    let mut run = Run::new(circuit, cfg);
    compile_stage(&mut run, tc)?;
    witness_stage(&mut run, tc, document)?;
    setup_stage(&mut run, tc)?;
    let (proof, public_inputs) = prove_stage(&mut run, tc)?;

    let public_input_fields = public_witness_fields(&public_inputs).map(|f| f.len() / 32);
    let metadata = json!({
        "circuit": circuit.name(),
        "proofSize": proof.len(),
        "publicInputsSize": public_inputs.len(),
        "publicInputFields": public_input_fields,
        "compileSkipped": run.compile_skipped,
        "setupSkipped": run.setup_skipped,
        "stageMs": run.stage_ms,
    });
    Ok(ProofResult {
        circuit: circuit.name().to_string(),
        proof,
        public_inputs,
        metadata,
    })
}

pub struct ProofPipeline {
    config: Arc<Config>,
    toolchain: Arc<dyn Toolchain>,
    locks: CircuitLocks,
}

impl ProofPipeline {
    pub fn new(config: Arc<Config>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            config,
            toolchain,
            locks: CircuitLocks::default(),
        }
    }

    pub fn circuit_config(&self, circuit: CircuitKind) -> CircuitConfig {
        CircuitConfig::new(&self.config.circuits_dir, circuit.name())
    }

    pub fn probe(&self) -> ToolchainStatus {
        self.toolchain.probe()
    }

    fn ensure_tools(&self) -> AppResult<()> {
        let status = self.toolchain.probe();
        if !status.ready() {
            return Err(AppError::ToolsNotAvailable(format!(
                "missing: {}",
                status.missing().join(", ")
            )));
        }
        Ok(())
    }

    pub async fn generate_full_proof(
        &self,
        circuit: &str,
        inputs: &Value,
    ) -> AppResult<ProofResult> {
        let kind = CircuitKind::from_name(circuit)?;
        let table = kind.prover_input(inputs)?;
        let document = toml::to_string(&table)
            .map_err(|e| AppError::Internal(format!("failed to encode prover input: {e}")))?;
        self.ensure_tools()?;

        let cfg = self.circuit_config(kind);
        if !cfg.circuit_source_dir.join("Nargo.toml").is_file() {
            return Err(AppError::CircuitNotCompiled(format!(
                "circuit source not found at '{}'",
                cfg.circuit_source_dir.display()
            )));
        }

        let guard = self.locks.acquire(kind.name()).await;
        let tc = self.toolchain.clone();
        let t0 = Instant::now();
        let res = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            run_pipeline(kind, &cfg, tc.as_ref(), &document)
        })
        .await
        .map_err(|e| AppError::Internal(format!("pipeline task failed: {e}")))?;

        let outcome = match &res {
            Ok(_) => "ok",
            Err(AppError::BusinessRule { .. }) => "business_rule",
            Err(_) => "error",
        };
        metrics::inc_prove_run(kind.name(), outcome);
        info!(
            circuit = kind.name(),
            outcome,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "proof pipeline finished"
        );
        res
    }

    /// Verifying key: the circuit's own target dir first, then `VERIFIER_KEYS_DIR`.
    fn locate_vk(&self, cfg: &CircuitConfig) -> Option<PathBuf> {
        let primary = cfg.path(ArtifactKind::VerifyingKey);
        if primary.is_file() {
            return Some(primary);
        }
        let secondary = self
            .config
            .verifier_keys_dir
            .as_ref()?
            .join(format!("{}.vk", cfg.name));
        secondary.is_file().then_some(secondary)
    }

    pub async fn verify_proof(
        &self,
        circuit: &str,
        proof: &[u8],
        public_inputs: &[u8],
    ) -> AppResult<bool> {
        let kind = CircuitKind::from_name(circuit)?;
        if proof.is_empty() || public_inputs.is_empty() {
            return Err(AppError::BadRequest(
                "proof and publicInputs must be non-empty".into(),
            ));
        }
        let cfg = self.circuit_config(kind);

        // Unique per call; the directory and its files go away when `scratch` drops.
        let nonce: u64 = rand::random();
        let scratch = tempfile::Builder::new()
            .prefix(&format!("verify-{}-{nonce:016x}-", kind.name()))
            .tempdir_in(&self.config.tmpdir)
            .map_err(|e| AppError::Internal(format!("failed to create verify tempdir: {e}")))?;

        // setup rewrites the key under the circuit lock; snapshot it under the same lock.
        let vk = scratch.path().join(format!("{}.vk", kind.name()));
        {
            let _guard = self.locks.acquire(kind.name()).await;
            let source = self.locate_vk(&cfg).ok_or_else(|| {
                AppError::CircuitNotCompiled(format!(
                    "no verifying key for circuit '{}'",
                    kind.name()
                ))
            })?;
            fs::copy(&source, &vk)
                .map_err(|e| AppError::Internal(format!("failed to copy verifying key: {e}")))?;
        }
        let proof_path = scratch.path().join(format!("{}.proof", kind.name()));
        let pw_path = scratch.path().join(format!("{}.pw", kind.name()));
        fs::write(&proof_path, proof)
            .and_then(|_| fs::write(&pw_path, public_inputs))
            .map_err(|e| AppError::Internal(format!("failed to write verify inputs: {e}")))?;

        let tc = self.toolchain.clone();
        let t0 = Instant::now();
        let res = tokio::task::spawn_blocking(move || {
            let out = tc.verify(&cfg, &vk, &proof_path, &pw_path);
            drop(scratch);
            out
        })
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?;
        metrics::observe_stage(kind.name(), "verify", t0.elapsed().as_millis());

        res.map_err(|e| {
            tools_missing(&e).unwrap_or_else(|| AppError::VerificationFailed(e.to_string()))
        })
    }

    pub fn status(&self, circuit: &str) -> AppResult<CircuitStatus> {
        let kind = CircuitKind::from_name(circuit)?;
        let cfg = self.circuit_config(kind);
        let tools = self.toolchain.probe();
        let compiled = artifacts::is_compiled(&cfg);
        let setup = !artifacts::needs_setup(&cfg);
        let has_source = cfg.circuit_source_dir.join("Nargo.toml").is_file();
        let ready = tools.ready() && has_source;

        let instructions = (!ready || !compiled).then(|| {
            let mut steps = Vec::new();
            for tool in tools.missing() {
                steps.push(format!("Install {tool} and make it available on PATH"));
            }
            if !has_source {
                steps.push(format!(
                    "Place the {} circuit project at {}",
                    kind.name(),
                    cfg.circuit_source_dir.display()
                ));
            }
            if !compiled {
                steps.push(format!(
                    "cd {} && nargo compile",
                    cfg.circuit_source_dir.display()
                ));
            }
            steps
        });

        Ok(CircuitStatus {
            circuit: kind.name().to_string(),
            ready,
            tools,
            compiled,
            setup,
            artifacts: artifacts::presence(&cfg),
            instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proving::toolchain::ToolStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    #[derive(Default)]
    struct Counters {
        compile: AtomicUsize,
        execute: AtomicUsize,
        setup: AtomicUsize,
        prove: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Writes fixture artifacts. `execute` fails the constraint when the
    /// input document carries `balance = "0"`.
    #[derive(Default)]
    struct FakeToolchain {
        counters: Counters,
        execute_delay: Option<Duration>,
        verify_seen: Mutex<Vec<PathBuf>>,
    }

    fn tool(available: bool) -> ToolStatus {
        ToolStatus {
            configured: "fake".into(),
            resolved: Some("fake".into()),
            available,
        }
    }

    fn write(p: PathBuf, bytes: &[u8]) -> Result<(), ToolError> {
        fs::write(p, bytes).map_err(|source| ToolError::Io {
            step: "fake",
            source,
        })
    }

    impl Toolchain for FakeToolchain {
        fn probe(&self) -> ToolchainStatus {
            ToolchainStatus {
                nargo: tool(true),
                sunspot: tool(true),
            }
        }

        fn compile(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
            self.counters.compile.fetch_add(1, Ordering::SeqCst);
            fs::create_dir_all(&cfg.artifact_dir).map_err(|source| ToolError::Io {
                step: "fake",
                source,
            })?;
            write(cfg.path(ArtifactKind::Program), b"{\"bytecode\":\"x\"}")
        }

        fn execute(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
            let c = &self.counters;
            let now = c.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            c.max_in_flight.fetch_max(now, Ordering::SeqCst);
            c.execute.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.execute_delay {
                std::thread::sleep(d);
            }
            c.in_flight.fetch_sub(1, Ordering::SeqCst);

            let doc = fs::read_to_string(cfg.prover_input_path()).unwrap_or_default();
            if doc.contains("balance = \"0\"") {
                return Err(ToolError::Failed {
                    tool: "nargo",
                    step: "execute",
                    code: Some(1),
                    signal: None,
                    stdout: String::new(),
                    stderr: "error: Failed assertion".into(),
                    kind: FailureKind::ConstraintViolation,
                });
            }
            write(cfg.path(ArtifactKind::Witness), b"witness")
        }

        fn compile_ccs(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
            write(cfg.path(ArtifactKind::ConstraintSystem), b"ccs")
        }

        fn setup(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
            self.counters.setup.fetch_add(1, Ordering::SeqCst);
            write(cfg.path(ArtifactKind::ProvingKey), b"pk")?;
            write(cfg.path(ArtifactKind::VerifyingKey), b"vk")
        }

        fn prove(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
            self.counters.prove.fetch_add(1, Ordering::SeqCst);
            write(cfg.path(ArtifactKind::Proof), &[7u8; 256])?;
            write(cfg.path(ArtifactKind::PublicWitness), &[0u8; 3 * 32 + 12])
        }

        fn verify(
            &self,
            _cfg: &CircuitConfig,
            _vk: &Path,
            proof: &Path,
            public_witness: &Path,
        ) -> Result<bool, ToolError> {
            assert!(public_witness.is_file());
            self.verify_seen
                .lock()
                .unwrap()
                .push(proof.parent().unwrap().to_path_buf());
            let bytes = fs::read(proof).map_err(|source| ToolError::Io {
                step: "fake",
                source,
            })?;
            if bytes == b"crash" {
                return Err(ToolError::Failed {
                    tool: "sunspot",
                    step: "verify",
                    code: None,
                    signal: Some(9),
                    stdout: String::new(),
                    stderr: String::new(),
                    kind: FailureKind::Other,
                });
            }
            Ok(bytes == b"good")
        }
    }

    fn project(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("Nargo.toml"), "[package]\n").unwrap();
        fs::write(dir.join("src/main.nr"), "fn main() {}\n").unwrap();
    }

    fn pipeline(root: &Path, tc: Arc<FakeToolchain>) -> ProofPipeline {
        let mut cfg = Config::with_circuits_dir(root);
        cfg.tmpdir = root.join("tmp");
        fs::create_dir_all(&cfg.tmpdir).unwrap();
        ProofPipeline::new(Arc::new(cfg), tc)
    }

    fn min_balance(balance: u64) -> Value {
        json!({ "owner": "1", "token_mint": "2", "threshold": 0, "balance": balance })
    }

    #[tokio::test]
    async fn compile_runs_once_for_unchanged_source() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let tc = Arc::new(FakeToolchain::default());
        let p = pipeline(dir.path(), tc.clone());

        let first = p.generate_full_proof("min_balance", &min_balance(5)).await.unwrap();
        assert!(!first.proof.is_empty());
        assert_eq!(first.metadata["compileSkipped"], false);
        assert_eq!(first.metadata["publicInputFields"], 3);

        let second = p.generate_full_proof("min_balance", &min_balance(6)).await.unwrap();
        assert_eq!(second.metadata["compileSkipped"], true);
        assert_eq!(second.metadata["setupSkipped"], true);
        assert_eq!(tc.counters.compile.load(Ordering::SeqCst), 1);
        assert_eq!(tc.counters.setup.load(Ordering::SeqCst), 1);
        assert_eq!(tc.counters.execute.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn touched_source_triggers_recompile() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let tc = Arc::new(FakeToolchain::default());
        let p = pipeline(dir.path(), tc.clone());
        p.generate_full_proof("min_balance", &min_balance(5)).await.unwrap();

        let src = dir.path().join("min_balance/src/main.nr");
        fs::File::options()
            .append(true)
            .open(&src)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(30))
            .unwrap();

        let res = p.generate_full_proof("min_balance", &min_balance(5)).await.unwrap();
        assert_eq!(res.metadata["compileSkipped"], false);
        assert_eq!(tc.counters.compile.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn constraint_violation_is_business_rule() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let tc = Arc::new(FakeToolchain::default());
        let p = pipeline(dir.path(), tc.clone());

        let err = p
            .generate_full_proof("min_balance", &min_balance(0))
            .await
            .unwrap_err();
        match &err {
            AppError::BusinessRule { reason } => assert_eq!(reason, "balance below threshold"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tc.counters.prove.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_source_is_not_compiled() {
        let dir = tempfile::tempdir().unwrap();
        let tc = Arc::new(FakeToolchain::default());
        let p = pipeline(dir.path(), tc.clone());
        let err = p
            .generate_full_proof("token_holder", &json!({
                "owner": "1", "token_mint": "2", "minimum": 1, "amount": 2
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CircuitNotCompiled(_)));
        assert_eq!(tc.counters.compile.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_circuit_runs_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let tc = Arc::new(FakeToolchain {
            execute_delay: Some(Duration::from_millis(50)),
            ..FakeToolchain::default()
        });
        let p = Arc::new(pipeline(dir.path(), tc.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let p = p.clone();
                tokio::spawn(async move {
                    p.generate_full_proof("min_balance", &min_balance(10 + i)).await
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(tc.counters.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(tc.counters.compile.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_circuits_overlap() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        project(dir.path(), "token_holder");
        let tc = Arc::new(FakeToolchain {
            execute_delay: Some(Duration::from_millis(300)),
            ..FakeToolchain::default()
        });
        let p = Arc::new(pipeline(dir.path(), tc.clone()));

        let a = {
            let p = p.clone();
            tokio::spawn(async move { p.generate_full_proof("min_balance", &min_balance(1)).await })
        };
        let b = {
            let p = p.clone();
            tokio::spawn(async move {
                p.generate_full_proof(
                    "token_holder",
                    &json!({ "owner": "1", "token_mint": "2", "minimum": 1, "amount": 2 }),
                )
                .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(tc.counters.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn verify_cleans_up_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let tc = Arc::new(FakeToolchain::default());
        let p = pipeline(dir.path(), tc.clone());
        p.generate_full_proof("min_balance", &min_balance(5)).await.unwrap();

        assert!(p.verify_proof("min_balance", b"good", &[1; 32]).await.unwrap());
        assert!(!p.verify_proof("min_balance", b"bad", &[1; 32]).await.unwrap());

        let seen = tc.verify_seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        for d in seen {
            assert!(!d.exists());
        }
        let left = fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn verifier_crash_is_an_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let tc = Arc::new(FakeToolchain::default());
        let p = pipeline(dir.path(), tc.clone());
        p.generate_full_proof("min_balance", &min_balance(5)).await.unwrap();

        let err = p.verify_proof("min_balance", b"crash", &[1; 32]).await.unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let seen = tc.verify_seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn verify_reads_the_key_under_the_circuit_lock() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let p = pipeline(dir.path(), Arc::new(FakeToolchain::default()));
        p.generate_full_proof("min_balance", &min_balance(5)).await.unwrap();

        let guard = p.locks.acquire("min_balance").await;
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            p.verify_proof("min_balance", b"good", &[1; 32]),
        )
        .await;
        assert!(blocked.is_err());
        drop(guard);

        assert!(p.verify_proof("min_balance", b"good", &[1; 32]).await.unwrap());
    }

    #[tokio::test]
    async fn verify_without_key_is_not_compiled() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "min_balance");
        let p = pipeline(dir.path(), Arc::new(FakeToolchain::default()));
        let err = p.verify_proof("min_balance", b"good", &[1; 32]).await.unwrap_err();
        assert!(matches!(err, AppError::CircuitNotCompiled(_)));
    }

    #[test]
    fn status_lists_instructions_until_compiled() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "not_blacklisted");
        let p = pipeline(dir.path(), Arc::new(FakeToolchain::default()));
        let s = p.status("not_blacklisted").unwrap();
        assert!(s.ready);
        assert!(!s.compiled);
        let steps = s.instructions.unwrap();
        assert!(steps.iter().any(|l| l.contains("nargo compile")));
        assert!(matches!(p.status("nope"), Err(AppError::UnknownCircuit(_))));
    }
}
