//! On-disk circuit artifacts and their staleness rules.
//!
//! Layout per circuit (`<root>/<name>/`):
//!
//! ```text
//! Nargo.toml, src/*.nr        source program
//! Prover.toml                 private + public input document
//! target/<name>.json          compiled program
//! target/<name>.gz            witness
//! target/<name>.ccs           constraint system
//! target/<name>.pk / .vk      proving / verifying key
//! target/<name>.proof / .pw   proof / public witness
//! target/artifacts.manifest.json
//! ```
//!
//! Freshness is decided from the manifest: each produced artifact records a
//! generation number and the fingerprints (size, mtime, sha256) of the inputs
//! it was built from. Any fingerprint difference means stale. Without a
//! manifest entry we fall back to comparing modification times. Every I/O
//! error answers "stale" so that we recompute rather than serve old output.
//!
//! Nothing here locks; callers serialize per circuit.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "artifacts.manifest.json";
const MANIFEST_VERSION: u32 = 1;
pub const PROVER_INPUT_FILE: &str = "Prover.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Program,
    Witness,
    ConstraintSystem,
    ProvingKey,
    VerifyingKey,
    Proof,
    PublicWitness,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Program,
        ArtifactKind::Witness,
        ArtifactKind::ConstraintSystem,
        ArtifactKind::ProvingKey,
        ArtifactKind::VerifyingKey,
        ArtifactKind::Proof,
        ArtifactKind::PublicWitness,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Program => "json",
            ArtifactKind::Witness => "gz",
            ArtifactKind::ConstraintSystem => "ccs",
            ArtifactKind::ProvingKey => "pk",
            ArtifactKind::VerifyingKey => "vk",
            ArtifactKind::Proof => "proof",
            ArtifactKind::PublicWitness => "pw",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Program => "program",
            ArtifactKind::Witness => "witness",
            ArtifactKind::ConstraintSystem => "constraint_system",
            ArtifactKind::ProvingKey => "proving_key",
            ArtifactKind::VerifyingKey => "verifying_key",
            ArtifactKind::Proof => "proof",
            ArtifactKind::PublicWitness => "public_witness",
        }
    }
}

/// Paths for one circuit. Built per request from a known circuit name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitConfig {
    pub name: String,
    pub circuit_source_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

impl CircuitConfig {
    pub fn new(root: &Path, name: &str) -> Self {
        let circuit_source_dir = root.join(name);
        let artifact_dir = circuit_source_dir.join("target");
        Self {
            name: name.to_string(),
            circuit_source_dir,
            artifact_dir,
        }
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.artifact_dir
            .join(format!("{}.{}", self.name, kind.extension()))
    }

    pub fn prover_input_path(&self) -> PathBuf {
        self.circuit_source_dir.join(PROVER_INPUT_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.artifact_dir.join(MANIFEST_FILE)
    }

    /// `Nargo.toml` plus every `.nr` file under `src/`, sorted.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let mut out = vec![self.circuit_source_dir.join("Nargo.toml")];
        let mut stack = vec![self.circuit_source_dir.join("src")];
        let mut nr = Vec::new();
        while let Some(dir) = stack.pop() {
            let Ok(rd) = fs::read_dir(&dir) else { continue };
            for ent in rd.flatten() {
                let p = ent.path();
                if p.is_dir() {
                    stack.push(p);
                } else if p.extension().and_then(|e| e.to_str()) == Some("nr") {
                    nr.push(p);
                }
            }
        }
        nr.sort();
        out.extend(nr);
        out
    }

    /// Files an artifact is derived from.
    pub fn inputs_of(&self, kind: ArtifactKind) -> Vec<PathBuf> {
        match kind {
            ArtifactKind::Program => self.source_files(),
            ArtifactKind::Witness => vec![
                self.path(ArtifactKind::Program),
                self.prover_input_path(),
            ],
            ArtifactKind::ConstraintSystem => vec![self.path(ArtifactKind::Program)],
            ArtifactKind::ProvingKey | ArtifactKind::VerifyingKey => {
                vec![self.path(ArtifactKind::ConstraintSystem)]
            }
            ArtifactKind::Proof | ArtifactKind::PublicWitness => vec![
                self.path(ArtifactKind::Program),
                self.path(ArtifactKind::Witness),
                self.path(ArtifactKind::ConstraintSystem),
                self.path(ArtifactKind::ProvingKey),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub len: u64,
    pub mtime_ns: u64,
    pub sha256: String,
}

impl Fingerprint {
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }
        let mtime_ns = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut f = fs::File::open(path)?;
        let mut h = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = f.read(&mut buf)?;
            if n == 0 {
                break;
            }
            h.update(&buf[..n]);
        }
        Ok(Self {
            len: meta.len(),
            mtime_ns,
            sha256: hex::encode(h.finalize()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub generation: u64,
    pub output: Fingerprint,
    pub inputs: BTreeMap<String, Fingerprint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    /// Monotonic; bumped on every recorded artifact.
    pub generation: u64,
    pub entries: BTreeMap<String, ArtifactRecord>,
}

fn load_manifest(cfg: &CircuitConfig) -> Option<ArtifactManifest> {
    let bytes = fs::read(cfg.manifest_path()).ok()?;
    match serde_json::from_slice::<ArtifactManifest>(&bytes) {
        Ok(m) if m.version == MANIFEST_VERSION => Some(m),
        Ok(m) => {
            warn!(circuit = %cfg.name, version = m.version, "ignoring artifact manifest with unknown version");
            None
        }
        Err(e) => {
            warn!(circuit = %cfg.name, "unreadable artifact manifest: {e}");
            None
        }
    }
}

fn store_manifest(cfg: &CircuitConfig, m: &ArtifactManifest) -> io::Result<()> {
    fs::create_dir_all(&cfg.artifact_dir)?;
    let bytes = serde_json::to_vec_pretty(m).map_err(io::Error::other)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&cfg.artifact_dir)?;
    tmp.write_all(&bytes)?;
    tmp.persist(cfg.manifest_path()).map_err(|e| e.error)?;
    Ok(())
}

fn input_key(cfg: &CircuitConfig, p: &Path) -> String {
    p.strip_prefix(&cfg.circuit_source_dir)
        .unwrap_or(p)
        .to_string_lossy()
        .into_owned()
}

/// Record `kind` as freshly produced from its current inputs.
pub fn record(cfg: &CircuitConfig, kind: ArtifactKind) -> io::Result<u64> {
    let output = Fingerprint::of(&cfg.path(kind))?;
    let mut inputs = BTreeMap::new();
    for p in cfg.inputs_of(kind) {
        inputs.insert(input_key(cfg, &p), Fingerprint::of(&p)?);
    }
    let mut m = load_manifest(cfg).unwrap_or_else(|| ArtifactManifest {
        version: MANIFEST_VERSION,
        ..ArtifactManifest::default()
    });
    m.generation += 1;
    let generation = m.generation;
    m.entries.insert(
        kind.label().to_string(),
        ArtifactRecord {
            generation,
            output,
            inputs,
        },
    );
    store_manifest(cfg, &m)?;
    debug!(circuit = %cfg.name, artifact = kind.label(), generation, "artifact recorded");
    Ok(generation)
}

fn fresh_by_manifest(cfg: &CircuitConfig, kind: ArtifactKind, rec: &ArtifactRecord) -> bool {
    match Fingerprint::of(&cfg.path(kind)) {
        Ok(fp) if fp == rec.output => {}
        _ => return false,
    }
    let inputs = cfg.inputs_of(kind);
    if inputs.len() != rec.inputs.len() {
        return false;
    }
    inputs.iter().all(|p| {
        let Some(expected) = rec.inputs.get(&input_key(cfg, p)) else {
            return false;
        };
        matches!(Fingerprint::of(p), Ok(fp) if &fp == expected)
    })
}

/// Compatibility path: artifact is fresh if no input is newer than it.
fn fresh_by_mtime(cfg: &CircuitConfig, kind: ArtifactKind) -> bool {
    let out_mtime = match fs::metadata(cfg.path(kind)).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    cfg.inputs_of(kind).iter().all(|p| {
        matches!(fs::metadata(p).and_then(|m| m.modified()), Ok(t) if t <= out_mtime)
    })
}

pub fn is_fresh(cfg: &CircuitConfig, kind: ArtifactKind) -> bool {
    if !cfg.path(kind).is_file() {
        return false;
    }
    match load_manifest(cfg).and_then(|m| m.entries.get(kind.label()).cloned()) {
        Some(rec) => fresh_by_manifest(cfg, kind, &rec),
        None => fresh_by_mtime(cfg, kind),
    }
}

pub fn is_compiled(cfg: &CircuitConfig) -> bool {
    is_fresh(cfg, ArtifactKind::Program)
}

pub fn is_witness_generated(cfg: &CircuitConfig) -> bool {
    is_compiled(cfg) && is_fresh(cfg, ArtifactKind::Witness)
}

pub fn needs_compile(cfg: &CircuitConfig) -> bool {
    !is_compiled(cfg)
}

/// Constraint system or either key is missing or older than the compiled program.
pub fn needs_setup(cfg: &CircuitConfig) -> bool {
    !(is_fresh(cfg, ArtifactKind::ConstraintSystem)
        && is_fresh(cfg, ArtifactKind::ProvingKey)
        && is_fresh(cfg, ArtifactKind::VerifyingKey))
}

/// Presence of each artifact (no freshness), for readiness reports.
pub fn presence(cfg: &CircuitConfig) -> BTreeMap<&'static str, bool> {
    ArtifactKind::ALL
        .iter()
        .map(|k| {
            let ok = fs::metadata(cfg.path(*k))
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false);
            (k.label(), ok)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn circuit(root: &Path) -> CircuitConfig {
        let cfg = CircuitConfig::new(root, "min_balance");
        fs::create_dir_all(cfg.circuit_source_dir.join("src")).unwrap();
        fs::create_dir_all(&cfg.artifact_dir).unwrap();
        fs::write(cfg.circuit_source_dir.join("Nargo.toml"), "[package]\n").unwrap();
        fs::write(cfg.circuit_source_dir.join("src/main.nr"), "fn main() {}\n").unwrap();
        cfg
    }

    fn set_mtime(p: &Path, t: SystemTime) {
        fs::File::options()
            .append(true)
            .open(p)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    fn mtime(p: &Path) -> SystemTime {
        fs::metadata(p).unwrap().modified().unwrap()
    }

    #[test]
    fn paths_follow_layout() {
        let cfg = CircuitConfig::new(Path::new("/c"), "token_holder");
        assert_eq!(
            cfg.path(ArtifactKind::ProvingKey),
            PathBuf::from("/c/token_holder/target/token_holder.pk")
        );
        assert_eq!(
            cfg.prover_input_path(),
            PathBuf::from("/c/token_holder/Prover.toml")
        );
    }

    #[test]
    fn missing_artifacts_are_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        assert!(needs_compile(&cfg));
        assert!(needs_setup(&cfg));
        assert!(!is_witness_generated(&cfg));
    }

    #[test]
    fn recorded_program_is_fresh_until_source_touched() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        fs::write(cfg.path(ArtifactKind::Program), b"{}").unwrap();
        record(&cfg, ArtifactKind::Program).unwrap();
        assert!(is_compiled(&cfg));

        let src = cfg.circuit_source_dir.join("src/main.nr");
        set_mtime(&src, SystemTime::now() + Duration::from_secs(5));
        assert!(needs_compile(&cfg));
    }

    #[test]
    fn content_change_is_detected_even_with_restored_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        fs::write(cfg.path(ArtifactKind::Program), b"{}").unwrap();
        record(&cfg, ArtifactKind::Program).unwrap();

        let src = cfg.circuit_source_dir.join("src/main.nr");
        let before = mtime(&src);
        fs::write(&src, "fn main() { assert(1 == 1); }\n").unwrap();
        set_mtime(&src, before);
        assert!(needs_compile(&cfg));
    }

    #[test]
    fn new_source_file_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        fs::write(cfg.path(ArtifactKind::Program), b"{}").unwrap();
        record(&cfg, ArtifactKind::Program).unwrap();
        fs::write(cfg.circuit_source_dir.join("src/lib.nr"), "\n").unwrap();
        assert!(needs_compile(&cfg));
    }

    #[test]
    fn mtime_fallback_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        let prog = cfg.path(ArtifactKind::Program);
        fs::write(&prog, b"{}").unwrap();
        set_mtime(&prog, SystemTime::now() + Duration::from_secs(10));
        assert!(is_compiled(&cfg));

        let src = cfg.circuit_source_dir.join("src/main.nr");
        set_mtime(&src, SystemTime::now() + Duration::from_secs(20));
        assert!(needs_compile(&cfg));
    }

    #[test]
    fn corrupt_manifest_falls_back_to_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        let prog = cfg.path(ArtifactKind::Program);
        fs::write(&prog, b"{}").unwrap();
        set_mtime(&prog, SystemTime::now() + Duration::from_secs(10));
        fs::write(cfg.manifest_path(), b"not json").unwrap();
        assert!(is_compiled(&cfg));
    }

    #[test]
    fn setup_is_stale_after_recompile() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        for k in [
            ArtifactKind::Program,
            ArtifactKind::ConstraintSystem,
            ArtifactKind::ProvingKey,
            ArtifactKind::VerifyingKey,
        ] {
            fs::write(cfg.path(k), k.label()).unwrap();
            record(&cfg, k).unwrap();
        }
        assert!(!needs_setup(&cfg));

        fs::write(cfg.path(ArtifactKind::Program), b"{\"v\":2}").unwrap();
        record(&cfg, ArtifactKind::Program).unwrap();
        assert!(needs_setup(&cfg));
    }

    #[test]
    fn generation_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = circuit(dir.path());
        fs::write(cfg.path(ArtifactKind::Program), b"{}").unwrap();
        let g1 = record(&cfg, ArtifactKind::Program).unwrap();
        let g2 = record(&cfg, ArtifactKind::Program).unwrap();
        assert!(g2 > g1);
    }
}
