//! Port to the external proving toolchain (Noir `nargo` + gnark `sunspot`).
//!
//! The port surfaces structured failures. Whether a witness-generation failure
//! is a constraint violation is decided once, in the adapter, and carried as
//! [`FailureKind`]; callers never inspect tool output text.

use crate::constants::MAX_TOOL_OUTPUT_BYTES;
use crate::proving::artifacts::{ArtifactKind, CircuitConfig};
use crate::proving::preflight::resolve_executable;
use serde::Serialize;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The circuit rejected its inputs (failed assertion / unsatisfied constraint).
    ConstraintViolation,
    Other,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found (configured as '{path}')")]
    NotFound { tool: &'static str, path: String },
    #[error("{tool} {step} failed (code={code:?}, signal={signal:?}). stderr='{stderr}' stdout='{stdout}'")]
    Failed {
        tool: &'static str,
        step: &'static str,
        code: Option<i32>,
        signal: Option<i32>,
        stdout: String,
        stderr: String,
        kind: FailureKind,
    },
    #[error("{step}: {source}")]
    Io {
        step: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub configured: String,
    pub resolved: Option<String>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainStatus {
    pub nargo: ToolStatus,
    pub sunspot: ToolStatus,
}

impl ToolchainStatus {
    pub fn ready(&self) -> bool {
        self.nargo.available && self.sunspot.available
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.nargo.available {
            out.push("nargo");
        }
        if !self.sunspot.available {
            out.push("sunspot");
        }
        out
    }
}

/// Each stage reads and writes the artifact paths of `cfg`.
pub trait Toolchain: Send + Sync {
    fn probe(&self) -> ToolchainStatus;
    /// Source program -> `<name>.json`.
    fn compile(&self, cfg: &CircuitConfig) -> Result<(), ToolError>;
    /// `Prover.toml` + program -> `<name>.gz`.
    fn execute(&self, cfg: &CircuitConfig) -> Result<(), ToolError>;
    /// Program -> `<name>.ccs`.
    fn compile_ccs(&self, cfg: &CircuitConfig) -> Result<(), ToolError>;
    /// Constraint system -> `<name>.pk` + `<name>.vk`.
    fn setup(&self, cfg: &CircuitConfig) -> Result<(), ToolError>;
    /// Program + witness + ccs + pk -> `<name>.proof` + `<name>.pw`.
    fn prove(&self, cfg: &CircuitConfig) -> Result<(), ToolError>;
    /// `Ok(false)` when the verifier rejects the proof.
    fn verify(
        &self,
        cfg: &CircuitConfig,
        vk: &Path,
        proof: &Path,
        public_witness: &Path,
    ) -> Result<bool, ToolError>;
}

pub struct SubprocessToolchain {
    nargo: PathBuf,
    sunspot: PathBuf,
}

fn bounded(bytes: &[u8]) -> String {
    let s = String::from_utf8_lossy(bytes);
    let s = s.trim();
    if s.len() <= MAX_TOOL_OUTPUT_BYTES {
        return s.to_string();
    }
    let mut cut = MAX_TOOL_OUTPUT_BYTES;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…[truncated]", &s[..cut])
}

/// Exit code `sunspot verify` uses for a proof that does not check out.
/// Any other failure (signal, other code) is a tooling error.
const VERIFY_REJECTED_EXIT: i32 = 1;

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// nargo reports unsatisfied constraints with exit code 1 and one of these
/// diagnostic headers; anything else is a tooling failure.
fn classify_execute_failure(code: Option<i32>, stderr: &str, stdout: &str) -> FailureKind {
    const CONSTRAINT_DIAGNOSTICS: [&str; 4] = [
        "Failed assertion",
        "Failed constraint",
        "Cannot satisfy constraint",
        "Assertion failed",
    ];
    if code != Some(1) {
        return FailureKind::Other;
    }
    let hit = |text: &str| {
        text.lines().any(|l| {
            let l = l.trim_start().trim_start_matches("error:").trim_start();
            CONSTRAINT_DIAGNOSTICS.iter().any(|d| l.starts_with(d))
        })
    };
    if hit(stderr) || hit(stdout) {
        FailureKind::ConstraintViolation
    } else {
        FailureKind::Other
    }
}

impl SubprocessToolchain {
    pub fn new(nargo: PathBuf, sunspot: PathBuf) -> Self {
        Self { nargo, sunspot }
    }

    fn tool_path(&self, tool: &'static str) -> &Path {
        match tool {
            "nargo" => &self.nargo,
            _ => &self.sunspot,
        }
    }

    fn run(
        &self,
        tool: &'static str,
        step: &'static str,
        cfg: &CircuitConfig,
        args: &[&OsStr],
    ) -> Result<Output, ToolError> {
        let path = self.tool_path(tool);
        let t0 = Instant::now();
        let out = Command::new(path)
            .args(args)
            .current_dir(&cfg.circuit_source_dir)
            .output()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ToolError::NotFound {
                        tool,
                        path: path.display().to_string(),
                    }
                } else {
                    ToolError::Io { step, source: e }
                }
            })?;
        debug!(
            circuit = %cfg.name,
            tool,
            step,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            success = out.status.success(),
            "tool finished"
        );
        Ok(out)
    }

    fn check(
        tool: &'static str,
        step: &'static str,
        out: Output,
        classify: bool,
    ) -> Result<(), ToolError> {
        if out.status.success() {
            return Ok(());
        }
        let code = out.status.code();
        // Diagnostics may follow pages of warnings; classify before truncating.
        let kind = if classify {
            classify_execute_failure(
                code,
                &String::from_utf8_lossy(&out.stderr),
                &String::from_utf8_lossy(&out.stdout),
            )
        } else {
            FailureKind::Other
        };
        Err(ToolError::Failed {
            tool,
            step,
            code,
            signal: exit_signal(&out.status),
            stdout: bounded(&out.stdout),
            stderr: bounded(&out.stderr),
            kind,
        })
    }
}

impl Toolchain for SubprocessToolchain {
    fn probe(&self) -> ToolchainStatus {
        let status = |p: &Path| {
            let resolved = resolve_executable(p);
            ToolStatus {
                configured: p.display().to_string(),
                available: resolved.is_some(),
                resolved: resolved.map(|r| r.display().to_string()),
            }
        };
        ToolchainStatus {
            nargo: status(&self.nargo),
            sunspot: status(&self.sunspot),
        }
    }

    fn compile(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        let out = self.run("nargo", "compile", cfg, &[OsStr::new("compile")])?;
        Self::check("nargo", "compile", out, false)
    }

    fn execute(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        let out = self.run(
            "nargo",
            "execute",
            cfg,
            &[OsStr::new("execute"), OsStr::new(&cfg.name)],
        )?;
        let res = Self::check("nargo", "execute", out, true);
        if let Err(ToolError::Failed { kind, code, .. }) = &res {
            if *kind == FailureKind::Other {
                warn!(circuit = %cfg.name, ?code, "witness generation failed without a constraint diagnostic");
            }
        }
        res
    }

    fn compile_ccs(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        let program = cfg.path(ArtifactKind::Program);
        let out = self.run(
            "sunspot",
            "compile",
            cfg,
            &[OsStr::new("compile"), program.as_os_str()],
        )?;
        Self::check("sunspot", "compile", out, false)
    }

    fn setup(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        let ccs = cfg.path(ArtifactKind::ConstraintSystem);
        let out = self.run("sunspot", "setup", cfg, &[OsStr::new("setup"), ccs.as_os_str()])?;
        Self::check("sunspot", "setup", out, false)
    }

    fn prove(&self, cfg: &CircuitConfig) -> Result<(), ToolError> {
        let program = cfg.path(ArtifactKind::Program);
        let witness = cfg.path(ArtifactKind::Witness);
        let ccs = cfg.path(ArtifactKind::ConstraintSystem);
        let pk = cfg.path(ArtifactKind::ProvingKey);
        let out = self.run(
            "sunspot",
            "prove",
            cfg,
            &[
                OsStr::new("prove"),
                program.as_os_str(),
                witness.as_os_str(),
                ccs.as_os_str(),
                pk.as_os_str(),
            ],
        )?;
        Self::check("sunspot", "prove", out, false)
    }

    fn verify(
        &self,
        cfg: &CircuitConfig,
        vk: &Path,
        proof: &Path,
        public_witness: &Path,
    ) -> Result<bool, ToolError> {
        let vk_len = std::fs::metadata(vk)
            .map_err(|source| ToolError::Io {
                step: "verify",
                source,
            })?
            .len();
        if vk_len == 0 {
            return Err(ToolError::Io {
                step: "verify",
                source: io::Error::new(io::ErrorKind::InvalidData, "verifying key is empty"),
            });
        }
        let out = self.run(
            "sunspot",
            "verify",
            cfg,
            &[
                OsStr::new("verify"),
                vk.as_os_str(),
                proof.as_os_str(),
                public_witness.as_os_str(),
            ],
        )?;
        if out.status.success() {
            return Ok(true);
        }
        if out.status.code() == Some(VERIFY_REJECTED_EXIT) {
            debug!(circuit = %cfg.name, stderr = %bounded(&out.stderr), "verifier rejected proof");
            return Ok(false);
        }
        warn!(
            circuit = %cfg.name,
            code = ?out.status.code(),
            signal = ?exit_signal(&out.status),
            "verifier failed"
        );
        Self::check("sunspot", "verify", out, false).map(|_| false)
    }
}
