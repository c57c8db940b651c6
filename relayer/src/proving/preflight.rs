use crate::error::{AppError, AppResult};
use std::env;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub fn ensure_file_nonempty(path: &Path, label: &str) -> AppResult<u64> {
    let m = std::fs::metadata(path).map_err(|e| {
        AppError::ProofGenerationFailed(format!("{label} missing at '{}': {e}", path.display()))
    })?;
    if !m.is_file() || m.len() == 0 {
        return Err(AppError::ProofGenerationFailed(format!(
            "{label} invalid/empty at '{}'",
            path.display()
        )));
    }
    Ok(m.len())
}

/// Regular, non-empty file with at least one execute bit set.
pub fn is_executable(path: &Path) -> bool {
    let Ok(m) = std::fs::metadata(path) else {
        return false;
    };
    if !m.is_file() || m.len() == 0 {
        return false;
    }
    #[cfg(unix)]
    {
        if (m.permissions().mode() & 0o111) == 0 {
            return false;
        }
    }
    true
}

/// Resolve a configured tool path. Bare names are looked up on `PATH`.
pub fn resolve_executable(tool: &Path) -> Option<PathBuf> {
    if tool.components().count() > 1 || tool.is_absolute() {
        return is_executable(tool).then(|| tool.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.proof");
        std::fs::write(&p, b"").unwrap();
        assert!(ensure_file_nonempty(&p, "proof").is_err());
        std::fs::write(&p, b"\x01").unwrap();
        assert_eq!(ensure_file_nonempty(&p, "proof").unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn exec_bit_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nargo");
        std::fs::write(&p, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(resolve_executable(&p).is_none());
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(resolve_executable(&p), Some(p.clone()));
    }

    #[test]
    fn missing_bare_name_is_unresolved() {
        assert!(resolve_executable(Path::new("definitely-not-a-real-tool-zk")).is_none());
    }
}
