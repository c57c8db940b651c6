//! Pre-flight gate for auxiliary eligibility proofs attached to a relay request.
//!
//! Shape checks only. Cryptographic verification happens on-chain, or
//! off-chain through the proof pipeline when `VERIFY_ELIGIBILITY_OFFCHAIN` is set.

use crate::constants::{MAX_ELIGIBILITY_PROOFS, MAX_PROOF_BYTES, MAX_PUBLIC_INPUT_BYTES};
use crate::error::{AppError, AppResult};
use crate::field::public_witness_fields;
use crate::proving::{CircuitKind, ProofPipeline};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityProof {
    #[serde(alias = "type")]
    pub proof_type: String,
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

fn fail(i: usize, what: impl std::fmt::Display) -> AppError {
    AppError::EligibilityVerificationFailed(format!("eligibilityProofs[{i}]: {what}"))
}

/// Validate declared types and byte shapes. Returns the circuits in request order.
pub fn check_eligibility(
    proofs: &[EligibilityProof],
    require: bool,
) -> AppResult<Vec<CircuitKind>> {
    if proofs.len() > MAX_ELIGIBILITY_PROOFS {
        return Err(AppError::EligibilityVerificationFailed(format!(
            "too many eligibility proofs: {} (max {MAX_ELIGIBILITY_PROOFS})",
            proofs.len()
        )));
    }
    if require && proofs.is_empty() {
        return Err(AppError::EligibilityVerificationFailed(
            "eligibility proof required but none provided".into(),
        ));
    }

    let mut kinds = Vec::with_capacity(proofs.len());
    for (i, p) in proofs.iter().enumerate() {
        let kind = CircuitKind::from_name(p.proof_type.trim())
            .ok()
            .filter(|k| k.is_eligibility())
            .ok_or_else(|| fail(i, "unrecognized proof type"))?;
        if p.proof.is_empty() {
            return Err(fail(i, "proof is empty"));
        }
        if p.proof.len() > MAX_PROOF_BYTES {
            return Err(fail(i, format!("proof too large (max {MAX_PROOF_BYTES} bytes)")));
        }
        if p.public_inputs.is_empty() {
            return Err(fail(i, "publicInputs is empty"));
        }
        if p.public_inputs.len() > MAX_PUBLIC_INPUT_BYTES {
            return Err(fail(
                i,
                format!("publicInputs too large (max {MAX_PUBLIC_INPUT_BYTES} bytes)"),
            ));
        }
        match public_witness_fields(&p.public_inputs) {
            Some(f) if !f.is_empty() => {}
            _ => return Err(fail(i, "publicInputs is not a sequence of 32-byte field elements")),
        }
        kinds.push(kind);
    }
    Ok(kinds)
}

/// Run the verifier on every bundle. Any rejection fails the whole batch;
/// verifier failures propagate unchanged.
pub async fn verify_offchain(
    pipeline: &ProofPipeline,
    proofs: &[EligibilityProof],
    kinds: &[CircuitKind],
) -> AppResult<()> {
    for (i, (p, kind)) in proofs.iter().zip(kinds).enumerate() {
        let valid = pipeline
            .verify_proof(kind.name(), &p.proof, &p.public_inputs)
            .await?;
        debug!(index = i, circuit = kind.name(), valid, "eligibility proof verified");
        if !valid {
            return Err(fail(i, "proof rejected by verifier"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(t: &str, proof: usize, pi: usize) -> EligibilityProof {
        EligibilityProof {
            proof_type: t.into(),
            proof: vec![1; proof],
            public_inputs: vec![0; pi],
        }
    }

    #[test]
    fn accepts_known_types_and_headers() {
        let kinds = check_eligibility(
            &[bundle("min_balance", 8, 64), bundle("not_blacklisted", 8, 12 + 32)],
            true,
        )
        .unwrap();
        assert_eq!(kinds, vec![CircuitKind::MinBalance, CircuitKind::NotBlacklisted]);
    }

    #[test]
    fn empty_list_passes_unless_required() {
        assert!(check_eligibility(&[], false).unwrap().is_empty());
        assert!(matches!(
            check_eligibility(&[], true),
            Err(AppError::EligibilityVerificationFailed(_))
        ));
    }

    #[test]
    fn rejects_bad_bundles() {
        for b in [
            bundle("shielded_spend", 8, 64),
            bundle("kyc", 8, 64),
            bundle("token_holder", 0, 64),
            bundle("token_holder", 8, 0),
            bundle("token_holder", 8, 33),
        ] {
            assert!(
                matches!(
                    check_eligibility(&[b.clone()], false),
                    Err(AppError::EligibilityVerificationFailed(_))
                ),
                "{b:?}"
            );
        }
    }

    #[test]
    fn type_alias_deserializes() {
        let p: EligibilityProof = serde_json::from_value(serde_json::json!({
            "type": "token_holder", "proof": [1, 2], "publicInputs": vec![0; 32]
        }))
        .unwrap();
        assert_eq!(p.proof_type, "token_holder");
    }
}
