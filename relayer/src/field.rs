//! Conversions between wallet addresses, BN254 field-element strings and
//! fixed 32-byte buffers.
//!
//! Addresses are folded to a 128-bit fingerprint (first 16 bytes, big-endian),
//! so the mapping is lossy by construction: two keys sharing their first
//! 16 bytes map to the same field element. The gated program applies the
//! same fingerprint (`pubkey_to_field_bytes`) when it checks public inputs.

use crate::constants::{PUBLIC_WITNESS_HEADER_LEN, SHIELDED_PUBLIC_FIELDS};
use crate::error::{AppError, AppResult};
use num_bigint::BigUint;
use solana_sdk::pubkey::Pubkey;
use std::sync::OnceLock;

/// BN254 scalar field modulus (Fr).
const BN254_FR_MODULUS_DEC: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

/// Number of address bytes folded into a field element.
const ADDRESS_FINGERPRINT_BYTES: usize = 16;

pub fn bn254_fr_modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| {
        BigUint::parse_bytes(BN254_FR_MODULUS_DEC.as_bytes(), 10).unwrap_or_default()
    })
}

fn two_pow_256() -> BigUint {
    BigUint::from(1u8) << 256usize
}

/// Map a wallet address (decimal, `0x` hex or base58) to a field-element decimal string.
pub fn address_to_field(address: &str) -> String {
    let a = address.trim();
    if !a.is_empty() && a.bytes().all(|b| b.is_ascii_digit()) {
        return a.to_string();
    }

    if let Some(hex_part) = a.strip_prefix("0x").or_else(|| a.strip_prefix("0X")) {
        let take = hex_part.len().min(ADDRESS_FINGERPRINT_BYTES * 2);
        if let Some(Ok(bytes)) = hex_part.get(..take).map(hex::decode) {
            if !bytes.is_empty() {
                return BigUint::from_bytes_be(&bytes).to_str_radix(10);
            }
        }
        return string_hash_field(a);
    }

    match bs58::decode(a).into_vec() {
        Ok(bytes) if !bytes.is_empty() => {
            let take = bytes.len().min(ADDRESS_FINGERPRINT_BYTES);
            BigUint::from_bytes_be(&bytes[..take]).to_str_radix(10)
        }
        _ => string_hash_field(a),
    }
}

/// Last-resort 32-bit polynomial hash (`h*31 + c` over UTF-16 units).
fn string_hash_field(s: &str) -> String {
    let mut h: i32 = 0;
    for unit in s.encode_utf16() {
        h = (h << 5).wrapping_sub(h).wrapping_add(unit as i32);
    }
    h.unsigned_abs().to_string()
}

/// Parse a decimal or `0x`-hex field string. Values must be below the BN254 scalar modulus.
pub fn parse_field(s: &str) -> AppResult<BigUint> {
    let n = parse_uint(s)?;
    if &n >= bn254_fr_modulus() {
        return Err(AppError::BadRequest(
            "field element exceeds the BN254 scalar modulus".into(),
        ));
    }
    Ok(n)
}

fn parse_uint(s: &str) -> AppResult<BigUint> {
    let t = s.trim();
    let parsed = if let Some(h) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        if h.is_empty() {
            None
        } else {
            BigUint::parse_bytes(h.as_bytes(), 16)
        }
    } else if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) {
        BigUint::parse_bytes(t.as_bytes(), 10)
    } else {
        None
    };
    parsed.ok_or_else(|| AppError::BadRequest(format!("invalid field element '{t}'")))
}

/// Field string -> 32 bytes big-endian, reduced mod 2^256.
pub fn field_to_be_bytes32(field: &str) -> AppResult<[u8; 32]> {
    let n = parse_uint(field)? % two_pow_256();
    let b = n.to_bytes_be();
    let mut out = [0u8; 32];
    // `to_bytes_be` of zero is `[0]`; any reduced value fits.
    out[32 - b.len()..].copy_from_slice(&b);
    Ok(out)
}

/// Field string -> 32 bytes little-endian, reduced mod 2^256.
pub fn field_to_le_bytes32(field: &str) -> AppResult<[u8; 32]> {
    let mut out = field_to_be_bytes32(field)?;
    out.reverse();
    Ok(out)
}

pub fn be_bytes_to_field(bytes: &[u8]) -> String {
    BigUint::from_bytes_be(bytes).to_str_radix(10)
}

/// Address field encoding used on chain: first 16 key bytes in the last 16 bytes.
pub fn pubkey_to_field_bytes(key: &Pubkey) -> [u8; 32] {
    let bytes = key.to_bytes();
    let mut out = [0u8; 32];
    out[32 - ADDRESS_FINGERPRINT_BYTES..].copy_from_slice(&bytes[..ADDRESS_FINGERPRINT_BYTES]);
    out
}

/// A u64 public input: big-endian in the last 8 bytes, upper 24 bytes zero.
pub fn field_bytes_to_u64(field: &[u8; 32]) -> Option<u64> {
    if field[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&field[24..]);
    Some(u64::from_be_bytes(buf))
}

/// Field-element region of a public witness, with the optional header stripped.
/// `None` when the length is neither `32*k` nor `12 + 32*k`.
pub fn public_witness_fields(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() % 32 == 0 {
        Some(bytes)
    } else if bytes.len() >= PUBLIC_WITNESS_HEADER_LEN
        && (bytes.len() - PUBLIC_WITNESS_HEADER_LEN) % 32 == 0
    {
        Some(&bytes[PUBLIC_WITNESS_HEADER_LEN..])
    } else {
        None
    }
}

/// Field `index` of a shielded public witness, read the way the gated program
/// reads it: the header is stripped only when the length is exactly six fields
/// plus header; any other length is read from offset 0.
pub fn public_input_field(bytes: &[u8], index: usize) -> Option<[u8; 32]> {
    if index >= SHIELDED_PUBLIC_FIELDS {
        return None;
    }
    let header = if bytes.len() == SHIELDED_PUBLIC_FIELDS * 32 + PUBLIC_WITNESS_HEADER_LEN {
        PUBLIC_WITNESS_HEADER_LEN
    } else {
        0
    };
    let start = header + index * 32;
    let slice = bytes.get(start..start + 32)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(slice);
    Some(out)
}
