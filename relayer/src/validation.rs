use crate::constants::MAX_PUBKEY_B58_LEN;
use crate::error::AppError;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

pub fn ensure_len_le(field: &str, s: &str, max: usize) -> Result<(), AppError> {
    if s.len() > max {
        return Err(AppError::BadRequest(format!(
            "{field} too long: {} chars (max {max})",
            s.len()
        )));
    }
    Ok(())
}

pub fn ensure_bytes_len(field: &str, b: &[u8], max: usize) -> Result<(), AppError> {
    if b.is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    if b.len() > max {
        return Err(AppError::BadRequest(format!(
            "{field} too large: {} bytes (max {max})",
            b.len()
        )));
    }
    Ok(())
}

pub fn ensure_pubkey_len(field: &str, s: &str) -> Result<(), AppError> {
    let t = s.trim();
    if t.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    ensure_len_le(field, t, MAX_PUBKEY_B58_LEN)
}

/// Length-check then parse a base58 account address.
pub fn parse_pubkey(field: &str, s: &str) -> Result<Pubkey, AppError> {
    ensure_pubkey_len(field, s)?;
    Pubkey::from_str(s.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {field} pubkey")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_checks() {
        let pk = Pubkey::new_unique();
        assert_eq!(parse_pubkey("accounts.pool", &pk.to_string()).unwrap(), pk);
        assert!(parse_pubkey("accounts.pool", "").is_err());
        assert!(parse_pubkey("accounts.pool", &"1".repeat(MAX_PUBKEY_B58_LEN + 1)).is_err());
        assert!(parse_pubkey("accounts.pool", "not-base58-0OIl").is_err());
    }

    #[test]
    fn byte_bounds() {
        assert!(ensure_bytes_len("proof", &[], 4).is_err());
        assert!(ensure_bytes_len("proof", &[1, 2, 3, 4], 4).is_ok());
        assert!(ensure_bytes_len("proof", &[0; 5], 4).is_err());
    }
}
