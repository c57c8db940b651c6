use solana_sdk::{hash::hash as solana_sha256, pubkey::Pubkey};

pub fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub fn associated_token_address(
    authority: &Pubkey,
    mint: &Pubkey,
    token_program_id: &Pubkey,
    associated_token_program_id: &Pubkey,
) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[authority.as_ref(), token_program_id.as_ref(), mint.as_ref()],
        associated_token_program_id,
    );
    ata
}

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`.
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let preimage = format!("global:{}", name);
    let h = solana_sha256(preimage.as_bytes()).to_bytes();
    let mut out = [0u8; 8];
    out.copy_from_slice(&h[..8]);
    out
}
