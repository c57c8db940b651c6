// Centralized constants.

use solana_sdk::pubkey::Pubkey;

// ---------------------------------------------------------------------
// Runtime defaults
// ---------------------------------------------------------------------
pub(crate) const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
pub(crate) const DEFAULT_PROGRAM_ID: &str = "GVkWHzgYaUDmM5KF4uHv7fM9DEtDtqpsF8T3uHbSYR2d";
pub(crate) const DEFAULT_CIRCUITS_DIR: &str = "./circuits";
pub(crate) const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub(crate) const DEFAULT_NARGO_PATH: &str = "nargo";
pub(crate) const DEFAULT_SUNSPOT_PATH: &str = "sunspot";
pub(crate) const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_CONFIRM_MAX_POLLS: u32 = 40;
pub(crate) const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 400_000;
pub(crate) const DEFAULT_COMPUTE_UNIT_PRICE_MICRO_LAMPORTS: u64 = 1_000;
pub(crate) const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;
pub(crate) const DEFAULT_RL_OK_PER_MIN: u32 = 30;
pub(crate) const DEFAULT_RL_BAD_PER_MIN: u32 = 6;

// ---------------------------------------------------------------------
// HTTP limits (spam protection)
// ---------------------------------------------------------------------
pub(crate) const MAX_BODY_BYTES: usize = 256 * 1024;
pub(crate) const MAX_PUBKEY_B58_LEN: usize = 64; // base58 pubkeys are ~32-44 chars; keep slack.
pub(crate) const MAX_FIELD_STR_LEN: usize = 2 + 80; // "0x" + 64 hex, or up to 78 decimal digits
pub(crate) const MAX_PROOF_BYTES: usize = 4 * 1024;
pub(crate) const MAX_PUBLIC_INPUT_BYTES: usize = 2 * 1024;
pub(crate) const MAX_INSTRUCTION_B64_LEN: usize = 8 * 1024;
pub(crate) const MAX_ELIGIBILITY_PROOFS: usize = 8;

// ---------------------------------------------------------------------
// Solana
// ---------------------------------------------------------------------
/// Max serialized transaction size (packet MTU).
pub(crate) const MAX_TX_SIZE: usize = 1232;
pub(crate) const SPL_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub(crate) const SPL_ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub(crate) const SYSTEM_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("11111111111111111111111111111111");
pub(crate) const NULLIFIER_SEED: &[u8] = b"nullifier";

// ---------------------------------------------------------------------
// Proving
// ---------------------------------------------------------------------
/// Shielded note tree depth; must match the spend circuit.
pub(crate) const MERKLE_TREE_DEPTH: usize = 20;
/// Blacklist slots in the not_blacklisted circuit.
pub(crate) const BLACKLIST_SIZE: usize = 10;
/// Public fields in a shielded public witness: root, nullifier, amount, recipient, mint, pool.
pub(crate) const SHIELDED_PUBLIC_FIELDS: usize = 6;
/// Noir public witness files may carry this header in front of the field elements.
pub(crate) const PUBLIC_WITNESS_HEADER_LEN: usize = 12;
/// Bound on captured tool output kept in errors.
pub(crate) const MAX_TOOL_OUTPUT_BYTES: usize = 4 * 1024;
