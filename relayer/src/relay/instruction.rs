//! Gated program instructions: decode the client payload, derive the
//! nullifier PDA, and assemble the final `Instruction`.
//!
//! The payload is the Anchor wire form: `sha256("global:<name>")[..8]`
//! followed by Borsh-encoded args. It is forwarded to the chain unchanged;
//! decoding only serves the nullifier derivation and consistency checks.

use crate::constants::{
    NULLIFIER_SEED, SHIELDED_PUBLIC_FIELDS, SPL_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID,
};
use crate::error::{AppError, AppResult};
use crate::field::{field_bytes_to_u64, public_input_field};
use crate::utils::anchor_discriminator;
use crate::validation::parse_pubkey;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::{json, Value};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;

pub const WITHDRAW_SHIELDED: &str = "withdraw_shielded";
pub const SWAP_PRIVATE: &str = "swap_private";

/// Account name -> base58 address, as sent by the client.
pub type AccountMap = BTreeMap<String, String>;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct WithdrawShieldedArgs {
    pub amount: u64,
    pub nullifier_hash: [u8; 32],
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapPrivateArgs {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
    pub amount_in: u64,
    pub min_out: u64,
    pub is_a_to_b: bool,
    pub nullifier_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatedInstruction {
    WithdrawShielded(WithdrawShieldedArgs),
    SwapPrivate(SwapPrivateArgs),
}

#[derive(Debug, Clone, Copy)]
enum SlotSource {
    Named,
    Nullifier,
    Relayer,
    /// Named, with a well-known fallback when the client omits it.
    Default(Pubkey),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    name: &'static str,
    writable: bool,
    source: SlotSource,
}

const fn slot(name: &'static str, writable: bool, source: SlotSource) -> Slot {
    Slot {
        name,
        writable,
        source,
    }
}

// Order and mutability mirror the program's account structs, remaining accounts last.
const WITHDRAW_LAYOUT: &[Slot] = &[
    slot("shielded_pool", true, SlotSource::Named),
    slot("root_history", true, SlotSource::Named),
    slot("verifier_program", false, SlotSource::Named),
    slot("nullifier_account", true, SlotSource::Nullifier),
    slot("relayer", true, SlotSource::Relayer),
    slot("token_program", false, SlotSource::Default(SPL_TOKEN_PROGRAM_ID)),
    slot("system_program", false, SlotSource::Default(SYSTEM_PROGRAM_ID)),
    slot("vault", true, SlotSource::Named),
    slot("recipient_token", true, SlotSource::Named),
];

const SWAP_LAYOUT: &[Slot] = &[
    slot("pool", true, SlotSource::Named),
    slot("input_shielded_pool", true, SlotSource::Named),
    slot("input_root_history", true, SlotSource::Named),
    slot("verifier_program", false, SlotSource::Named),
    slot("nullifier_account", true, SlotSource::Nullifier),
    slot("relayer", true, SlotSource::Relayer),
    slot("token_program", false, SlotSource::Default(SPL_TOKEN_PROGRAM_ID)),
    slot("system_program", false, SlotSource::Default(SYSTEM_PROGRAM_ID)),
    slot("shielded_vault_in", true, SlotSource::Named),
    slot("reserve_in", true, SlotSource::Named),
    slot("reserve_out", true, SlotSource::Named),
    slot("recipient_token", true, SlotSource::Named),
];

impl GatedInstruction {
    pub fn decode(data: &[u8]) -> AppResult<Self> {
        if data.len() < 8 {
            return Err(AppError::BadRequest(
                "instructionData shorter than a discriminator".into(),
            ));
        }
        let (disc, args) = data.split_at(8);
        let bad_args = |name: &str, e: std::io::Error| {
            AppError::BadRequest(format!("instructionData: invalid {name} args: {e}"))
        };
        if disc == anchor_discriminator(WITHDRAW_SHIELDED) {
            borsh::from_slice(args)
                .map(GatedInstruction::WithdrawShielded)
                .map_err(|e| bad_args(WITHDRAW_SHIELDED, e))
        } else if disc == anchor_discriminator(SWAP_PRIVATE) {
            borsh::from_slice(args)
                .map(GatedInstruction::SwapPrivate)
                .map_err(|e| bad_args(SWAP_PRIVATE, e))
        } else {
            Err(AppError::BadRequest(format!(
                "instructionData: unknown discriminator {}",
                hex::encode(disc)
            )))
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = anchor_discriminator(self.name()).to_vec();
        // Writing into a Vec cannot fail.
        let _ = match self {
            GatedInstruction::WithdrawShielded(a) => a.serialize(&mut out),
            GatedInstruction::SwapPrivate(a) => a.serialize(&mut out),
        };
        out
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatedInstruction::WithdrawShielded(_) => WITHDRAW_SHIELDED,
            GatedInstruction::SwapPrivate(_) => SWAP_PRIVATE,
        }
    }

    pub fn nullifier_hash(&self) -> &[u8; 32] {
        match self {
            GatedInstruction::WithdrawShielded(a) => &a.nullifier_hash,
            GatedInstruction::SwapPrivate(a) => &a.nullifier_hash,
        }
    }

    pub fn public_inputs(&self) -> &[u8] {
        match self {
            GatedInstruction::WithdrawShielded(a) => &a.public_inputs,
            GatedInstruction::SwapPrivate(a) => &a.public_inputs,
        }
    }

    /// Shielded pool account that seeds the nullifier PDA.
    pub fn pool_account_name(&self) -> &'static str {
        match self {
            GatedInstruction::WithdrawShielded(_) => "shielded_pool",
            GatedInstruction::SwapPrivate(_) => "input_shielded_pool",
        }
    }

    fn layout(&self) -> &'static [Slot] {
        match self {
            GatedInstruction::WithdrawShielded(_) => WITHDRAW_LAYOUT,
            GatedInstruction::SwapPrivate(_) => SWAP_LAYOUT,
        }
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `snake_case` key first, then its `camelCase` spelling.
fn lookup<'a>(accounts: &'a AccountMap, name: &str) -> Option<&'a str> {
    accounts
        .get(name)
        .or_else(|| accounts.get(&camel_case(name)))
        .map(|s| s.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullifierMeta {
    pub address: Pubkey,
    pub bump: u8,
    pub program_id: Pubkey,
    pub pool: Pubkey,
    pub nullifier_hash: [u8; 32],
}

impl NullifierMeta {
    /// Seeds without the bump, hex-encoded.
    pub fn seeds_hex(&self) -> Vec<String> {
        vec![
            hex::encode(NULLIFIER_SEED),
            hex::encode(self.pool.as_ref()),
            hex::encode(self.nullifier_hash),
        ]
    }

    pub fn to_json(&self) -> Value {
        json!({
            "address": self.address.to_string(),
            "bump": self.bump,
            "programId": self.program_id.to_string(),
            "pool": self.pool.to_string(),
            "nullifierHash": hex::encode(self.nullifier_hash),
            "seeds": self.seeds_hex(),
        })
    }
}

/// Derive the nullifier PDA for an already-decoded instruction.
///
/// The address depends only on (pool, nullifier_hash, program id); the other
/// inputs are cross-checked so that a request cannot pair one nullifier with
/// someone else's proof.
pub fn nullifier_meta_for(
    ix: &GatedInstruction,
    public_inputs: &[u8],
    accounts: &AccountMap,
    program_id: &Pubkey,
) -> AppResult<NullifierMeta> {
    if ix.public_inputs() != public_inputs {
        return Err(AppError::BadRequest(
            "publicInputs do not match the public inputs embedded in instructionData".into(),
        ));
    }
    if public_input_field(public_inputs, SHIELDED_PUBLIC_FIELDS - 1).is_none() {
        return Err(AppError::BadRequest(format!(
            "publicInputs must carry at least {SHIELDED_PUBLIC_FIELDS} field elements"
        )));
    }
    if public_input_field(public_inputs, 1).as_ref() != Some(ix.nullifier_hash()) {
        return Err(AppError::BadRequest(
            "nullifier_hash does not match the proof's public nullifier".into(),
        ));
    }
    if let GatedInstruction::WithdrawShielded(a) = ix {
        let proven = public_input_field(public_inputs, 2).and_then(|f| field_bytes_to_u64(&f));
        if proven != Some(a.amount) {
            return Err(AppError::BadRequest(
                "amount does not match the proof's public amount".into(),
            ));
        }
    }

    let pool_name = ix.pool_account_name();
    let pool_str = lookup(accounts, pool_name)
        .ok_or_else(|| AppError::MissingParameters(vec![format!("accounts.{pool_name}")]))?;
    let pool = parse_pubkey(&format!("accounts.{pool_name}"), pool_str)?;

    let nullifier_hash = *ix.nullifier_hash();
    let (address, bump) = Pubkey::find_program_address(
        &[NULLIFIER_SEED, pool.as_ref(), &nullifier_hash],
        program_id,
    );
    Ok(NullifierMeta {
        address,
        bump,
        program_id: *program_id,
        pool,
        nullifier_hash,
    })
}

/// Pure: identical inputs always derive the identical address.
pub fn build_nullifier_meta(
    ix_data: &[u8],
    public_inputs: &[u8],
    accounts: &AccountMap,
    program_id: &Pubkey,
) -> AppResult<NullifierMeta> {
    let ix = GatedInstruction::decode(ix_data)?;
    nullifier_meta_for(&ix, public_inputs, accounts, program_id)
}

/// Resolve the account list and pack the raw payload into an instruction.
pub fn build_instruction(
    ix_data: &[u8],
    accounts: &AccountMap,
    nullifier: &NullifierMeta,
    relayer: &Pubkey,
) -> AppResult<Instruction> {
    let ix = GatedInstruction::decode(ix_data)?;

    let mut missing = Vec::new();
    let mut metas = Vec::with_capacity(ix.layout().len());
    for s in ix.layout() {
        let field = format!("accounts.{}", s.name);
        let provided = lookup(accounts, s.name);
        let key = match (s.source, provided) {
            (SlotSource::Nullifier, p) => {
                if let Some(p) = p {
                    if parse_pubkey(&field, p)? != nullifier.address {
                        return Err(AppError::BadRequest(format!(
                            "{field} does not match the derived nullifier address {}",
                            nullifier.address
                        )));
                    }
                }
                nullifier.address
            }
            (SlotSource::Relayer, p) => {
                if let Some(p) = p {
                    if parse_pubkey(&field, p)? != *relayer {
                        return Err(AppError::BadRequest(format!(
                            "{field} must be the relay authority {relayer}"
                        )));
                    }
                }
                *relayer
            }
            (SlotSource::Default(_), Some(p)) | (SlotSource::Named, Some(p)) => {
                parse_pubkey(&field, p)?
            }
            (SlotSource::Default(fallback), None) => fallback,
            (SlotSource::Named, None) => {
                missing.push(field);
                continue;
            }
        };
        let is_signer = matches!(s.source, SlotSource::Relayer);
        metas.push(if s.writable {
            AccountMeta::new(key, is_signer)
        } else {
            AccountMeta::new_readonly(key, is_signer)
        });
    }
    if !missing.is_empty() {
        return Err(AppError::MissingParameters(missing));
    }

    Ok(Instruction {
        program_id: nullifier.program_id,
        accounts: metas,
        data: ix_data.to_vec(),
    })
}
