//! Known circuits and their typed input schemas.
//!
//! Request JSON is validated against the schema and turned into the
//! `Prover.toml` document consumed by the witness generator.

use crate::constants::{BLACKLIST_SIZE, MAX_FIELD_STR_LEN, MERKLE_TREE_DEPTH};
use crate::error::{AppError, AppResult};
use crate::field::{address_to_field, parse_field};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitKind {
    MinBalance,
    TokenHolder,
    NotBlacklisted,
    ShieldedSpend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Address,
    U64,
    Field,
    FieldArray(usize),
    BitArray(usize),
    /// Up to `n` addresses, zero-padded to `n`.
    AddressList(usize),
}

#[derive(Debug, Clone, Copy)]
struct InputSpec {
    name: &'static str,
    kind: InputKind,
}

const fn input(name: &'static str, kind: InputKind) -> InputSpec {
    InputSpec { name, kind }
}

const MIN_BALANCE: &[InputSpec] = &[
    input("owner", InputKind::Address),
    input("token_mint", InputKind::Address),
    input("threshold", InputKind::U64),
    input("balance", InputKind::U64),
];

const TOKEN_HOLDER: &[InputSpec] = &[
    input("owner", InputKind::Address),
    input("token_mint", InputKind::Address),
    input("minimum", InputKind::U64),
    input("amount", InputKind::U64),
];

const NOT_BLACKLISTED: &[InputSpec] = &[
    input("address", InputKind::Address),
    input("blacklist", InputKind::AddressList(BLACKLIST_SIZE)),
];

const SHIELDED_SPEND: &[InputSpec] = &[
    input("amount", InputKind::U64),
    input("secret", InputKind::Field),
    input("nullifier", InputKind::Field),
    input("merkle_path", InputKind::FieldArray(MERKLE_TREE_DEPTH)),
    input("path_indices", InputKind::BitArray(MERKLE_TREE_DEPTH)),
    input("root", InputKind::Field),
    input("recipient", InputKind::Address),
    input("mint", InputKind::Address),
    input("pool_id", InputKind::Address),
    input("nullifier_hash", InputKind::Field),
];

impl CircuitKind {
    pub const ALL: [CircuitKind; 4] = [
        CircuitKind::MinBalance,
        CircuitKind::TokenHolder,
        CircuitKind::NotBlacklisted,
        CircuitKind::ShieldedSpend,
    ];

    pub fn from_name(name: &str) -> AppResult<Self> {
        match name {
            "min_balance" => Ok(CircuitKind::MinBalance),
            "token_holder" => Ok(CircuitKind::TokenHolder),
            "not_blacklisted" => Ok(CircuitKind::NotBlacklisted),
            "shielded_spend" => Ok(CircuitKind::ShieldedSpend),
            other => Err(AppError::UnknownCircuit(other.chars().take(64).collect())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CircuitKind::MinBalance => "min_balance",
            CircuitKind::TokenHolder => "token_holder",
            CircuitKind::NotBlacklisted => "not_blacklisted",
            CircuitKind::ShieldedSpend => "shielded_spend",
        }
    }

    /// Circuits accepted as auxiliary eligibility proofs on relay requests.
    pub fn is_eligibility(self) -> bool {
        !matches!(self, CircuitKind::ShieldedSpend)
    }

    /// Explanation shown when the circuit's constraints reject the inputs.
    pub fn business_rule_reason(self) -> &'static str {
        match self {
            CircuitKind::MinBalance => "balance below threshold",
            CircuitKind::TokenHolder => "token holdings below required minimum",
            CircuitKind::NotBlacklisted => "address is on the blacklist",
            CircuitKind::ShieldedSpend => "note does not satisfy spend constraints",
        }
    }

    fn schema(self) -> &'static [InputSpec] {
        match self {
            CircuitKind::MinBalance => MIN_BALANCE,
            CircuitKind::TokenHolder => TOKEN_HOLDER,
            CircuitKind::NotBlacklisted => NOT_BLACKLISTED,
            CircuitKind::ShieldedSpend => SHIELDED_SPEND,
        }
    }

    /// Validate request inputs and build the prover input document.
    ///
    /// All missing fields are reported together. Values never appear in errors.
    pub fn prover_input(self, inputs: &Value) -> AppResult<toml::Table> {
        let obj = inputs
            .as_object()
            .ok_or_else(|| AppError::BadRequest("request body must be a JSON object".into()))?;

        let missing: Vec<String> = self
            .schema()
            .iter()
            .filter(|s| obj.get(s.name).map(Value::is_null).unwrap_or(true))
            .map(|s| s.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::MissingParameters(missing));
        }

        let mut table = toml::Table::new();
        for spec in self.schema() {
            let v = &obj[spec.name];
            let encoded = encode_input(spec, v)?;
            table.insert(spec.name.to_string(), encoded);
        }
        Ok(table)
    }
}

fn bad(name: &str, what: &str) -> AppError {
    AppError::BadRequest(format!("{name} must be {what}"))
}

fn scalar_str<'a>(name: &str, v: &'a Value) -> AppResult<std::borrow::Cow<'a, str>> {
    match v {
        Value::String(s) if s.len() <= MAX_FIELD_STR_LEN * 2 => Ok(s.trim().into()),
        Value::Number(n) => Ok(n.to_string().into()),
        _ => Err(bad(name, "a string or number")),
    }
}

fn encode_u64(name: &str, v: &Value) -> AppResult<String> {
    if let Some(n) = v.as_u64() {
        return Ok(n.to_string());
    }
    let s = scalar_str(name, v)?;
    s.parse::<u64>()
        .map(|n| n.to_string())
        .map_err(|_| bad(name, "an unsigned 64-bit integer"))
}

fn encode_field(name: &str, v: &Value) -> AppResult<String> {
    let s = scalar_str(name, v)?;
    parse_field(&s)
        .map(|n| n.to_str_radix(10))
        .map_err(|_| bad(name, "a field element (decimal or 0x-hex, below the scalar modulus)"))
}

fn encode_address(name: &str, v: &Value) -> AppResult<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() && s.len() <= MAX_FIELD_STR_LEN * 2 => {
            Ok(address_to_field(s))
        }
        _ => Err(bad(name, "a non-empty address string")),
    }
}

fn array<'a>(name: &str, v: &'a Value) -> AppResult<&'a Vec<Value>> {
    v.as_array().ok_or_else(|| bad(name, "an array"))
}

fn encode_input(spec: &InputSpec, v: &Value) -> AppResult<toml::Value> {
    let name = spec.name;
    let out = match spec.kind {
        InputKind::Address => toml::Value::String(encode_address(name, v)?),
        InputKind::U64 => toml::Value::String(encode_u64(name, v)?),
        InputKind::Field => toml::Value::String(encode_field(name, v)?),
        InputKind::FieldArray(n) => {
            let items = array(name, v)?;
            if items.len() != n {
                return Err(bad(name, &format!("an array of exactly {n} field elements")));
            }
            let vals = items
                .iter()
                .map(|x| encode_field(name, x).map(toml::Value::String))
                .collect::<AppResult<Vec<_>>>()?;
            toml::Value::Array(vals)
        }
        InputKind::BitArray(n) => {
            let items = array(name, v)?;
            if items.len() != n {
                return Err(bad(name, &format!("an array of exactly {n} bits")));
            }
            let vals = items
                .iter()
                .map(|x| match encode_u64(name, x)?.as_str() {
                    b @ ("0" | "1") => Ok(toml::Value::String(b.to_string())),
                    _ => Err(bad(name, "an array of 0/1 values")),
                })
                .collect::<AppResult<Vec<_>>>()?;
            toml::Value::Array(vals)
        }
        InputKind::AddressList(n) => {
            let items = array(name, v)?;
            if items.len() > n {
                return Err(bad(name, &format!("an array of at most {n} addresses")));
            }
            let mut vals = items
                .iter()
                .map(|x| encode_address(name, x).map(toml::Value::String))
                .collect::<AppResult<Vec<_>>>()?;
            vals.resize(n, toml::Value::String("0".into()));
            toml::Value::Array(vals)
        }
    };
    Ok(out)
}
