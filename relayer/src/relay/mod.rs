pub mod eligibility;
pub mod engine;
pub mod instruction;
pub mod rpc;

pub use engine::{RelayEngine, RelayOutcome, RelayerRequest};
pub use rpc::{ChainRpc, SolanaRpc};
