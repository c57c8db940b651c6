//! ZK gate relayer: Noir proof generation over HTTP plus a fee-paying relay
//! for proof-gated Solana instructions.

pub mod config;
pub(crate) mod constants;
pub mod error;
pub mod field;
pub mod handlers;
pub mod metrics;
pub mod proving;
pub mod rate_limit;
pub mod relay;
pub mod router;
pub mod state;
pub mod types;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
