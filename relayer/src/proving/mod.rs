pub mod artifacts;
pub mod circuits;
pub mod pipeline;
pub mod preflight;
pub mod toolchain;

pub use circuits::CircuitKind;
pub use pipeline::{CircuitStatus, ProofPipeline, ProofResult};
pub use toolchain::{SubprocessToolchain, Toolchain};
