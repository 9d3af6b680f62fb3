//! Fatal configuration errors raised while building a simulation.
//!
//! Non-fatal steady-state conditions (spawning past capacity, ticking an empty
//! store, obstacles without a velocity source) are absorbed by the callers and
//! never surface here.

use crate::stage::Stage;

/// Errors that abort initialization of a [`FluidSimulation`](crate::FluidSimulation).
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The compute program does not expose the entry point a stage needs.
    #[error("kernel entry point `{entry}` for stage {stage:?} is missing from the program")]
    MissingEntryPoint {
        /// Stage whose handle could not be resolved.
        stage: Stage,
        /// Entry point name that was looked up.
        entry: &'static str,
    },

    /// No compute program was assigned to the backend.
    #[error("no compute program assigned to the backend")]
    UnassignedProgram,

    /// Capacity must be at least one particle.
    #[error("particle capacity must be positive (got {0})")]
    InvalidCapacity(usize),

    /// Domain box is malformed (negative limit size, non-finite values).
    #[error("invalid simulation domain: {0}")]
    InvalidDomain(String),

    /// Solver settings are out of range.
    #[error("invalid solver settings: {0}")]
    InvalidSettings(String),

    /// Phase ranges do not partition the live particle range.
    #[error("invalid phase partition: {0}")]
    InvalidPartition(String),

    /// More phases than the integration phase table can carry.
    #[error("{count} fluid phases configured, at most {max} are supported")]
    TooManyPhases {
        /// Number of phases requested.
        count: usize,
        /// Supported maximum.
        max: usize,
    },

    /// Adapter, device or shader compilation failure in the GPU backend.
    #[error("GPU backend failure: {0}")]
    Gpu(String),
}
