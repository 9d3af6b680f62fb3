//! Droplet SPH simulation kernel
//!
//! Fixed-capacity, dispatch-driven Smoothed Particle Hydrodynamics core for
//! droplet-style fluids. A simulation owns a particle store, partitions it
//! into fluid phases, couples with external box-shaped solids, and advances
//! through four compute stages per tick.
//!
//! # Modules
//! - [`stage`] -- Stage identifiers and the resolved kernel handle table.
//! - [`particle`] -- Struct-of-arrays storage and the owned particle store.
//! - [`phase`] -- Fluid phases and the contiguous partition of the store.
//! - [`obstacle`] -- Obstacle sources and the per-tick coupling buffer.
//! - [`sph`] -- Spiky/Poly6 kernels and the host reference stage operators.
//! - [`neighbor`] -- Uniform-grid spatial hash for neighbor search.
//! - [`pipeline`] -- Stage uniforms and per-tick dispatch sequencing.
//! - [`population`] -- Spawning and removal within capacity.
//! - [`simulation`] -- [`FluidSimulation`], the public entry point.
//! - [`cpu`] -- Reference CPU backend.
//! - `gpu` -- wgpu compute backend (feature `gpu`).

#![warn(missing_docs)]

pub mod cpu;
pub mod domain;
pub mod error;
pub mod neighbor;
pub mod obstacle;
pub mod particle;
pub mod phase;
pub mod pipeline;
pub mod population;
pub mod simulation;
pub mod sph;
pub mod stage;

#[cfg(feature = "gpu")]
pub mod gpu;

use std::ops::Range;

pub use cpu::{CpuKernel, CpuProgram};
pub use domain::{SimulationDomain, SolverSettings};
pub use error::KernelError;
pub use obstacle::{
    Interactable, InteractableScene, Obstacle, ObstacleBuffer, ObstacleSource, MAX_INTERACTABLES,
};
pub use particle::{ParticleArrays, ParticleStore};
pub use phase::{FluidPhase, PartitionTable, MAX_PHASES};
pub use pipeline::StageUniforms;
pub use simulation::{FluidSimulation, PhaseStats};
pub use stage::{KernelTable, Stage, WORKGROUP_WIDTH};

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, GpuKernel, ShaderProgram};

/// Three-component vector used for positions, velocities and extents.
pub type Vec3 = [f32; 3];

// ---------------------------------------------------------------------------
// SimulationKernel trait
// ---------------------------------------------------------------------------

/// Trait that every compute backend implements.
///
/// A backend owns the particle buffers (allocated for a fixed capacity when
/// it is constructed) and one resolved handle per [`Stage`]. The host drives
/// it by binding uniforms and obstacles, then dispatching stages over index
/// ranges. Dispatches run in submission order; readbacks block until every
/// earlier dispatch has finished.
///
/// All transfers are prefix transfers starting at index 0.
pub trait SimulationKernel {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Number of particle slots the buffers were allocated for.
    fn capacity(&self) -> usize;

    /// Bind the uniforms read by subsequent dispatches.
    fn bind_uniforms(&mut self, uniforms: &StageUniforms);

    /// Bind the obstacle snapshot read by subsequent integration dispatches.
    fn bind_obstacles(&mut self, obstacles: &ObstacleBuffer);

    /// Run `stage` for every particle index in `range`.
    fn dispatch(&mut self, stage: Stage, range: Range<usize>);

    /// Positions of the first `count` particles.
    fn read_positions(&self, count: usize) -> Vec<Vec3>;

    /// Velocities of the first `count` particles.
    fn read_velocities(&self, count: usize) -> Vec<Vec3>;

    /// `[density, near_density]` of the first `count` particles.
    fn read_densities(&self, count: usize) -> Vec<[f32; 2]>;

    /// Overwrite the first `data.len()` positions.
    fn write_positions(&mut self, data: &[Vec3]);

    /// Overwrite the first `data.len()` velocities.
    fn write_velocities(&mut self, data: &[Vec3]);

    /// Free the particle buffers. Called exactly once by the owning store.
    fn release(&mut self);
}
