//! Orchestration Layer
//!
//! This crate turns scene files into running droplet sessions:
//! - Scene configuration parsing and validation
//! - Backend selection with CPU fallback
//! - A frame-driven session with pause, reset and a particle brush

#![warn(missing_docs)]

pub mod config;
pub mod session;

pub use config::{Backend, BrushConfig, ConfigError, SceneConfig, SessionCommand};
pub use session::{FrameReport, RunnerState, Session};

use droplet_kernel::{CpuKernel, FluidSimulation, KernelError, SimulationKernel};

/// Allocate a kernel with `capacity` slots on the requested backend.
///
/// `Backend::Auto` tries the GPU (when built with the `gpu` feature and an
/// adapter exists) and falls back to the CPU on any failure.
pub fn build_kernel(
    backend: Backend,
    capacity: usize,
) -> Result<Box<dyn SimulationKernel + Send>, KernelError> {
    match backend {
        Backend::Cpu => Ok(Box::new(CpuKernel::new(capacity)?)),
        Backend::Gpu => gpu_kernel(capacity),
        Backend::Auto => match gpu_kernel(capacity) {
            Ok(kernel) => Ok(kernel),
            Err(e) => {
                tracing::warn!("GPU backend unavailable ({e}), falling back to CPU");
                Ok(Box::new(CpuKernel::new(capacity)?))
            }
        },
    }
}

#[cfg(feature = "gpu")]
fn gpu_kernel(capacity: usize) -> Result<Box<dyn SimulationKernel + Send>, KernelError> {
    if capacity == 0 {
        return Err(KernelError::InvalidCapacity(capacity));
    }
    if !droplet_kernel::gpu_available() {
        return Err(KernelError::Gpu("no suitable GPU adapter found".to_string()));
    }
    Ok(Box::new(droplet_kernel::GpuKernel::new(capacity)?))
}

#[cfg(not(feature = "gpu"))]
fn gpu_kernel(_capacity: usize) -> Result<Box<dyn SimulationKernel + Send>, KernelError> {
    Err(KernelError::Gpu(
        "built without the `gpu` feature".to_string(),
    ))
}

/// Create a session from a validated scene
///
/// Picks the backend, seeds the initial population, and attaches the
/// scene's interactables as the obstacle source.
pub fn create_session(config: &SceneConfig) -> Result<Session, ConfigError> {
    config.validate()?;
    let partition = config.partition()?;
    let kernel = build_kernel(config.backend, config.capacity)?;
    tracing::info!(
        scene = %config.name,
        backend = kernel.backend_name(),
        capacity = config.capacity,
        initial = partition.live_count(),
        "creating session"
    );

    let mut sim = FluidSimulation::initialize(kernel, config.domain, config.settings, partition)?;
    if !config.interactables.interactables.is_empty() {
        sim.set_obstacle_source(Box::new(config.interactables.clone()));
    }
    Ok(Session::new(config.name.clone(), sim, config.brush))
}

/// Load a scene file and create a session from it
pub fn create_session_from_file(path: &str) -> Result<Session, ConfigError> {
    tracing::info!("Creating session from scene: {}", path);
    let config = SceneConfig::load(path)?;
    create_session(&config)
}
