//! Per-tick stage sequencing and the uniforms bound before each dispatch.
//!
//! A step runs density, pressure and viscosity once per phase range (each
//! with that phase's constants bound), then a single integration dispatch
//! over the whole live range with the phase motion table bound.

use std::ops::Range;

use crate::domain::{SimulationDomain, SolverSettings};
use crate::obstacle::ObstacleBuffer;
use crate::phase::{FluidPhase, PartitionTable, PhaseMotionTable};
use crate::stage::Stage;
use crate::{SimulationKernel, Vec3};

/// Everything a stage reads besides particle and obstacle buffers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageUniforms {
    /// Live particle count; neighbor sums run over `[0, num_droplets)`.
    pub num_droplets: u32,
    /// Step length.
    pub delta_time: f32,
    /// Neighbor radius of the current dispatch.
    pub smoothing_radius: f32,
    /// Largest radius any phase of the step uses; neighbor grids are built
    /// for this so one grid serves every phase.
    pub grid_radius: f32,
    /// Rest density of the bound phase.
    pub target_density: f32,
    /// Pressure stiffness of the bound phase.
    pub pressure_multiplier: f32,
    /// Near-pressure stiffness of the bound phase.
    pub near_pressure_multiplier: f32,
    /// Viscosity strength of the bound phase.
    pub viscosity_multiplier: f32,
    /// Wall restitution.
    pub collision_damping: f32,
    /// Center of the spawn volume and wall box.
    pub spawn_centre: Vec3,
    /// Extent of the spawn volume.
    pub spawn_size: Vec3,
    /// Extent of the wall box.
    pub limit_size: Vec3,
    /// Spawn-fill hash seed.
    pub seed: u32,
    /// Phase ranges and motion limits, read by integration only.
    pub phases: PhaseMotionTable,
}

impl StageUniforms {
    /// Domain and solver values shared by every dispatch of one step.
    pub fn base(
        domain: &SimulationDomain,
        settings: &SolverSettings,
        num_droplets: usize,
        delta_time: f32,
    ) -> Self {
        Self {
            num_droplets: num_droplets as u32,
            delta_time,
            smoothing_radius: settings.smoothing_radius,
            grid_radius: settings.smoothing_radius,
            collision_damping: settings.collision_damping,
            spawn_centre: domain.spawn_centre,
            spawn_size: domain.spawn_size,
            limit_size: domain.limit_size,
            seed: settings.seed,
            ..Self::default()
        }
    }

    /// Copy with `phase`'s constants bound.
    pub fn for_phase(&self, phase: &FluidPhase) -> Self {
        Self {
            smoothing_radius: phase.radius_or(self.smoothing_radius),
            target_density: phase.target_density,
            pressure_multiplier: phase.pressure_multiplier,
            near_pressure_multiplier: phase.near_pressure_multiplier,
            viscosity_multiplier: phase.viscosity_multiplier,
            ..*self
        }
    }

    /// Copy with the phase motion table of `partition` bound.
    pub fn with_phase_table(&self, partition: &PartitionTable) -> Self {
        Self {
            phases: partition.motion_table(),
            ..*self
        }
    }

    /// Corners of the wall box `spawn_centre +/- limit_size / 2`.
    pub fn clamp_box(&self) -> (Vec3, Vec3) {
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for c in 0..3 {
            let half = 0.5 * self.limit_size[c];
            lo[c] = self.spawn_centre[c] - half;
            hi[c] = self.spawn_centre[c] + half;
        }
        (lo, hi)
    }
}

/// Seed `range` with the spawn-fill stage.
pub fn seed_spawn(
    kernel: &mut dyn SimulationKernel,
    domain: &SimulationDomain,
    settings: &SolverSettings,
    range: Range<usize>,
) {
    if range.is_empty() {
        return;
    }
    let uniforms = StageUniforms::base(domain, settings, range.end, 0.0);
    kernel.bind_uniforms(&uniforms);
    kernel.dispatch(Stage::SpawnFill, range);
}

/// Run one simulation step of `dt` over every live particle.
pub fn run_step(
    kernel: &mut dyn SimulationKernel,
    partition: &PartitionTable,
    domain: &SimulationDomain,
    settings: &SolverSettings,
    obstacles: &ObstacleBuffer,
    dt: f32,
) {
    let live = partition.live_count();
    if live == 0 {
        return;
    }
    let base = StageUniforms {
        grid_radius: partition.max_radius(settings.smoothing_radius),
        ..StageUniforms::base(domain, settings, live, dt)
    };

    for stage in Stage::STEP {
        if stage == Stage::Integrate {
            kernel.bind_uniforms(&base.with_phase_table(partition));
            kernel.bind_obstacles(obstacles);
            kernel.dispatch(stage, 0..live);
            continue;
        }
        for (phase, range) in partition.iter() {
            if range.is_empty() {
                continue;
            }
            kernel.bind_uniforms(&base.for_phase(phase));
            kernel.dispatch(stage, range);
        }
    }
}
