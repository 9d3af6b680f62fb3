//! [`FluidSimulation`]: the owned, tick-driven droplet simulation.

use crate::domain::{SimulationDomain, SolverSettings};
use crate::error::KernelError;
use crate::obstacle::{ObstacleBuffer, ObstacleSource};
use crate::particle::ParticleStore;
use crate::phase::PartitionTable;
use crate::pipeline;
use crate::population::PopulationManager;
use crate::{CpuKernel, SimulationKernel, Vec3};

/// Per-phase diagnostics computed from a density and velocity readback.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseStats {
    /// Phase name.
    pub name: String,
    /// Particles currently in the phase.
    pub count: usize,
    /// Mean density, zero for an empty phase.
    pub mean_density: f32,
    /// Mean speed, zero for an empty phase.
    pub mean_speed: f32,
}

/// A droplet fluid simulation over a fixed-capacity particle store.
///
/// Construction validates the configuration, allocates the store and seeds
/// the initial population. Population edits happen between ticks through
/// `&mut self`, so they can never overlap a dispatch.
pub struct FluidSimulation {
    store: ParticleStore,
    partition: PartitionTable,
    domain: SimulationDomain,
    settings: SolverSettings,
    population: PopulationManager,
    obstacles: Box<dyn ObstacleSource + Send>,
    ticks: u64,
}

impl FluidSimulation {
    /// Validate, take ownership of `kernel`'s buffers and seed
    /// `partition.live_count()` particles with the spawn-fill stage.
    pub fn initialize(
        kernel: Box<dyn SimulationKernel + Send>,
        domain: SimulationDomain,
        settings: SolverSettings,
        partition: PartitionTable,
    ) -> Result<Self, KernelError> {
        domain.validate()?;
        settings.validate()?;
        let initial_count = partition.live_count();
        partition.validate(initial_count)?;

        let mut store = ParticleStore::new(kernel)?;
        if initial_count > store.capacity() {
            return Err(KernelError::InvalidPartition(format!(
                "initial population {initial_count} exceeds capacity {}",
                store.capacity()
            )));
        }

        pipeline::seed_spawn(store.kernel_mut(), &domain, &settings, 0..initial_count);
        store.set_live_count(initial_count);

        tracing::info!(
            capacity = store.capacity(),
            initial_count,
            phases = partition.len(),
            "fluid simulation initialized"
        );

        Ok(Self {
            store,
            partition,
            population: PopulationManager::new(
                settings.seed as u64,
                settings.spawn_jitter,
                settings.planar_jitter,
            ),
            domain,
            settings,
            obstacles: Box::new(()),
            ticks: 0,
        })
    }

    /// [`initialize`](Self::initialize) on the reference CPU backend.
    pub fn cpu(
        capacity: usize,
        domain: SimulationDomain,
        settings: SolverSettings,
        partition: PartitionTable,
    ) -> Result<Self, KernelError> {
        let kernel = CpuKernel::new(capacity)?;
        Self::initialize(Box::new(kernel), domain, settings, partition)
    }

    /// Replace the source of obstacles pulled at the start of each tick.
    pub fn set_obstacle_source(&mut self, source: Box<dyn ObstacleSource + Send>) {
        self.obstacles = source;
    }

    /// Advance by `dt` and return the live positions, clamped into the wall
    /// box. An empty store returns an empty vector without dispatching.
    pub fn tick(&mut self, dt: f32) -> Vec<Vec3> {
        let live = self.store.live_count();
        if live == 0 || self.store.is_released() {
            return Vec::new();
        }

        let obstacles = ObstacleBuffer::gather(&*self.obstacles);
        pipeline::run_step(
            self.store.kernel_mut(),
            &self.partition,
            &self.domain,
            &self.settings,
            &obstacles,
            dt,
        );
        self.ticks += 1;

        let mut positions = self.store.read_positions();
        self.domain.clamp_positions(&mut positions);
        tracing::trace!(tick = self.ticks, live, "tick complete");
        positions
    }

    /// Spawn up to `count` particles around `position`; returns how many
    /// were added.
    pub fn spawn_at(&mut self, position: Vec3, count: usize) -> usize {
        if self.store.is_released() {
            return 0;
        }
        self.population
            .spawn(&mut self.store, &mut self.partition, position, count)
    }

    /// Remove all particles within `radius` of `position`; returns the
    /// removed indices in descending order.
    pub fn remove_near(&mut self, position: Vec3, radius: f32) -> Vec<usize> {
        if self.store.is_released() {
            return Vec::new();
        }
        self.population
            .remove(&mut self.store, &mut self.partition, position, radius)
    }

    /// Re-seed every live particle with the spawn-fill stage.
    pub fn reset(&mut self) {
        let live = self.store.live_count();
        pipeline::seed_spawn(self.store.kernel_mut(), &self.domain, &self.settings, 0..live);
        tracing::info!(live, "simulation reset");
    }

    /// Release the particle store. Dropping the simulation does the same.
    pub fn teardown(mut self) {
        self.store.release();
    }

    /// Live particle count.
    pub fn live_count(&self) -> usize {
        self.store.live_count()
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Current phase ranges.
    pub fn partition(&self) -> &PartitionTable {
        &self.partition
    }

    /// Spawn volume and wall box.
    pub fn domain(&self) -> &SimulationDomain {
        &self.domain
    }

    /// Global solver settings.
    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Unclamped live positions, read back from the backend.
    pub fn positions(&self) -> Vec<Vec3> {
        self.store.read_positions()
    }

    /// Live velocities, read back from the backend.
    pub fn velocities(&self) -> Vec<Vec3> {
        self.store.read_velocities()
    }

    /// `[density, near_density]` per live particle, as of the last tick.
    pub fn densities(&self) -> Vec<[f32; 2]> {
        self.store.read_densities()
    }

    /// Mean density and speed per phase.
    pub fn phase_stats(&self) -> Vec<PhaseStats> {
        let densities = self.densities();
        let velocities = self.velocities();
        self.partition
            .iter()
            .map(|(phase, range)| {
                let count = range.len();
                let (density_sum, speed_sum) = range
                    .filter(|&i| i < densities.len() && i < velocities.len())
                    .fold((0.0_f32, 0.0_f32), |(d, s), i| {
                        let v = velocities[i];
                        (
                            d + densities[i][0],
                            s + (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt(),
                        )
                    });
                let n = count.max(1) as f32;
                PhaseStats {
                    name: phase.name.clone(),
                    count,
                    mean_density: density_sum / n,
                    mean_speed: speed_sum / n,
                }
            })
            .collect()
    }
}
