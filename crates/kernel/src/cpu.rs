//! Reference CPU implementation of [`SimulationKernel`].
//!
//! Stage bodies are plain function pointers exported under the same entry
//! point names as the WGSL program, and resolved into a [`KernelTable`] the
//! same way, so a program missing an entry fails construction on either
//! backend.

use std::ops::Range;

use crate::error::KernelError;
use crate::neighbor::NeighborGrid;
use crate::obstacle::ObstacleBuffer;
use crate::particle::ParticleArrays;
use crate::pipeline::StageUniforms;
use crate::sph;
use crate::stage::{KernelTable, Stage};
use crate::{SimulationKernel, Vec3};

/// Host-side buffers and bindings the CPU stages operate on.
pub struct CpuState {
    /// Particle buffers sized to capacity.
    pub particles: ParticleArrays,
    /// Currently bound uniforms.
    pub uniforms: StageUniforms,
    /// Currently bound obstacle snapshot.
    pub obstacles: ObstacleBuffer,
    grid: Option<NeighborGrid>,
    grid_dirty: bool,
    velocity_snapshot: Vec<Vec3>,
}

impl CpuState {
    fn new(capacity: usize) -> Self {
        Self {
            particles: ParticleArrays::with_capacity(capacity),
            uniforms: StageUniforms::default(),
            obstacles: ObstacleBuffer::default(),
            grid: None,
            grid_dirty: true,
            velocity_snapshot: Vec::new(),
        }
    }

    /// Live range clipped to `range`.
    fn clip(&self, range: Range<usize>) -> Range<usize> {
        let live = (self.uniforms.num_droplets as usize).min(self.particles.len());
        range.start.min(live)..range.end.min(live)
    }

    /// Rebuild the neighbor grid if positions moved, the live count changed,
    /// or the bound radius outgrew the cells. Cells are sized for the step's
    /// largest radius, so phases with different radii share one grid.
    fn refresh_grid(&mut self) {
        let live = (self.uniforms.num_droplets as usize).min(self.particles.len());
        let radius = self.uniforms.grid_radius.max(self.uniforms.smoothing_radius);
        let (lo, hi) = self.uniforms.clamp_box();
        let stale = match &self.grid {
            None => true,
            Some(grid) => self.grid_dirty || grid.len() != live || grid.cell_size() < radius,
        };
        if !stale {
            return;
        }
        let mut grid = match self.grid.take() {
            Some(grid) if grid.cell_size() >= radius => grid,
            _ => NeighborGrid::covering(lo, hi, radius),
        };
        let p = &self.particles;
        grid.update(&p.x[..live], &p.y[..live], &p.z[..live]);
        self.grid = Some(grid);
        self.grid_dirty = false;
    }

    fn mark_moved(&mut self) {
        self.grid_dirty = true;
    }
}

/// Signature of one CPU stage body.
pub type CpuStageFn = fn(&mut CpuState, Range<usize>);

fn generate_spawn_data(state: &mut CpuState, range: Range<usize>) {
    let range = range.start.min(state.particles.len())..range.end.min(state.particles.len());
    sph::spawn_fill(&mut state.particles, &state.uniforms, range);
    state.mark_moved();
}

fn calc_density(state: &mut CpuState, range: Range<usize>) {
    let range = state.clip(range);
    state.refresh_grid();
    if let Some(grid) = &state.grid {
        sph::compute_density(&mut state.particles, grid, &state.uniforms, range);
    }
}

fn calc_pressure(state: &mut CpuState, range: Range<usize>) {
    let range = state.clip(range);
    state.refresh_grid();
    if let Some(grid) = &state.grid {
        sph::apply_pressure(&mut state.particles, grid, &state.uniforms, range);
    }
}

fn calc_viscosity(state: &mut CpuState, range: Range<usize>) {
    let range = state.clip(range);
    state.refresh_grid();
    let live = state.clip(0..state.particles.len()).end;
    let p = &state.particles;
    state.velocity_snapshot.clear();
    state
        .velocity_snapshot
        .extend((0..live).map(|i| p.velocity(i)));
    if let Some(grid) = &state.grid {
        sph::apply_viscosity(
            &mut state.particles,
            &state.velocity_snapshot,
            grid,
            &state.uniforms,
            range,
        );
    }
}

fn update_droplet_position(state: &mut CpuState, range: Range<usize>) {
    let range = state.clip(range);
    sph::integrate(&mut state.particles, &state.obstacles, &state.uniforms, range);
    state.mark_moved();
}

/// A set of named CPU stage bodies, the host analogue of a compute program.
#[derive(Clone)]
pub struct CpuProgram {
    entries: Vec<(&'static str, CpuStageFn)>,
}

impl CpuProgram {
    /// The full droplet program.
    pub fn reference() -> Self {
        Self {
            entries: vec![
                ("generate_spawn_data", generate_spawn_data as CpuStageFn),
                ("calc_density", calc_density),
                ("calc_pressure", calc_pressure),
                ("calc_viscosity", calc_viscosity),
                ("update_droplet_position", update_droplet_position),
            ],
        }
    }

    /// Copy of this program without the entry named `entry`.
    pub fn without(mut self, entry: &str) -> Self {
        self.entries.retain(|(name, _)| *name != entry);
        self
    }
}

/// Reference CPU backend.
///
/// Runs every stage synchronously on the calling thread, so readbacks never
/// wait.
pub struct CpuKernel {
    state: CpuState,
    program: KernelTable<CpuStageFn>,
    capacity: usize,
}

impl CpuKernel {
    /// Allocate buffers for `capacity` particles and resolve every stage of
    /// `program`.
    ///
    /// Fails with [`KernelError::UnassignedProgram`] if `program` is `None`
    /// and with [`KernelError::MissingEntryPoint`] if a stage is missing.
    pub fn allocate(capacity: usize, program: Option<CpuProgram>) -> Result<Self, KernelError> {
        if capacity == 0 {
            return Err(KernelError::InvalidCapacity(capacity));
        }
        let program = program.ok_or(KernelError::UnassignedProgram)?;
        let table = KernelTable::from_entries(program.entries)?;
        tracing::debug!(capacity, "CPU kernel allocated");
        Ok(Self {
            state: CpuState::new(capacity),
            program: table,
            capacity,
        })
    }

    /// [`allocate`](Self::allocate) with the reference program.
    pub fn new(capacity: usize) -> Result<Self, KernelError> {
        Self::allocate(capacity, Some(CpuProgram::reference()))
    }

    /// Host buffers, for inspection in tests and tools.
    pub fn particles(&self) -> &ParticleArrays {
        &self.state.particles
    }
}

impl SimulationKernel for CpuKernel {
    fn backend_name(&self) -> &'static str {
        "cpu"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn bind_uniforms(&mut self, uniforms: &StageUniforms) {
        self.state.uniforms = *uniforms;
    }

    fn bind_obstacles(&mut self, obstacles: &ObstacleBuffer) {
        self.state.obstacles = obstacles.clone();
    }

    fn dispatch(&mut self, stage: Stage, range: Range<usize>) {
        if self.state.particles.is_empty() || range.is_empty() {
            return;
        }
        let body = self.program[stage];
        body(&mut self.state, range);
    }

    fn read_positions(&self, count: usize) -> Vec<Vec3> {
        let p = &self.state.particles;
        (0..count.min(p.len())).map(|i| p.position(i)).collect()
    }

    fn read_velocities(&self, count: usize) -> Vec<Vec3> {
        let p = &self.state.particles;
        (0..count.min(p.len())).map(|i| p.velocity(i)).collect()
    }

    fn read_densities(&self, count: usize) -> Vec<[f32; 2]> {
        let p = &self.state.particles;
        (0..count.min(p.len()))
            .map(|i| [p.density[i], p.near_density[i]])
            .collect()
    }

    fn write_positions(&mut self, data: &[Vec3]) {
        let p = &mut self.state.particles;
        for (i, &pos) in data.iter().enumerate().take(p.len()) {
            p.set_position(i, pos);
        }
        self.state.mark_moved();
    }

    fn write_velocities(&mut self, data: &[Vec3]) {
        let p = &mut self.state.particles;
        for (i, &vel) in data.iter().enumerate().take(p.len()) {
            p.set_velocity(i, vel);
        }
    }

    fn release(&mut self) {
        self.state.particles.clear();
        self.state.velocity_snapshot = Vec::new();
        self.state.grid = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            CpuKernel::new(0),
            Err(KernelError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn unassigned_program_is_fatal() {
        assert!(matches!(
            CpuKernel::allocate(16, None),
            Err(KernelError::UnassignedProgram)
        ));
    }

    #[test]
    fn missing_entry_point_is_fatal() {
        let program = CpuProgram::reference().without("calc_viscosity");
        match CpuKernel::allocate(16, Some(program)) {
            Err(KernelError::MissingEntryPoint { stage, .. }) => {
                assert_eq!(stage, Stage::Viscosity)
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("kernel built without a viscosity stage"),
        }
    }

    #[test]
    fn prefix_writes_and_reads() {
        let mut kernel = CpuKernel::new(4).unwrap();
        kernel.write_positions(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        kernel.write_velocities(&[[0.5, 0.0, 0.0]]);
        assert_eq!(kernel.read_positions(2), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(kernel.read_velocities(1), vec![[0.5, 0.0, 0.0]]);
        assert_eq!(kernel.read_positions(10).len(), 4);
    }

    #[test]
    fn grid_is_built_once_for_the_widest_phase() {
        let mut kernel = CpuKernel::new(2).unwrap();
        kernel.write_positions(&[[0.0; 3], [0.3, 0.0, 0.0]]);
        let narrow = StageUniforms {
            num_droplets: 2,
            smoothing_radius: 0.2,
            grid_radius: 0.5,
            limit_size: [4.0; 3],
            ..StageUniforms::default()
        };

        kernel.bind_uniforms(&narrow);
        kernel.dispatch(Stage::Density, 0..1);
        let cell_size = kernel.state.grid.as_ref().map(NeighborGrid::cell_size);
        assert_eq!(cell_size, Some(0.5));
        // Out of reach at 0.2, so only the self term counts.
        assert_eq!(kernel.particles().density[0], sph::spiky_pow2(0.0, 0.2));

        kernel.bind_uniforms(&StageUniforms {
            smoothing_radius: 0.5,
            ..narrow
        });
        kernel.dispatch(Stage::Density, 1..2);
        assert!(!kernel.state.grid_dirty);
        assert!(kernel.particles().density[1] > sph::spiky_pow2(0.0, 0.5));
    }

    #[test]
    fn dispatch_after_release_is_a_no_op() {
        let mut kernel = CpuKernel::new(4).unwrap();
        kernel.release();
        kernel.dispatch(Stage::SpawnFill, 0..4);
        assert!(kernel.read_positions(4).is_empty());
    }
}
