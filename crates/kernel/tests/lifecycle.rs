//! Initialization, reset and teardown of a simulation.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use droplet_kernel::{
    CpuKernel, FluidPhase, FluidSimulation, Interactable, InteractableScene, KernelError, ObstacleBuffer,
    PartitionTable, SimulationDomain, SimulationKernel, SolverSettings, Stage, StageUniforms,
    Vec3,
};

fn phase(name: &str) -> FluidPhase {
    FluidPhase {
        name: name.to_string(),
        target_density: 10.0,
        pressure_multiplier: 20.0,
        near_pressure_multiplier: 2.0,
        viscosity_multiplier: 0.1,
        max_speed: 10.0,
        max_force: 50.0,
        gravity: 9.8,
        smoothing_radius: None,
    }
}

fn domain() -> SimulationDomain {
    SimulationDomain {
        spawn_centre: [1.0, 2.0, 0.0],
        spawn_size: [2.0, 1.0, 2.0],
        limit_size: [4.0, 4.0, 4.0],
    }
}

/// CPU kernel that counts how often its buffers are released.
struct CountingKernel {
    inner: CpuKernel,
    releases: Arc<AtomicUsize>,
}

impl SimulationKernel for CountingKernel {
    fn backend_name(&self) -> &'static str {
        "counting"
    }
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
    fn bind_uniforms(&mut self, uniforms: &StageUniforms) {
        self.inner.bind_uniforms(uniforms)
    }
    fn bind_obstacles(&mut self, obstacles: &ObstacleBuffer) {
        self.inner.bind_obstacles(obstacles)
    }
    fn dispatch(&mut self, stage: Stage, range: Range<usize>) {
        self.inner.dispatch(stage, range)
    }
    fn read_positions(&self, count: usize) -> Vec<Vec3> {
        self.inner.read_positions(count)
    }
    fn read_velocities(&self, count: usize) -> Vec<Vec3> {
        self.inner.read_velocities(count)
    }
    fn read_densities(&self, count: usize) -> Vec<[f32; 2]> {
        self.inner.read_densities(count)
    }
    fn write_positions(&mut self, data: &[Vec3]) {
        self.inner.write_positions(data)
    }
    fn write_velocities(&mut self, data: &[Vec3]) {
        self.inner.write_velocities(data)
    }
    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release()
    }
}

fn counting_sim(releases: &Arc<AtomicUsize>) -> FluidSimulation {
    let kernel = CountingKernel {
        inner: CpuKernel::new(64).unwrap(),
        releases: Arc::clone(releases),
    };
    FluidSimulation::initialize(
        Box::new(kernel),
        domain(),
        SolverSettings::default(),
        PartitionTable::single(phase("water"), 32),
    )
    .unwrap()
}

#[test]
fn initial_fill_lies_in_spawn_volume_at_rest() {
    let partition = PartitionTable::single(phase("water"), 500);
    let sim = FluidSimulation::cpu(600, domain(), SolverSettings::default(), partition).unwrap();
    let d = domain();

    assert_eq!(sim.live_count(), 500);
    assert_eq!(sim.capacity(), 600);
    for p in sim.positions() {
        for c in 0..3 {
            let half = 0.5 * d.spawn_size[c];
            assert!(
                p[c] >= d.spawn_centre[c] - half && p[c] <= d.spawn_centre[c] + half,
                "{p:?} outside spawn volume"
            );
        }
    }
    assert!(sim.velocities().iter().all(|v| *v == [0.0; 3]));
}

#[test]
fn initial_fill_is_deterministic_per_seed() {
    let make = |seed| {
        let settings = SolverSettings {
            seed,
            ..SolverSettings::default()
        };
        FluidSimulation::cpu(100, domain(), settings, PartitionTable::single(phase("w"), 100))
            .unwrap()
            .positions()
    };
    assert_eq!(make(7), make(7));
    assert_ne!(make(7), make(8));
}

#[test]
fn initial_count_above_capacity_is_rejected() {
    let partition = PartitionTable::single(phase("water"), 65);
    let result = FluidSimulation::cpu(64, domain(), SolverSettings::default(), partition);
    assert!(matches!(result, Err(KernelError::InvalidPartition(_))));
}

#[test]
fn invalid_settings_are_rejected() {
    let settings = SolverSettings {
        smoothing_radius: 0.0,
        ..SolverSettings::default()
    };
    let result = FluidSimulation::cpu(
        16,
        domain(),
        settings,
        PartitionTable::single(phase("water"), 8),
    );
    assert!(matches!(result, Err(KernelError::InvalidSettings(_))));
}

#[test]
fn empty_store_ticks_to_nothing() {
    let partition = PartitionTable::single(phase("water"), 0);
    let mut sim = FluidSimulation::cpu(16, domain(), SolverSettings::default(), partition).unwrap();

    assert!(sim.tick(1.0 / 120.0).is_empty());
    assert_eq!(sim.ticks(), 0);

    sim.spawn_at([1.0, 2.0, 0.0], 4);
    assert_eq!(sim.tick(1.0 / 120.0).len(), 4);
    assert_eq!(sim.ticks(), 1);
}

#[test]
fn reset_restores_initial_fill() {
    let partition = PartitionTable::single(phase("water"), 200);
    let mut sim = FluidSimulation::cpu(200, domain(), SolverSettings::default(), partition).unwrap();
    let initial = sim.positions();

    for _ in 0..20 {
        sim.tick(1.0 / 120.0);
    }
    assert_ne!(sim.positions(), initial);

    sim.reset();
    assert_eq!(sim.positions(), initial);
    assert!(sim.velocities().iter().all(|v| *v == [0.0; 3]));
    assert_eq!(sim.live_count(), 200);
}

#[test]
fn tick_returns_positions_inside_walls() {
    let partition = PartitionTable::single(phase("water"), 150);
    let mut sim = FluidSimulation::cpu(150, domain(), SolverSettings::default(), partition).unwrap();
    let (lo, hi) = domain().bounds();

    for _ in 0..60 {
        for p in sim.tick(1.0 / 60.0) {
            for c in 0..3 {
                assert!(p[c] >= lo[c] && p[c] <= hi[c]);
            }
        }
    }
}

#[test]
fn disabled_interactables_are_ignored() {
    let mut scene = InteractableScene::new();
    scene.push(Interactable {
        bounds_center: [1.0, 2.0, 0.0],
        bounds_size: [10.0, 10.0, 10.0],
        size_offset: [0.0; 3],
        collision_enabled: false,
        velocity: Some([5.0, 0.0, 0.0]),
    });

    let make = || {
        FluidSimulation::cpu(
            50,
            domain(),
            SolverSettings::default(),
            PartitionTable::single(phase("water"), 50),
        )
        .unwrap()
    };
    let mut plain = make();
    let mut with_scene = make();
    with_scene.set_obstacle_source(Box::new(scene));

    for _ in 0..5 {
        assert_eq!(plain.tick(1.0 / 120.0), with_scene.tick(1.0 / 120.0));
    }
}

#[test]
fn teardown_releases_once() {
    let releases = Arc::new(AtomicUsize::new(0));
    let sim = counting_sim(&releases);
    sim.teardown();
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_releases_once() {
    let releases = Arc::new(AtomicUsize::new(0));
    {
        let mut sim = counting_sim(&releases);
        sim.tick(1.0 / 120.0);
    }
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn phase_stats_cover_every_phase() {
    let partition =
        PartitionTable::from_counts(vec![phase("blue"), phase("red")], &[40, 0]).unwrap();
    let mut sim = FluidSimulation::cpu(64, domain(), SolverSettings::default(), partition).unwrap();
    sim.tick(1.0 / 120.0);

    let stats = sim.phase_stats();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].name, "blue");
    assert_eq!(stats[0].count, 40);
    assert!(stats[0].mean_density > 0.0);
    assert_eq!(stats[1].count, 0);
    assert_eq!(stats[1].mean_density, 0.0);
}
