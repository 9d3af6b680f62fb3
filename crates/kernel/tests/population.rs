//! Spawning and removal between ticks.
//!
//! Checks that the phase ranges keep covering the live range exactly, that
//! spawning stops at capacity, and that removal compacts without reordering
//! the survivors.

use droplet_kernel::{FluidPhase, FluidSimulation, PartitionTable, SimulationDomain, SolverSettings};

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
        spawn_centre: [0.0, 0.0, 0.0],
        spawn_size: [2.0, 2.0, 2.0],
        limit_size: [4.0, 4.0, 4.0],
    }
}

fn two_phase_sim(capacity: usize, counts: [usize; 2]) -> FluidSimulation {
    let partition = PartitionTable::from_counts(vec![phase("blue"), phase("red")], &counts).unwrap();
    FluidSimulation::cpu(capacity, domain(), SolverSettings::default(), partition).unwrap()
}

#[test]
fn spawn_joins_last_phase() {
    let mut sim = two_phase_sim(100, [30, 20]);
    let added = sim.spawn_at([0.0, 1.0, 0.0], 5);

    assert_eq!(added, 5);
    assert_eq!(sim.live_count(), 55);
    assert_eq!(sim.partition().range(0), 0..30);
    assert_eq!(sim.partition().range(1), 30..55);
    sim.partition().validate(sim.live_count()).unwrap();
}

#[test]
fn spawned_particles_start_near_the_point_at_rest() {
    let mut sim = two_phase_sim(100, [10, 10]);
    let target = [0.5, -0.5, 0.0];
    sim.spawn_at(target, 8);

    let positions = sim.positions();
    let velocities = sim.velocities();
    let jitter = sim.settings().spawn_jitter;
    for i in 20..28 {
        let p = positions[i];
        let d2 = (p[0] - target[0]).powi(2) + (p[1] - target[1]).powi(2) + (p[2] - target[2]).powi(2);
        assert!(d2 <= jitter * jitter + 1e-6, "particle {i} spawned {d2} away");
        assert_eq!(velocities[i], [0.0; 3]);
    }
}

#[test]
fn spawn_is_capped_at_capacity() {
    let mut sim = two_phase_sim(50, [25, 15]);

    assert_eq!(sim.spawn_at([0.0; 3], 20), 10);
    assert_eq!(sim.live_count(), 50);
    assert_eq!(sim.spawn_at([0.0; 3], 1), 0);
    assert_eq!(sim.live_count(), 50);
    sim.partition().validate(50).unwrap();
}

#[test]
fn removal_compacts_in_order() {
    let mut sim = two_phase_sim(200, [80, 70]);
    let before = sim.positions();

    let centre = [0.0, 0.0, 0.0];
    let radius = 0.6;
    let removed = sim.remove_near(centre, radius);

    assert!(!removed.is_empty(), "no particle within {radius} of the centre");
    assert!(removed.windows(2).all(|w| w[0] > w[1]), "not descending: {removed:?}");
    for &i in &removed {
        let p = before[i];
        assert!(p[0] * p[0] + p[1] * p[1] + p[2] * p[2] < radius * radius);
    }

    let expected: Vec<_> = before
        .iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(i))
        .map(|(_, p)| *p)
        .collect();
    assert_eq!(sim.positions(), expected);
    assert_eq!(sim.live_count(), 150 - removed.len());
}

#[test]
fn removal_shrinks_owning_phases() {
    let mut sim = two_phase_sim(200, [80, 70]);
    let before = sim.positions();
    let removed = sim.remove_near([0.0, 0.0, 0.0], 0.8);

    let from_first = removed.iter().filter(|&&i| i < 80).count();
    assert_eq!(sim.partition().range(0), 0..80 - from_first);
    assert_eq!(
        sim.partition().range(1),
        80 - from_first..150 - removed.len()
    );
    assert_eq!(before.len() - removed.len(), sim.live_count());
    sim.partition().validate(sim.live_count()).unwrap();
}

#[test]
fn removal_with_no_match_changes_nothing() {
    let mut sim = two_phase_sim(64, [32, 32]);
    let before = sim.positions();

    assert!(sim.remove_near([50.0, 50.0, 50.0], 0.5).is_empty());
    assert_eq!(sim.positions(), before);
    assert_eq!(sim.live_count(), 64);
}

#[test]
fn partition_survives_mixed_edits_and_ticks() {
    let mut sim = two_phase_sim(300, [100, 100]);
    let dt = sim.settings().time_step;

    for round in 0..10 {
        sim.spawn_at([0.2 * round as f32 - 1.0, 1.0, 0.0], 7);
        sim.tick(dt);
        sim.remove_near([0.0, -1.5, 0.0], 0.4);
        sim.tick(dt);
        assert!(sim.live_count() <= sim.capacity());
        sim.partition().validate(sim.live_count()).unwrap();
    }
}

#[test]
fn spawning_into_an_empty_store_fills_up_to_capacity() {
    let partition = PartitionTable::single(phase("water"), 0);
    let mut sim = FluidSimulation::cpu(10, domain(), SolverSettings::default(), partition).unwrap();

    assert_eq!(sim.spawn_at([0.0, 0.0, 0.0], 5), 5);
    assert_eq!(sim.live_count(), 5);
    assert_eq!(sim.spawn_at([0.0, 0.0, 0.0], 10), 5);
    assert_eq!(sim.live_count(), 10);
    assert_eq!(sim.spawn_at([0.0, 0.0, 0.0], 1), 0);
}

#[test]
fn non_positive_radius_removes_nothing() {
    let mut sim = two_phase_sim(100, [50, 50]);

    assert!(sim.remove_near([0.0, 0.0, 0.0], -1.5).is_empty());
    assert!(sim.remove_near([0.0, 0.0, 0.0], 0.0).is_empty());
    assert!(sim.remove_near([0.0, 0.0, 0.0], f32::NAN).is_empty());
    assert_eq!(sim.live_count(), 100);
    sim.partition().validate(100).unwrap();
}
