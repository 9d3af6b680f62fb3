//! Spawning and removal of particles between ticks.
//!
//! Both operations stage the live prefix on the host, edit it, and write it
//! back in one transfer. Removal compacts by shifting later particles down,
//! so relative order (and with it phase membership) is preserved.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::phase::PartitionTable;
use crate::particle::ParticleStore;
use crate::Vec3;

/// Host-side population editor with its own jitter generator.
pub struct PopulationManager {
    rng: StdRng,
    jitter_radius: f32,
    planar: bool,
}

impl PopulationManager {
    /// Manager whose spawn offsets lie in a ball (or, if `planar`, an xy
    /// disk) of `jitter_radius`.
    pub fn new(seed: u64, jitter_radius: f32, planar: bool) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            jitter_radius,
            planar,
        }
    }

    /// Radius of the spawn jitter.
    pub fn jitter_radius(&self) -> f32 {
        self.jitter_radius
    }

    /// Uniform offset inside the jitter ball or disk.
    fn jitter(&mut self) -> Vec3 {
        if self.jitter_radius <= 0.0 {
            return [0.0; 3];
        }
        loop {
            let x: f32 = self.rng.gen_range(-1.0..=1.0);
            let y: f32 = self.rng.gen_range(-1.0..=1.0);
            let z: f32 = if self.planar {
                0.0
            } else {
                self.rng.gen_range(-1.0..=1.0)
            };
            if x * x + y * y + z * z <= 1.0 {
                let r = self.jitter_radius;
                return [x * r, y * r, z * r];
            }
        }
    }

    /// Add up to `count` particles around `position` with zero velocity.
    ///
    /// New particles join the last phase. Spawning stops silently at
    /// capacity; the number actually added is returned.
    pub fn spawn(
        &mut self,
        store: &mut ParticleStore,
        partition: &mut PartitionTable,
        position: Vec3,
        count: usize,
    ) -> usize {
        let added = count.min(store.remaining());
        if added == 0 {
            if count > 0 {
                tracing::debug!(requested = count, "spawn ignored, store is full");
            }
            return 0;
        }

        let mut positions = store.read_positions();
        let mut velocities = store.read_velocities();
        for _ in 0..added {
            let offset = self.jitter();
            positions.push([
                position[0] + offset[0],
                position[1] + offset[1],
                position[2] + offset[2],
            ]);
            velocities.push([0.0; 3]);
        }
        store.write_prefix(&positions, &velocities);
        partition.grow_last(added);

        tracing::debug!(
            added,
            requested = count,
            live = store.live_count(),
            "particles spawned"
        );
        added
    }

    /// Remove every particle strictly closer than `radius` to `position`.
    /// A radius that is not positive matches nothing.
    ///
    /// Returns the removed indices in descending order, the order they were
    /// taken out in, so a caller mirroring particles by index can replay it.
    pub fn remove(
        &mut self,
        store: &mut ParticleStore,
        partition: &mut PartitionTable,
        position: Vec3,
        radius: f32,
    ) -> Vec<usize> {
        if store.live_count() == 0 || radius.is_nan() || radius <= 0.0 {
            return Vec::new();
        }
        let mut positions = store.read_positions();
        let mut velocities = store.read_velocities();

        let radius_sq = radius * radius;
        let mut removed: Vec<usize> = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let dx = p[0] - position[0];
                let dy = p[1] - position[1];
                let dz = p[2] - position[2];
                dx * dx + dy * dy + dz * dz < radius_sq
            })
            .map(|(i, _)| i)
            .collect();
        if removed.is_empty() {
            return removed;
        }
        removed.reverse();

        for &i in &removed {
            positions.remove(i);
            velocities.remove(i);
            partition.remove_index(i);
        }
        store.write_prefix(&positions, &velocities);

        tracing::debug!(
            removed = removed.len(),
            live = store.live_count(),
            "particles removed"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_jitter_stays_in_disk() {
        let mut manager = PopulationManager::new(1, 0.1, true);
        for _ in 0..200 {
            let j = manager.jitter();
            assert_eq!(j[2], 0.0);
            assert!(j[0] * j[0] + j[1] * j[1] <= 0.1 * 0.1 + 1e-6);
        }
    }

    #[test]
    fn ball_jitter_uses_all_axes() {
        let mut manager = PopulationManager::new(2, 0.5, false);
        let offsets: Vec<Vec3> = (0..200).map(|_| manager.jitter()).collect();
        assert!(offsets.iter().any(|j| j[2] != 0.0));
        assert!(offsets
            .iter()
            .all(|j| j[0] * j[0] + j[1] * j[1] + j[2] * j[2] <= 0.25 + 1e-6));
    }

    #[test]
    fn zero_radius_means_no_jitter() {
        let mut manager = PopulationManager::new(3, 0.0, false);
        assert_eq!(manager.jitter(), [0.0; 3]);
    }
}
