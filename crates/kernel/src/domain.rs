//! Simulation domain, global solver settings, and the host-side boundary clamp.

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::Vec3;

/// Spawn volume and clamp box of a simulation.
///
/// The clamp box is `limit_size` wide and centered at `spawn_centre`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationDomain {
    /// Center of both the spawn volume and the clamp box.
    pub spawn_centre: Vec3,
    /// Extent of the initial random fill.
    pub spawn_size: Vec3,
    /// Extent of the clamp box.
    pub limit_size: Vec3,
}

impl SimulationDomain {
    /// Minimum and maximum corners of the clamp box.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for c in 0..3 {
            let half = 0.5 * self.limit_size[c];
            min[c] = self.spawn_centre[c] - half;
            max[c] = self.spawn_centre[c] + half;
        }
        (min, max)
    }

    /// `true` if the spawn volume lies inside the clamp box.
    pub fn contains_spawn_volume(&self) -> bool {
        (0..3).all(|c| self.spawn_size[c] <= self.limit_size[c])
    }

    /// Reject negative or non-finite extents.
    pub fn validate(&self) -> Result<(), KernelError> {
        let mut values = self
            .spawn_centre
            .iter()
            .chain(self.spawn_size.iter())
            .chain(self.limit_size.iter());
        if values.any(|v| !v.is_finite()) {
            return Err(KernelError::InvalidDomain(
                "domain vectors must be finite".to_string(),
            ));
        }
        if self.limit_size.iter().any(|&v| v < 0.0) {
            return Err(KernelError::InvalidDomain(format!(
                "limit_size components must be non-negative, got {:?}",
                self.limit_size
            )));
        }
        if self.spawn_size.iter().any(|&v| v < 0.0) {
            return Err(KernelError::InvalidDomain(format!(
                "spawn_size components must be non-negative, got {:?}",
                self.spawn_size
            )));
        }
        if !self.contains_spawn_volume() {
            tracing::warn!(
                spawn_size = ?self.spawn_size,
                limit_size = ?self.limit_size,
                "spawn volume extends past the clamp box"
            );
        }
        Ok(())
    }

    /// Clamp one position component-wise into the clamp box.
    #[inline]
    pub fn clamp(&self, p: Vec3) -> Vec3 {
        let (min, max) = self.bounds();
        [
            p[0].clamp(min[0], max[0]),
            p[1].clamp(min[1], max[1]),
            p[2].clamp(min[2], max[2]),
        ]
    }

    /// Host-side boundary clamp applied to positions read back after a step.
    ///
    /// Runs independently of the in-kernel wall reflection so that positions
    /// handed to the renderer never leave the box, even with floating-point
    /// slack in the kernel.
    pub fn clamp_positions(&self, positions: &mut [Vec3]) {
        let (min, max) = self.bounds();
        for p in positions.iter_mut() {
            for c in 0..3 {
                p[c] = p[c].clamp(min[c], max[c]);
            }
        }
    }
}

fn default_smoothing_radius() -> f32 {
    0.35
}

fn default_collision_damping() -> f32 {
    0.95
}

fn default_time_step() -> f32 {
    1.0 / 120.0
}

fn default_seed() -> u32 {
    0x5eed
}

fn default_spawn_jitter() -> f32 {
    0.1
}

fn default_planar_jitter() -> bool {
    true
}

/// Solver parameters shared by every phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Neighbor search radius; phases may override it for their own passes.
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: f32,
    /// Fraction of normal velocity kept after a wall bounce, in `[0, 1]`.
    #[serde(default = "default_collision_damping")]
    pub collision_damping: f32,
    /// Fixed step used by session runners.
    #[serde(default = "default_time_step")]
    pub time_step: f32,
    /// Seed for the spawn-fill hash and the spawn jitter generator.
    #[serde(default = "default_seed")]
    pub seed: u32,
    /// Radius of the random offset given to each particle spawned at a point.
    #[serde(default = "default_spawn_jitter")]
    pub spawn_jitter: f32,
    /// Keep spawn jitter in the xy plane (disk instead of ball).
    #[serde(default = "default_planar_jitter")]
    pub planar_jitter: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            smoothing_radius: default_smoothing_radius(),
            collision_damping: default_collision_damping(),
            time_step: default_time_step(),
            seed: default_seed(),
            spawn_jitter: default_spawn_jitter(),
            planar_jitter: default_planar_jitter(),
        }
    }
}

impl SolverSettings {
    /// Reject settings that would make the kernels divide by zero or explode.
    pub fn validate(&self) -> Result<(), KernelError> {
        if !(self.smoothing_radius > 0.0 && self.smoothing_radius.is_finite()) {
            return Err(KernelError::InvalidSettings(format!(
                "smoothing_radius must be positive, got {}",
                self.smoothing_radius
            )));
        }
        if !(0.0..=1.0).contains(&self.collision_damping) {
            return Err(KernelError::InvalidSettings(format!(
                "collision_damping must be in [0, 1], got {}",
                self.collision_damping
            )));
        }
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(KernelError::InvalidSettings(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if !(self.spawn_jitter >= 0.0 && self.spawn_jitter.is_finite()) {
            return Err(KernelError::InvalidSettings(format!(
                "spawn_jitter must be non-negative, got {}",
                self.spawn_jitter
            )));
        }
        Ok(())
    }
}
