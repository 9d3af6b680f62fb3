//! Particle storage: host-side struct-of-arrays and the owned device store.

use crate::error::KernelError;
use crate::{SimulationKernel, Vec3};

/// Struct-of-arrays particle storage sized to a fixed capacity.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle. Only the first `live` entries are meaningful; the owner tracks
/// that count.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    // ---- Positions ----
    /// X positions
    pub x: Vec<f32>,
    /// Y positions
    pub y: Vec<f32>,
    /// Z positions
    pub z: Vec<f32>,

    // ---- Velocities ----
    /// X velocities
    pub vx: Vec<f32>,
    /// Y velocities
    pub vy: Vec<f32>,
    /// Z velocities
    pub vz: Vec<f32>,

    // ---- Scalar fields ----
    /// Kernel-weighted neighbor count
    pub density: Vec<f32>,
    /// Sharper neighbor count that resists clustering
    pub near_density: Vec<f32>,
}

impl ParticleArrays {
    /// Zero-filled arrays for `capacity` particles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: vec![0.0; capacity],
            y: vec![0.0; capacity],
            z: vec![0.0; capacity],
            vx: vec![0.0; capacity],
            vy: vec![0.0; capacity],
            vz: vec![0.0; capacity],
            density: vec![0.0; capacity],
            near_density: vec![0.0; capacity],
        }
    }

    /// Number of slots (the capacity, not the live count).
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// `true` once the storage has been released.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Position of particle `i`.
    #[inline]
    pub fn position(&self, i: usize) -> Vec3 {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Velocity of particle `i`.
    #[inline]
    pub fn velocity(&self, i: usize) -> Vec3 {
        [self.vx[i], self.vy[i], self.vz[i]]
    }

    /// Overwrite the position of particle `i`.
    #[inline]
    pub fn set_position(&mut self, i: usize, p: Vec3) {
        self.x[i] = p[0];
        self.y[i] = p[1];
        self.z[i] = p[2];
    }

    /// Overwrite the velocity of particle `i`.
    #[inline]
    pub fn set_velocity(&mut self, i: usize, v: Vec3) {
        self.vx[i] = v[0];
        self.vy[i] = v[1];
        self.vz[i] = v[2];
    }

    /// Free every array. Further access panics on index.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Fixed-capacity particle store owned by one simulation.
///
/// The backing buffers live in the kernel; the store only tracks how many of
/// them are live. Storage is released exactly once, either by
/// [`release`](Self::release) or on drop.
pub struct ParticleStore {
    kernel: Box<dyn SimulationKernel + Send>,
    capacity: usize,
    live_count: usize,
    released: bool,
}

impl ParticleStore {
    /// Take ownership of a kernel whose buffers were allocated for
    /// `kernel.capacity()` particles.
    pub fn new(kernel: Box<dyn SimulationKernel + Send>) -> Result<Self, KernelError> {
        let capacity = kernel.capacity();
        if capacity == 0 {
            return Err(KernelError::InvalidCapacity(capacity));
        }
        tracing::info!(
            backend = kernel.backend_name(),
            capacity,
            "particle store allocated"
        );
        Ok(Self {
            kernel,
            capacity,
            live_count: 0,
            released: false,
        })
    }

    /// Fixed number of particle slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live particles.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Free slots left before spawning is capped.
    pub fn remaining(&self) -> usize {
        self.capacity - self.live_count
    }

    /// `true` once the buffers have been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn set_live_count(&mut self, live_count: usize) {
        debug_assert!(live_count <= self.capacity);
        self.live_count = live_count;
    }

    /// Backend that owns the buffers.
    pub fn kernel(&self) -> &dyn SimulationKernel {
        self.kernel.as_ref()
    }

    /// Mutable access to the backend, for binding and dispatching.
    pub fn kernel_mut(&mut self) -> &mut dyn SimulationKernel {
        self.kernel.as_mut()
    }

    /// Blocking readback of the live positions.
    pub fn read_positions(&self) -> Vec<Vec3> {
        if self.released {
            return Vec::new();
        }
        self.kernel.read_positions(self.live_count)
    }

    /// Blocking readback of the live velocities.
    pub fn read_velocities(&self) -> Vec<Vec3> {
        if self.released {
            return Vec::new();
        }
        self.kernel.read_velocities(self.live_count)
    }

    /// Blocking readback of `[density, near_density]` for the live particles.
    pub fn read_densities(&self) -> Vec<[f32; 2]> {
        if self.released {
            return Vec::new();
        }
        self.kernel.read_densities(self.live_count)
    }

    /// Replace the live prefix with `positions`/`velocities` and set the live
    /// count to their length.
    pub fn write_prefix(&mut self, positions: &[Vec3], velocities: &[Vec3]) {
        debug_assert_eq!(positions.len(), velocities.len());
        debug_assert!(positions.len() <= self.capacity);
        if self.released {
            return;
        }
        self.kernel.write_positions(positions);
        self.kernel.write_velocities(velocities);
        self.live_count = positions.len();
    }

    /// Free the backend buffers. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.kernel.release();
        self.released = true;
        self.live_count = 0;
        tracing::info!(backend = self.kernel.backend_name(), "particle store released");
    }
}

impl Drop for ParticleStore {
    fn drop(&mut self) {
        self.release();
    }
}
