//! Fluid phases and the partition of the particle store into phase ranges.
//!
//! Each phase owns one contiguous half-open range of particle indices. The
//! ranges are ordered by declaration and always cover `[0, live_count)`
//! exactly. Population changes keep that true: spawned particles join the
//! last phase, and a removal shrinks the owning phase and shifts later ones
//! down (compaction preserves relative order, so no particle changes phase).

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Maximum number of phases the integration phase table can carry.
pub const MAX_PHASES: usize = 4;

fn default_max_speed() -> f32 {
    10.0
}

fn default_max_force() -> f32 {
    50.0
}

fn default_gravity() -> f32 {
    9.8
}

/// Physical constants of one fluid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidPhase {
    /// Display name, used in logs and statistics.
    pub name: String,
    /// Rest density the pressure pass drives toward.
    pub target_density: f32,
    /// Stiffness of the density-deviation pressure.
    pub pressure_multiplier: f32,
    /// Stiffness of the near-density anti-clustering pressure.
    pub near_pressure_multiplier: f32,
    /// Strength of the relative-velocity damping.
    pub viscosity_multiplier: f32,
    /// Speed limit applied during integration.
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    /// Limit on the per-particle integration force.
    #[serde(default = "default_max_force")]
    pub max_force: f32,
    /// Downward gravitational acceleration (positive pulls toward -y).
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// Overrides the global smoothing radius for this phase's passes.
    #[serde(default)]
    pub smoothing_radius: Option<f32>,
}

impl FluidPhase {
    /// Smoothing radius used by this phase's density/pressure/viscosity passes.
    pub fn radius_or(&self, global: f32) -> f32 {
        self.smoothing_radius.unwrap_or(global)
    }

    /// Integration-time parameters of this phase.
    pub fn motion(&self) -> PhaseMotion {
        PhaseMotion {
            gravity: self.gravity,
            max_speed: self.max_speed,
            max_force: self.max_force,
        }
    }

    fn validate(&self) -> Result<(), KernelError> {
        let finite = [
            self.target_density,
            self.pressure_multiplier,
            self.near_pressure_multiplier,
            self.viscosity_multiplier,
            self.max_speed,
            self.max_force,
            self.gravity,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(KernelError::InvalidSettings(format!(
                "phase `{}` has non-finite parameters",
                self.name
            )));
        }
        if self.max_speed < 0.0 || self.max_force < 0.0 {
            return Err(KernelError::InvalidSettings(format!(
                "phase `{}` has a negative speed or force limit",
                self.name
            )));
        }
        if let Some(r) = self.smoothing_radius {
            if !(r > 0.0 && r.is_finite()) {
                return Err(KernelError::InvalidSettings(format!(
                    "phase `{}` smoothing_radius must be positive, got {r}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Parameters the integration pass needs per phase.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseMotion {
    /// Downward gravitational acceleration.
    pub gravity: f32,
    /// Speed limit.
    pub max_speed: f32,
    /// Force limit.
    pub max_force: f32,
}

/// Phase lookup table bound for the single whole-range integration dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseMotionTable {
    /// Exclusive end index of each phase range.
    pub ends: [u32; MAX_PHASES],
    /// Integration parameters of each phase.
    pub motion: [PhaseMotion; MAX_PHASES],
    /// Number of populated entries.
    pub count: u32,
}

impl PhaseMotionTable {
    /// Motion parameters for particle `index`. Indices past the last end
    /// fall back to the last phase.
    pub fn lookup(&self, index: u32) -> PhaseMotion {
        let count = self.count as usize;
        if count == 0 {
            return PhaseMotion::default();
        }
        self.ends[..count]
            .iter()
            .position(|&end| index < end)
            .map(|k| self.motion[k])
            .unwrap_or(self.motion[count - 1])
    }
}

/// Assignment of contiguous particle ranges to fluid phases.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTable {
    phases: Vec<FluidPhase>,
    /// Exclusive end of each phase's range; the start is the previous end.
    ends: Vec<usize>,
}

impl PartitionTable {
    /// Build a table from explicit per-phase particle counts.
    pub fn from_counts(phases: Vec<FluidPhase>, counts: &[usize]) -> Result<Self, KernelError> {
        Self::check_phases(&phases)?;
        if counts.len() != phases.len() {
            return Err(KernelError::InvalidPartition(format!(
                "{} phases but {} counts",
                phases.len(),
                counts.len()
            )));
        }
        let mut ends = Vec::with_capacity(counts.len());
        let mut running = 0usize;
        for &count in counts {
            running += count;
            ends.push(running);
        }
        Ok(Self { phases, ends })
    }

    /// Split `live_count` particles between phases by proportion.
    ///
    /// Each phase but the last gets `round(proportion * live_count)`
    /// particles; the last phase takes whatever remains so the ranges cover
    /// the live range exactly.
    pub fn from_proportions(
        phases: Vec<FluidPhase>,
        proportions: &[f32],
        live_count: usize,
    ) -> Result<Self, KernelError> {
        if proportions.len() != phases.len() {
            return Err(KernelError::InvalidPartition(format!(
                "{} phases but {} proportions",
                phases.len(),
                proportions.len()
            )));
        }
        if proportions.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(KernelError::InvalidPartition(
                "proportions must lie in [0, 1]".to_string(),
            ));
        }
        let mut counts = Vec::with_capacity(proportions.len());
        let mut assigned = 0usize;
        for (k, &p) in proportions.iter().enumerate() {
            let count = if k + 1 == proportions.len() {
                live_count - assigned
            } else {
                ((p * live_count as f32).round() as usize).min(live_count - assigned)
            };
            assigned += count;
            counts.push(count);
        }
        Self::from_counts(phases, &counts)
    }

    /// A single phase spanning the whole live range.
    pub fn single(phase: FluidPhase, live_count: usize) -> Self {
        Self {
            phases: vec![phase],
            ends: vec![live_count],
        }
    }

    fn check_phases(phases: &[FluidPhase]) -> Result<(), KernelError> {
        if phases.is_empty() {
            return Err(KernelError::InvalidPartition(
                "at least one phase is required".to_string(),
            ));
        }
        if phases.len() > MAX_PHASES {
            return Err(KernelError::TooManyPhases {
                count: phases.len(),
                max: MAX_PHASES,
            });
        }
        phases.iter().try_for_each(FluidPhase::validate)
    }

    /// Check that the ranges cover `[0, live_count)` exactly.
    pub fn validate(&self, live_count: usize) -> Result<(), KernelError> {
        Self::check_phases(&self.phases)?;
        if self.ends.windows(2).any(|w| w[0] > w[1]) {
            return Err(KernelError::InvalidPartition(
                "phase ranges are out of order".to_string(),
            ));
        }
        if self.live_count() != live_count {
            return Err(KernelError::InvalidPartition(format!(
                "phase ranges cover {} particles, live count is {live_count}",
                self.live_count()
            )));
        }
        Ok(())
    }

    /// Number of particles covered by all ranges.
    pub fn live_count(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Number of phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// `true` if no phase is declared.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Declared phases in order.
    pub fn phases(&self) -> &[FluidPhase] {
        &self.phases
    }

    /// Index range of phase `k`.
    pub fn range(&self, k: usize) -> Range<usize> {
        let start = if k == 0 { 0 } else { self.ends[k - 1] };
        start..self.ends[k]
    }

    /// Phases paired with their index ranges, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&FluidPhase, Range<usize>)> + '_ {
        self.phases
            .iter()
            .enumerate()
            .map(move |(k, phase)| (phase, self.range(k)))
    }

    /// Phase owning particle `index`, if it is live.
    pub fn phase_of(&self, index: usize) -> Option<usize> {
        self.ends.iter().position(|&end| index < end)
    }

    /// Largest smoothing radius any phase dispatches with.
    pub fn max_radius(&self, global: f32) -> f32 {
        self.phases
            .iter()
            .map(|p| p.radius_or(global))
            .fold(global, f32::max)
    }

    /// Append `count` particles to the last phase.
    pub fn grow_last(&mut self, count: usize) {
        if let Some(end) = self.ends.last_mut() {
            *end += count;
        }
    }

    /// Account for the removal of live particle `index`.
    pub fn remove_index(&mut self, index: usize) {
        let Some(owner) = self.phase_of(index) else {
            return;
        };
        for end in &mut self.ends[owner..] {
            *end -= 1;
        }
    }

    /// Integration phase table for the current ranges.
    pub fn motion_table(&self) -> PhaseMotionTable {
        let mut table = PhaseMotionTable {
            count: self.phases.len() as u32,
            ..PhaseMotionTable::default()
        };
        for (k, phase) in self.phases.iter().enumerate() {
            table.ends[k] = self.ends[k] as u32;
            table.motion[k] = phase.motion();
        }
        table
    }
}
