//! Pipeline stage identifiers and the resolved kernel handle table.
//!
//! Every backend resolves one handle per [`Stage`] exactly once, at
//! construction. Dispatches index the table by stage, so a tick never looks a
//! kernel up by name.

use std::ops::Index;

use crate::error::KernelError;

/// Number of work items per thread group. Matches `@workgroup_size(16)` in the
/// WGSL program.
pub const WORKGROUP_WIDTH: u32 = 16;

/// One compute kernel of the droplet program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Seeds positions uniformly inside the spawn volume, zero velocity.
    SpawnFill,
    /// Density and near-density neighbor sums.
    Density,
    /// Pressure and near-pressure forces applied to velocity.
    Pressure,
    /// Relative-velocity damping between neighbors.
    Viscosity,
    /// Gravity, obstacle repulsion, speed/force limits, advection, walls.
    Integrate,
}

impl Stage {
    /// Number of stages.
    pub const COUNT: usize = 5;

    /// All stages in table order.
    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::SpawnFill,
        Stage::Density,
        Stage::Pressure,
        Stage::Viscosity,
        Stage::Integrate,
    ];

    /// The stages run by one simulation step, in execution order.
    pub const STEP: [Stage; 4] = [
        Stage::Density,
        Stage::Pressure,
        Stage::Viscosity,
        Stage::Integrate,
    ];

    /// Entry point name of this stage in a compute program.
    pub const fn entry_point(self) -> &'static str {
        match self {
            Stage::SpawnFill => "generate_spawn_data",
            Stage::Density => "calc_density",
            Stage::Pressure => "calc_pressure",
            Stage::Viscosity => "calc_viscosity",
            Stage::Integrate => "update_droplet_position",
        }
    }

    /// Position of this stage in [`Stage::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Number of thread groups needed to cover `len` work items.
pub fn thread_groups(len: usize) -> u32 {
    (len as u32).div_ceil(WORKGROUP_WIDTH)
}

/// Kernel handles resolved for every [`Stage`].
///
/// Construction fails if any stage cannot be resolved, so holding a table
/// proves the whole pipeline is dispatchable.
pub struct KernelTable<T> {
    handles: Vec<T>,
}

impl<T> KernelTable<T> {
    /// Resolve one handle per stage with `lookup`, failing on the first stage
    /// that cannot be resolved.
    pub fn resolve<F>(mut lookup: F) -> Result<Self, KernelError>
    where
        F: FnMut(Stage) -> Result<T, KernelError>,
    {
        let mut handles = Vec::with_capacity(Stage::COUNT);
        for stage in Stage::ALL {
            handles.push(lookup(stage)?);
        }
        Ok(Self { handles })
    }

    /// Resolve handles from a list of named entries, as exported by a program.
    pub fn from_entries<I>(entries: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = (&'static str, T)>,
    {
        let mut named: Vec<(&'static str, T)> = entries.into_iter().collect();
        Self::resolve(|stage| {
            let entry = stage.entry_point();
            let pos = named
                .iter()
                .position(|(name, _)| *name == entry)
                .ok_or(KernelError::MissingEntryPoint { stage, entry })?;
            Ok(named.swap_remove(pos).1)
        })
    }
}

impl<T> Index<Stage> for KernelTable<T> {
    type Output = T;

    fn index(&self, stage: Stage) -> &T {
        &self.handles[stage.index()]
    }
}
