//! Scene configuration parsing and validation

use std::fs;
use std::path::{Path, PathBuf};

use droplet_kernel::{
    FluidPhase, InteractableScene, KernelError, PartitionTable, SimulationDomain, SolverSettings,
    Vec3, MAX_PHASES,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a scene or building a session from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The scene file could not be read.
    #[error("failed to read scene file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The scene file is not valid JSON for a [`SceneConfig`].
    #[error("failed to parse scene JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The scene parsed but its values are inconsistent.
    #[error("invalid scene: {0}")]
    Invalid(String),
    /// The kernel rejected the scene at initialization.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Which compute backend a session runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GPU when one is available, CPU otherwise.
    #[default]
    Auto,
    /// Reference CPU backend.
    Cpu,
    /// wgpu compute backend; fails if no adapter is found.
    Gpu,
}

/// How the initial population is divided between phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationConfig {
    /// Explicit particle count per phase.
    Counts(Vec<usize>),
    /// A total split by per-phase proportion; the last phase takes the
    /// remainder.
    Proportions {
        /// Total initial particle count
        initial_count: usize,
        /// Proportion of the total per phase, each in `[0, 1]`
        split: Vec<f32>,
    },
}

impl PopulationConfig {
    /// Number of particles seeded at startup.
    pub fn initial_count(&self) -> usize {
        match self {
            PopulationConfig::Counts(counts) => counts.iter().sum(),
            PopulationConfig::Proportions { initial_count, .. } => *initial_count,
        }
    }
}

fn default_brush_size() -> u32 {
    4
}

fn default_brush_min() -> u32 {
    4
}

fn default_brush_max() -> u32 {
    10
}

fn default_cooldown() -> f32 {
    0.1
}

fn default_planar() -> bool {
    true
}

/// Brush used to spawn and remove particles interactively
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushConfig {
    /// Starting brush size; spawn amount per stroke, and ten times the
    /// removal radius
    #[serde(default = "default_brush_size")]
    pub size: u32,
    /// Smallest brush size
    #[serde(default = "default_brush_min")]
    pub min: u32,
    /// Largest brush size
    #[serde(default = "default_brush_max")]
    pub max: u32,
    /// Minimum time between two brush strokes (seconds)
    #[serde(default = "default_cooldown")]
    pub cooldown: f32,
    /// Snap brush positions onto the spawn centre's z plane
    #[serde(default = "default_planar")]
    pub planar: bool,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            size: default_brush_size(),
            min: default_brush_min(),
            max: default_brush_max(),
            cooldown: default_cooldown(),
            planar: default_planar(),
        }
    }
}

/// A user action applied to a session at the start of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Spawn one brush-full of particles at a point.
    Spawn {
        /// World position of the stroke
        position: Vec3,
    },
    /// Remove particles within the brush radius of a point.
    Remove {
        /// World position of the stroke
        position: Vec3,
    },
    /// Change the brush size (clamped to the configured range).
    SetBrush {
        /// Requested size
        size: u32,
    },
    /// Pause if running, resume if paused.
    TogglePause,
    /// Re-seed the live population from the spawn volume.
    Reset,
}

/// A command replayed by the headless runner at a given frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Frame the command is queued before
    pub frame: u64,
    /// The command itself
    #[serde(flatten)]
    pub command: SessionCommand,
}

/// Complete description of a droplet scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Human-readable scene name
    pub name: String,
    /// Compute backend
    #[serde(default)]
    pub backend: Backend,
    /// Fixed number of particle slots
    pub capacity: usize,
    /// Spawn volume and wall box
    pub domain: SimulationDomain,
    /// Global solver settings
    #[serde(default)]
    pub settings: SolverSettings,
    /// Fluid phases in partition order
    pub phases: Vec<FluidPhase>,
    /// Initial division of particles between phases
    pub population: PopulationConfig,
    /// Interactive brush
    #[serde(default)]
    pub brush: BrushConfig,
    /// Solid bodies the fluid reacts to
    #[serde(default)]
    pub interactables: InteractableScene,
    /// Commands replayed by the headless runner
    #[serde(default)]
    pub script: Vec<ScriptedCommand>,
}

impl SceneConfig {
    /// Load a scene from a JSON file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        tracing::debug!(path = %path.display(), name = %config.name, "scene loaded");
        Ok(config)
    }

    /// Parse a scene from JSON text and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".to_string()));
        }
        if self.phases.is_empty() {
            return Err(ConfigError::Invalid("at least one phase is required".to_string()));
        }
        if self.phases.len() > MAX_PHASES {
            return Err(ConfigError::Invalid(format!(
                "{} phases declared, at most {MAX_PHASES} are supported",
                self.phases.len()
            )));
        }

        let per_phase = match &self.population {
            PopulationConfig::Counts(counts) => counts.len(),
            PopulationConfig::Proportions { split, .. } => split.len(),
        };
        if per_phase != self.phases.len() {
            return Err(ConfigError::Invalid(format!(
                "population lists {per_phase} entries for {} phases",
                self.phases.len()
            )));
        }

        let initial = self.population.initial_count();
        if initial > self.capacity {
            return Err(ConfigError::Invalid(format!(
                "initial population {initial} exceeds capacity {}",
                self.capacity
            )));
        }

        // Check brush
        if self.brush.min == 0 || self.brush.min > self.brush.max {
            return Err(ConfigError::Invalid(format!(
                "brush range {}..={} is empty or starts at zero",
                self.brush.min, self.brush.max
            )));
        }
        if !(self.brush.cooldown >= 0.0 && self.brush.cooldown.is_finite()) {
            return Err(ConfigError::Invalid(
                "brush cooldown must be a non-negative number of seconds".to_string(),
            ));
        }

        self.domain.validate()?;
        self.settings.validate()?;
        Ok(())
    }

    /// Phase partition of the initial population.
    pub fn partition(&self) -> Result<PartitionTable, ConfigError> {
        let table = match &self.population {
            PopulationConfig::Counts(counts) => {
                PartitionTable::from_counts(self.phases.clone(), counts)?
            }
            PopulationConfig::Proportions {
                initial_count,
                split,
            } => PartitionTable::from_proportions(self.phases.clone(), split, *initial_count)?,
        };
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXTURE: &str = r#"{
        "name": "mixture",
        "backend": "cpu",
        "capacity": 200,
        "domain": {
            "spawn_centre": [0.0, 0.0, 0.0],
            "spawn_size": [2.0, 2.0, 2.0],
            "limit_size": [4.0, 4.0, 4.0]
        },
        "phases": [
            {"name": "blue", "target_density": 10.0, "pressure_multiplier": 20.0,
             "near_pressure_multiplier": 2.0, "viscosity_multiplier": 0.1},
            {"name": "red", "target_density": 15.0, "pressure_multiplier": 10.0,
             "near_pressure_multiplier": 1.0, "viscosity_multiplier": 0.3}
        ],
        "population": {"proportions": {"initial_count": 200, "split": [0.3, 0.7]}},
        "script": [
            {"frame": 3, "action": "spawn", "position": [0.0, 1.0, 0.0]},
            {"frame": 5, "action": "toggle_pause"}
        ]
    }"#;

    #[test]
    fn test_mixture_parses_with_defaults() {
        let config = SceneConfig::from_json(MIXTURE).unwrap();
        assert_eq!(config.backend, Backend::Cpu);
        assert_eq!(config.brush, BrushConfig::default());
        assert_eq!(config.settings, SolverSettings::default());
        assert_eq!(config.phases[0].max_speed, 10.0);
        assert_eq!(config.population.initial_count(), 200);
        assert_eq!(
            config.script[0].command,
            SessionCommand::Spawn {
                position: [0.0, 1.0, 0.0]
            }
        );
        assert_eq!(config.script[1].command, SessionCommand::TogglePause);
    }

    #[test]
    fn test_proportions_become_exact_partition() {
        let config = SceneConfig::from_json(MIXTURE).unwrap();
        let partition = config.partition().unwrap();
        assert_eq!(partition.range(0), 0..60);
        assert_eq!(partition.range(1), 60..200);
    }

    #[test]
    fn test_validation_initial_count_exceeds_capacity() {
        let mut config = SceneConfig::from_json(MIXTURE).unwrap();
        config.capacity = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_population_shape() {
        let mut config = SceneConfig::from_json(MIXTURE).unwrap();
        config.population = PopulationConfig::Counts(vec![10]);
        assert!(config.validate().is_err());

        config.population = PopulationConfig::Counts(vec![10, 20]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_brush_range() {
        let mut config = SceneConfig::from_json(MIXTURE).unwrap();
        config.brush.min = 8;
        config.brush.max = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_json_is_a_parse_error() {
        assert!(matches!(
            SceneConfig::from_json("{\"name\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        assert!(matches!(
            SceneConfig::load("does/not/exist.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
