//! Coupling between the fluid and external solid bodies.
//!
//! Host solids are pulled once per tick through [`ObstacleSource`] and packed
//! into an [`ObstacleBuffer`] that the integration stage reads.

use serde::{Deserialize, Serialize};

use crate::Vec3;

/// Maximum number of obstacles the integration stage sees in one tick.
pub const MAX_INTERACTABLES: usize = 10;

/// Push-out stiffness per unit of penetration depth.
pub const OBSTACLE_STIFFNESS: f32 = 200.0;

/// Rate at which a particle inside an obstacle's reach is dragged toward the
/// obstacle's velocity.
pub const OBSTACLE_VELOCITY_COUPLING: f32 = 5.0;

/// Box-shaped solid as seen by the fluid during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Obstacle {
    /// Box center.
    pub center: Vec3,
    /// Full box extent.
    pub size: Vec3,
    /// Linear velocity; zero for bodies without one.
    pub velocity: Vec3,
}

/// Anything that can list the solids the fluid should react to.
pub trait ObstacleSource {
    /// Obstacles active for the coming tick.
    fn list_obstacles(&self) -> Vec<Obstacle>;
}

impl ObstacleSource for () {
    fn list_obstacles(&self) -> Vec<Obstacle> {
        Vec::new()
    }
}

impl ObstacleSource for Vec<Obstacle> {
    fn list_obstacles(&self) -> Vec<Obstacle> {
        self.clone()
    }
}

fn default_collision_enabled() -> bool {
    true
}

/// A host solid with collision bounds and an optional rigid body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interactable {
    /// Center of the collision bounds.
    pub bounds_center: Vec3,
    /// Extent of the collision bounds.
    pub bounds_size: Vec3,
    /// Added to the bounds extent before it reaches the fluid.
    #[serde(default)]
    pub size_offset: Vec3,
    /// Disabled interactables are invisible to the fluid.
    #[serde(default = "default_collision_enabled")]
    pub collision_enabled: bool,
    /// Rigid-body velocity, if the solid has a body.
    #[serde(default)]
    pub velocity: Option<Vec3>,
}

impl Interactable {
    /// Obstacle this interactable presents, or `None` when collision is off.
    pub fn as_obstacle(&self) -> Option<Obstacle> {
        if !self.collision_enabled {
            return None;
        }
        Some(Obstacle {
            center: self.bounds_center,
            size: [
                self.bounds_size[0] + self.size_offset[0],
                self.bounds_size[1] + self.size_offset[1],
                self.bounds_size[2] + self.size_offset[2],
            ],
            velocity: self.velocity.unwrap_or([0.0; 3]),
        })
    }
}

/// The set of host solids registered with a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractableScene {
    /// Registered solids, in registration order.
    pub interactables: Vec<Interactable>,
}

impl InteractableScene {
    /// Empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a solid.
    pub fn push(&mut self, interactable: Interactable) {
        self.interactables.push(interactable);
    }
}

impl ObstacleSource for InteractableScene {
    fn list_obstacles(&self) -> Vec<Obstacle> {
        self.interactables
            .iter()
            .filter_map(Interactable::as_obstacle)
            .collect()
    }
}

/// Per-tick snapshot of at most [`MAX_INTERACTABLES`] obstacles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObstacleBuffer {
    obstacles: Vec<Obstacle>,
}

impl ObstacleBuffer {
    /// Pull the current obstacles from `source`, dropping any past the cap.
    pub fn gather(source: &dyn ObstacleSource) -> Self {
        Self::from_obstacles(source.list_obstacles())
    }

    /// Pack `obstacles`, dropping any past the cap.
    pub fn from_obstacles(mut obstacles: Vec<Obstacle>) -> Self {
        if obstacles.len() > MAX_INTERACTABLES {
            tracing::warn!(
                listed = obstacles.len(),
                kept = MAX_INTERACTABLES,
                "too many interactables, extra obstacles ignored this tick"
            );
            obstacles.truncate(MAX_INTERACTABLES);
        }
        Self { obstacles }
    }

    /// Number of obstacles bound with the integration stage.
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    /// `true` if there is nothing to collide with.
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    /// Packed obstacles.
    pub fn as_slice(&self) -> &[Obstacle] {
        &self.obstacles
    }
}

/// Force exerted on a particle at `pos` moving with `vel` by one obstacle.
///
/// The obstacle's reach is its box grown by `margin` on every side. Inside
/// it the particle is pushed out through the nearest face and dragged toward
/// the obstacle velocity.
pub fn obstacle_force(obstacle: &Obstacle, pos: Vec3, vel: Vec3, margin: f32) -> Vec3 {
    let mut local = [0.0; 3];
    let mut depth = [0.0; 3];
    for c in 0..3 {
        local[c] = pos[c] - obstacle.center[c];
        depth[c] = obstacle.size[c] * 0.5 + margin - local[c].abs();
        if depth[c] <= 0.0 {
            return [0.0; 3];
        }
    }

    let axis = if depth[0] <= depth[1] && depth[0] <= depth[2] {
        0
    } else if depth[1] <= depth[2] {
        1
    } else {
        2
    };

    let mut force = [0.0; 3];
    for c in 0..3 {
        force[c] = (obstacle.velocity[c] - vel[c]) * OBSTACLE_VELOCITY_COUPLING;
    }
    let side = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    force[axis] += side * depth[axis] * OBSTACLE_STIFFNESS;
    force
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crate_box() -> Interactable {
        Interactable {
            bounds_center: [0.0, 0.0, 0.0],
            bounds_size: [1.0, 1.0, 1.0],
            size_offset: [0.5, 0.5, 0.5],
            collision_enabled: true,
            velocity: None,
        }
    }

    #[test]
    fn disabled_interactables_are_skipped() {
        let mut scene = InteractableScene::new();
        scene.push(crate_box());
        scene.push(Interactable {
            collision_enabled: false,
            ..crate_box()
        });
        let obstacles = scene.list_obstacles();
        assert_eq!(obstacles.len(), 1);
        assert_eq!(obstacles[0].size, [1.5, 1.5, 1.5]);
        assert_eq!(obstacles[0].velocity, [0.0; 3]);
    }

    #[test]
    fn buffer_caps_obstacle_count() {
        let many = vec![Obstacle::default(); MAX_INTERACTABLES + 3];
        let buffer = ObstacleBuffer::gather(&many);
        assert_eq!(buffer.len(), MAX_INTERACTABLES);
        assert!(ObstacleBuffer::gather(&()).is_empty());
    }

    #[test]
    fn force_pushes_through_nearest_face() {
        let obstacle = Obstacle {
            center: [0.0; 3],
            size: [2.0, 2.0, 2.0],
            velocity: [0.0; 3],
        };
        // Just inside the +x face (reach is 1.1 with margin 0.1).
        let f = obstacle_force(&obstacle, [1.0, 0.0, 0.0], [0.0; 3], 0.1);
        assert!(f[0] > 0.0);
        assert_eq!(f[1], 0.0);
        assert_eq!(f[2], 0.0);

        let f = obstacle_force(&obstacle, [0.0, -0.9, 0.0], [0.0; 3], 0.1);
        assert!(f[1] < 0.0);
    }

    #[test]
    fn force_is_zero_outside_reach() {
        let obstacle = Obstacle {
            center: [0.0; 3],
            size: [2.0, 2.0, 2.0],
            velocity: [1.0, 0.0, 0.0],
        };
        assert_eq!(obstacle_force(&obstacle, [1.2, 0.0, 0.0], [0.0; 3], 0.1), [0.0; 3]);
    }

    #[test]
    fn moving_obstacle_drags_particles() {
        let obstacle = Obstacle {
            center: [0.0; 3],
            size: [2.0, 2.0, 2.0],
            velocity: [0.0, 0.0, 3.0],
        };
        let f = obstacle_force(&obstacle, [0.9, 0.0, 0.0], [0.0; 3], 0.0);
        assert!((f[2] - 3.0 * OBSTACLE_VELOCITY_COUPLING).abs() < 1e-6);
    }
}
