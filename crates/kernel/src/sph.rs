//! Smoothing kernels and the SPH operators behind each pipeline stage.
//!
//! The kernels are the spiky family used for density and pressure plus Poly6
//! for viscosity. All three value kernels integrate to 1 over the ball of
//! radius `r`. The operators here are the host reference; the WGSL program
//! mirrors them line for line.

use std::f32::consts::PI;
use std::ops::Range;

use crate::neighbor::NeighborGrid;
use crate::obstacle::{obstacle_force, ObstacleBuffer};
use crate::particle::ParticleArrays;
use crate::pipeline::StageUniforms;
use crate::Vec3;

/// Pairs closer than this get no pressure direction and are skipped.
pub const MIN_PAIR_DISTANCE: f32 = 1.0e-5;

// ---------------------------------------------------------------------------
// Smoothing kernels
// ---------------------------------------------------------------------------

#[inline]
fn pow5(r: f32) -> f32 {
    let r2 = r * r;
    r2 * r2 * r
}

#[inline]
fn pow6(r: f32) -> f32 {
    let r3 = r * r * r;
    r3 * r3
}

/// Density kernel: `15 / (2 pi r^5) * (r - d)^2` for `d < r`.
#[inline]
pub fn spiky_pow2(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    v * v * 15.0 / (2.0 * PI * pow5(radius))
}

/// Near-density kernel: `15 / (pi r^6) * (r - d)^3` for `d < r`.
#[inline]
pub fn spiky_pow3(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    v * v * v * 15.0 / (PI * pow6(radius))
}

/// Derivative of [`spiky_pow2`] with respect to distance.
#[inline]
pub fn d_spiky_pow2(dst: f32, radius: f32) -> f32 {
    if dst > radius {
        return 0.0;
    }
    let v = radius - dst;
    -v * 15.0 / (PI * pow5(radius))
}

/// Derivative of [`spiky_pow3`] with respect to distance.
#[inline]
pub fn d_spiky_pow3(dst: f32, radius: f32) -> f32 {
    if dst > radius {
        return 0.0;
    }
    let v = radius - dst;
    -v * v * 45.0 / (PI * pow6(radius))
}

/// Viscosity kernel: `315 / (64 pi r^9) * (r^2 - d^2)^3` for `d < r`.
#[inline]
pub fn poly6(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius * radius - dst * dst;
    let r3 = radius * radius * radius;
    v * v * v * 315.0 / (64.0 * PI * r3 * r3 * r3)
}

// ---------------------------------------------------------------------------
// Spawn hash
// ---------------------------------------------------------------------------

/// PCG-style integer hash. Wrapping arithmetic so the WGSL `u32` version
/// produces the same bits.
#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Uniform value in `[0, 1)` from the top 24 bits of the hash.
#[inline]
pub fn hash_unit(input: u32) -> f32 {
    (pcg_hash(input) >> 8) as f32 / 16_777_216.0
}

/// Spawn-fill position of particle `index`: uniform inside `size` around
/// `centre`.
pub fn spawn_position(seed: u32, index: u32, centre: Vec3, size: Vec3) -> Vec3 {
    let base = seed.wrapping_mul(7919).wrapping_add(index.wrapping_mul(3));
    let mut p = [0.0; 3];
    for c in 0..3 {
        p[c] = centre[c] + (hash_unit(base.wrapping_add(c as u32)) - 0.5) * size[c];
    }
    p
}

// ---------------------------------------------------------------------------
// Stage operators
// ---------------------------------------------------------------------------

/// Seed particles in `range` inside the spawn volume with zero velocity.
pub fn spawn_fill(particles: &mut ParticleArrays, u: &StageUniforms, range: Range<usize>) {
    for i in range {
        let p = spawn_position(u.seed, i as u32, u.spawn_centre, u.spawn_size);
        particles.set_position(i, p);
        particles.set_velocity(i, [0.0; 3]);
        particles.density[i] = 0.0;
        particles.near_density[i] = 0.0;
    }
}

/// Density and near-density sums for particles in `range`.
///
/// Every indexed particle within the radius contributes, the particle itself
/// included.
pub fn compute_density(
    particles: &mut ParticleArrays,
    grid: &NeighborGrid,
    u: &StageUniforms,
    range: Range<usize>,
) {
    let r = u.smoothing_radius;
    let self_density = spiky_pow2(0.0, r);
    let self_near = spiky_pow3(0.0, r);

    for i in range {
        let mut density = self_density;
        let mut near = self_near;
        grid.for_each_neighbor(i, &particles.x, &particles.y, &particles.z, r, |_, d| {
            density += spiky_pow2(d, r);
            near += spiky_pow3(d, r);
        });
        particles.density[i] = density;
        particles.near_density[i] = near;
    }
}

/// Pressure and near-pressure acceleration for particles in `range`.
///
/// Pressure of both sides of a pair is evaluated with the bound phase
/// constants, and the pair shares the average. Pairs above the target
/// density push apart.
pub fn apply_pressure(
    particles: &mut ParticleArrays,
    grid: &NeighborGrid,
    u: &StageUniforms,
    range: Range<usize>,
) {
    let r = u.smoothing_radius;
    let pressure = |density: f32| (density - u.target_density) * u.pressure_multiplier;
    let near_pressure = |near: f32| near * u.near_pressure_multiplier;

    for i in range {
        let density = particles.density[i];
        if density <= 0.0 {
            continue;
        }
        let pos = particles.position(i);
        let p_i = pressure(density);
        let near_i = near_pressure(particles.near_density[i]);

        let mut force = [0.0f32; 3];
        grid.for_each_neighbor(i, &particles.x, &particles.y, &particles.z, r, |j, d| {
            if d < MIN_PAIR_DISTANCE {
                return;
            }
            let density_j = particles.density[j];
            let near_j = particles.near_density[j];
            if density_j <= 0.0 || near_j <= 0.0 {
                return;
            }
            let shared = 0.5 * (p_i + pressure(density_j));
            let shared_near = 0.5 * (near_i + near_pressure(near_j));
            let scale = d_spiky_pow2(d, r) * shared / density_j
                + d_spiky_pow3(d, r) * shared_near / near_j;
            let dir = [
                (particles.x[j] - pos[0]) / d,
                (particles.y[j] - pos[1]) / d,
                (particles.z[j] - pos[2]) / d,
            ];
            for c in 0..3 {
                force[c] += dir[c] * scale;
            }
        });

        let dt_over_rho = u.delta_time / density;
        particles.vx[i] += force[0] * dt_over_rho;
        particles.vy[i] += force[1] * dt_over_rho;
        particles.vz[i] += force[2] * dt_over_rho;
    }
}

/// Relative-velocity damping for particles in `range`.
///
/// Reads neighbor velocities from `snapshot`, taken when the dispatch began,
/// so the result does not depend on visiting order.
pub fn apply_viscosity(
    particles: &mut ParticleArrays,
    snapshot: &[Vec3],
    grid: &NeighborGrid,
    u: &StageUniforms,
    range: Range<usize>,
) {
    let r = u.smoothing_radius;
    let scale = u.viscosity_multiplier * u.delta_time;

    for i in range {
        let v_i = snapshot[i];
        let mut dv = [0.0f32; 3];
        grid.for_each_neighbor(i, &particles.x, &particles.y, &particles.z, r, |j, d| {
            let w = poly6(d, r);
            for c in 0..3 {
                dv[c] += (snapshot[j][c] - v_i[c]) * w;
            }
        });
        particles.vx[i] += dv[0] * scale;
        particles.vy[i] += dv[1] * scale;
        particles.vz[i] += dv[2] * scale;
    }
}

/// Gravity, obstacle coupling, limits, advection and wall reflection.
///
/// Each particle takes its motion limits from the phase table, so a single
/// pass over the live range honors every phase.
pub fn integrate(
    particles: &mut ParticleArrays,
    obstacles: &ObstacleBuffer,
    u: &StageUniforms,
    range: Range<usize>,
) {
    let dt = u.delta_time;
    let margin = u.smoothing_radius;
    let (lo, hi) = u.clamp_box();

    for i in range {
        let motion = u.phases.lookup(i as u32);
        let mut pos = particles.position(i);
        let mut vel = particles.velocity(i);

        let mut force = [0.0, -motion.gravity, 0.0];
        for obstacle in obstacles.as_slice() {
            let f = obstacle_force(obstacle, pos, vel, margin);
            for c in 0..3 {
                force[c] += f[c];
            }
        }
        clamp_length(&mut force, motion.max_force);

        for c in 0..3 {
            vel[c] += force[c] * dt;
        }
        clamp_length(&mut vel, motion.max_speed);

        for c in 0..3 {
            pos[c] += vel[c] * dt;
            if pos[c] < lo[c] {
                pos[c] = lo[c];
                vel[c] = vel[c].abs() * u.collision_damping;
            } else if pos[c] > hi[c] {
                pos[c] = hi[c];
                vel[c] = -vel[c].abs() * u.collision_damping;
            }
        }

        particles.set_position(i, pos);
        particles.set_velocity(i, vel);
    }
}

#[inline]
fn clamp_length(v: &mut Vec3, max: f32) {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > max {
        let s = max / len;
        for c in v.iter_mut() {
            *c *= s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Integral of a radial kernel over the ball, midpoint rule.
    fn ball_integral(kernel: fn(f32, f32) -> f32, radius: f32) -> f64 {
        let steps = 20_000;
        let dr = radius as f64 / steps as f64;
        (0..steps)
            .map(|k| {
                let d = (k as f64 + 0.5) * dr;
                4.0 * std::f64::consts::PI * d * d * kernel(d as f32, radius) as f64 * dr
            })
            .sum()
    }

    #[test]
    fn value_kernels_are_normalized() {
        let kernels: [(&str, fn(f32, f32) -> f32); 3] = [
            ("spiky_pow2", spiky_pow2),
            ("spiky_pow3", spiky_pow3),
            ("poly6", poly6),
        ];
        for radius in [0.2_f32, 0.35, 1.0] {
            for (name, kernel) in kernels {
                let total = ball_integral(kernel, radius);
                assert!((total - 1.0).abs() < 1e-3, "{name} at r={radius}: {total}");
            }
        }
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let r = 0.5;
        let h = 1e-3;
        for d in [0.05_f32, 0.2, 0.4] {
            let fd2 = (spiky_pow2(d + h, r) - spiky_pow2(d - h, r)) / (2.0 * h);
            let fd3 = (spiky_pow3(d + h, r) - spiky_pow3(d - h, r)) / (2.0 * h);
            assert!((fd2 - d_spiky_pow2(d, r)).abs() / fd2.abs() < 1e-2);
            assert!((fd3 - d_spiky_pow3(d, r)).abs() / fd3.abs() < 1e-2);
        }
    }

    #[test]
    fn kernels_vanish_outside_support() {
        assert_eq!(spiky_pow2(1.0, 1.0), 0.0);
        assert_eq!(spiky_pow3(1.5, 1.0), 0.0);
        assert_eq!(poly6(1.0, 1.0), 0.0);
        assert_eq!(d_spiky_pow2(2.0, 1.0), 0.0);
        assert!(d_spiky_pow2(0.5, 1.0) < 0.0);
    }

    #[test]
    fn hash_is_deterministic_and_spread() {
        assert_eq!(pcg_hash(12345), pcg_hash(12345));
        assert_ne!(pcg_hash(0), pcg_hash(1));
        let mean: f32 = (0..4096).map(hash_unit).sum::<f32>() / 4096.0;
        assert!((mean - 0.5).abs() < 0.05);
        assert!((0..4096).map(hash_unit).all(|v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn spawn_positions_stay_in_volume() {
        let centre = [1.0, -2.0, 0.0];
        let size = [2.0, 1.0, 0.0];
        for i in 0..500 {
            let p = spawn_position(7, i, centre, size);
            assert!((p[0] - 1.0).abs() <= 1.0);
            assert!((p[1] + 2.0).abs() <= 0.5);
            assert_eq!(p[2], 0.0);
        }
    }

    #[test]
    fn length_clamp() {
        let mut v = [3.0, 4.0, 0.0];
        clamp_length(&mut v, 1.0);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        let mut w = [0.1, 0.0, 0.0];
        clamp_length(&mut w, 1.0);
        assert_eq!(w, [0.1, 0.0, 0.0]);
    }
}
