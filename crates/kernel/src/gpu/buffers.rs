//! GPU buffer management for droplet particle data.
//!
//! Creates the fixed-capacity storage buffers, the two uniform blocks, and
//! handles host->device prefix writes and blocking device->host readback.

use wgpu::util::DeviceExt;

use crate::obstacle::{ObstacleBuffer, MAX_INTERACTABLES};
use crate::phase::MAX_PHASES;
use crate::pipeline::StageUniforms;
use crate::Vec3;

/// Uniform block layout. Must match `Params` in `droplets.wgsl` exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuParams {
    /// Spawn and wall-box centre, w unused.
    pub spawn_centre: [f32; 4],
    /// Spawn volume extent, w unused.
    pub spawn_size: [f32; 4],
    /// Wall box extent, w unused.
    pub limit_size: [f32; 4],
    /// First particle of the dispatch.
    pub start: u32,
    /// One past the last particle of the dispatch.
    pub end: u32,
    /// Live particle count.
    pub num_droplets: u32,
    /// Valid entries in the obstacle block.
    pub num_interactables: u32,
    /// Step length.
    pub delta_time: f32,
    /// Neighbor radius of the bound phase.
    pub smoothing_radius: f32,
    /// Rest density of the bound phase.
    pub target_density: f32,
    /// Pressure stiffness of the bound phase.
    pub pressure_multiplier: f32,
    /// Near-pressure stiffness of the bound phase.
    pub near_pressure_multiplier: f32,
    /// Viscosity strength of the bound phase.
    pub viscosity_multiplier: f32,
    /// Wall restitution.
    pub collision_damping: f32,
    /// Spawn-fill hash seed.
    pub seed: u32,
    /// Exclusive end index of each phase.
    pub phase_ends: [u32; 4],
    /// Number of phases in use.
    pub phase_count: u32,
    /// Alignment padding.
    pub _pad: [u32; 3],
    /// Per phase: gravity, max_speed, max_force, unused.
    pub phase_motion: [[f32; 4]; 4],
}

fn vec4(v: Vec3) -> [f32; 4] {
    [v[0], v[1], v[2], 0.0]
}

impl GpuParams {
    /// Pack `uniforms` for a dispatch covering `[start, end)`.
    pub fn new(uniforms: &StageUniforms, start: u32, end: u32, num_interactables: u32) -> Self {
        let mut phase_motion = [[0.0; 4]; MAX_PHASES];
        for (slot, m) in phase_motion.iter_mut().zip(uniforms.phases.motion.iter()) {
            *slot = [m.gravity, m.max_speed, m.max_force, 0.0];
        }
        Self {
            spawn_centre: vec4(uniforms.spawn_centre),
            spawn_size: vec4(uniforms.spawn_size),
            limit_size: vec4(uniforms.limit_size),
            start,
            end,
            num_droplets: uniforms.num_droplets,
            num_interactables,
            delta_time: uniforms.delta_time,
            smoothing_radius: uniforms.smoothing_radius,
            target_density: uniforms.target_density,
            pressure_multiplier: uniforms.pressure_multiplier,
            near_pressure_multiplier: uniforms.near_pressure_multiplier,
            viscosity_multiplier: uniforms.viscosity_multiplier,
            collision_damping: uniforms.collision_damping,
            seed: uniforms.seed,
            phase_ends: uniforms.phases.ends,
            phase_count: uniforms.phases.count,
            _pad: [0; 3],
            phase_motion,
        }
    }
}

/// One obstacle in the uniform obstacle block.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuObstacle {
    /// Box centre, w unused.
    pub center: [f32; 4],
    /// Box extent including the offset, w unused.
    pub size: [f32; 4],
    /// Box velocity, w unused.
    pub velocity: [f32; 4],
}

/// Pad `obstacles` to the fixed-length block the shader declares.
pub fn pack_obstacles(obstacles: &ObstacleBuffer) -> Vec<GpuObstacle> {
    let mut packed = vec![GpuObstacle::default(); MAX_INTERACTABLES];
    for (slot, o) in packed.iter_mut().zip(obstacles.as_slice()) {
        *slot = GpuObstacle {
            center: vec4(o.center),
            size: vec4(o.size),
            velocity: vec4(o.velocity),
        };
    }
    packed
}

/// All GPU buffers of one droplet store.
pub struct DropletBuffers {
    // Uniform blocks
    /// [`GpuParams`] block.
    pub params: wgpu::Buffer,
    /// [`GpuObstacle`] block.
    pub obstacles: wgpu::Buffer,

    // Particle buffers, sized to capacity
    /// Positions as vec4.
    pub positions: wgpu::Buffer,
    /// Velocities as vec4.
    pub velocities: wgpu::Buffer,
    /// Density per particle.
    pub densities: wgpu::Buffer,
    /// Near density per particle.
    pub near_densities: wgpu::Buffer,
    /// Velocities copied before the viscosity pass.
    pub velocity_snapshot: wgpu::Buffer,

    // Staging buffers for readback
    /// Readback for vec4 buffers.
    pub staging_vec4: wgpu::Buffer,
    /// Readback for scalar buffers.
    pub staging_scalar: wgpu::Buffer,

    /// Number of particle slots
    pub capacity: usize,
}

const VEC4_BYTES: u64 = 16;
const SCALAR_BYTES: u64 = 4;

fn create_storage_buf(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Create a staging (MAP_READ) buffer for readback.
fn create_staging_buf(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl DropletBuffers {
    /// Allocate zeroed buffers for `capacity` particles.
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let n = capacity as u64;
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("droplet_params"),
            contents: bytemuck::bytes_of(&GpuParams::new(&StageUniforms::default(), 0, 0, 0)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let obstacles = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("droplet_obstacles"),
            contents: bytemuck::cast_slice(&pack_obstacles(&ObstacleBuffer::default())),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            params,
            obstacles,
            positions: create_storage_buf(device, "positions", n * VEC4_BYTES),
            velocities: create_storage_buf(device, "velocities", n * VEC4_BYTES),
            densities: create_storage_buf(device, "densities", n * SCALAR_BYTES),
            near_densities: create_storage_buf(device, "near_densities", n * SCALAR_BYTES),
            velocity_snapshot: create_storage_buf(device, "velocity_snapshot", n * VEC4_BYTES),
            staging_vec4: create_staging_buf(device, "staging_vec4", n * VEC4_BYTES),
            staging_scalar: create_staging_buf(device, "staging_scalar", n * SCALAR_BYTES),
            capacity,
        }
    }

    /// Write a dispatch's uniform block.
    pub fn update_params(&self, queue: &wgpu::Queue, params: &GpuParams) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));
    }

    /// Write the obstacle block.
    pub fn update_obstacles(&self, queue: &wgpu::Queue, obstacles: &ObstacleBuffer) {
        queue.write_buffer(&self.obstacles, 0, bytemuck::cast_slice(&pack_obstacles(obstacles)));
    }

    /// Overwrite the first `data.len()` entries of a vec4 buffer.
    pub fn write_vec3_prefix(&self, queue: &wgpu::Queue, target: &wgpu::Buffer, data: &[Vec3]) {
        let count = data.len().min(self.capacity);
        if count == 0 {
            return;
        }
        let padded: Vec<[f32; 4]> = data[..count].iter().map(|&v| vec4(v)).collect();
        queue.write_buffer(target, 0, bytemuck::cast_slice(&padded));
    }

    /// Copy `count` vec4 entries from `source` into the snapshot buffer.
    pub fn encode_snapshot(&self, encoder: &mut wgpu::CommandEncoder, count: usize) {
        let count = count.min(self.capacity) as u64;
        if count == 0 {
            return;
        }
        encoder.copy_buffer_to_buffer(
            &self.velocities,
            0,
            &self.velocity_snapshot,
            0,
            count * VEC4_BYTES,
        );
    }

    /// Blocking readback of the first `count` entries of a vec4 buffer.
    pub fn read_vec3_prefix(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::Buffer,
        count: usize,
    ) -> Vec<Vec3> {
        let count = count.min(self.capacity);
        if count == 0 {
            return Vec::new();
        }
        let bytes = count as u64 * VEC4_BYTES;
        copy_to_staging(device, queue, source, &self.staging_vec4, bytes);
        let raw: Vec<[f32; 4]> = read_mapped(device, &self.staging_vec4, bytes);
        raw.into_iter().map(|v| [v[0], v[1], v[2]]).collect()
    }

    /// Blocking readback of the first `count` entries of a scalar buffer.
    pub fn read_f32_prefix(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::Buffer,
        count: usize,
    ) -> Vec<f32> {
        let count = count.min(self.capacity);
        if count == 0 {
            return Vec::new();
        }
        let bytes = count as u64 * SCALAR_BYTES;
        copy_to_staging(device, queue, source, &self.staging_scalar, bytes);
        read_mapped(device, &self.staging_scalar, bytes)
    }

    /// Free every buffer.
    pub fn destroy(&self) {
        for buffer in [
            &self.params,
            &self.obstacles,
            &self.positions,
            &self.velocities,
            &self.densities,
            &self.near_densities,
            &self.velocity_snapshot,
            &self.staging_vec4,
            &self.staging_scalar,
        ] {
            buffer.destroy();
        }
    }
}

fn copy_to_staging(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    staging: &wgpu::Buffer,
    bytes: u64,
) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback"),
    });
    encoder.copy_buffer_to_buffer(source, 0, staging, 0, bytes);
    queue.submit(std::iter::once(encoder.finish()));
}

/// Block on mapping the first `bytes` of a staging buffer and copy them out.
fn read_mapped<T: bytemuck::Pod>(device: &wgpu::Device, buffer: &wgpu::Buffer, bytes: u64) -> Vec<T> {
    let slice = buffer.slice(..bytes);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .expect("map_async callback dropped without reporting")
        .expect("failed to map staging buffer");

    let data = slice.get_mapped_range();
    let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    buffer.unmap();
    result
}
