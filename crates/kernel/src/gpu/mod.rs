//! GPU (Metal/Vulkan via wgpu) implementation of the droplet simulation kernel.
//!
//! `GpuKernel` implements `SimulationKernel` with one WGSL compute program
//! that exports an entry point per [`Stage`]. Every pipeline is created once,
//! at allocation, and dispatches index them through a [`KernelTable`].
//!
//! # Bind group layout
//! A single group serves every stage:
//!
//! | binding | resource                              |
//! |---------|---------------------------------------|
//! | 0       | `Params` (uniform, rewritten per dispatch) |
//! | 1       | positions (`vec4<f32>`)               |
//! | 2       | velocities (`vec4<f32>`)              |
//! | 3       | densities                             |
//! | 4       | near densities                        |
//! | 5       | velocity snapshot for viscosity       |
//! | 6       | obstacle block (uniform)              |
//!
//! Particle data lives on the GPU; readback only happens on request and
//! blocks until every earlier submission has completed.

pub mod buffers;

use std::borrow::Cow;
use std::ops::Range;

use buffers::{DropletBuffers, GpuParams};

use crate::error::KernelError;
use crate::obstacle::ObstacleBuffer;
use crate::pipeline::StageUniforms;
use crate::stage::{thread_groups, KernelTable, Stage};
use crate::{SimulationKernel, Vec3};

/// WGSL source of a droplet compute program.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    /// Label attached to the shader module.
    pub label: String,
    /// WGSL text.
    pub source: Cow<'static, str>,
}

impl ShaderProgram {
    /// The bundled droplet program.
    pub fn builtin() -> Self {
        Self {
            label: "droplets".to_string(),
            source: Cow::Borrowed(include_str!("shaders/droplets.wgsl")),
        }
    }

    /// A program from caller-supplied WGSL.
    pub fn from_wgsl(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: Cow::Owned(source.into()),
        }
    }
}

/// Check whether a GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .is_some()
}

/// GPU droplet kernel using wgpu compute shaders.
pub struct GpuKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: KernelTable<wgpu::ComputePipeline>,
    bind_group: wgpu::BindGroup,
    bufs: DropletBuffers,

    // Bound state
    uniforms: StageUniforms,
    num_interactables: u32,

    released: bool,
}

impl GpuKernel {
    /// Allocate buffers for `capacity` particles and build one pipeline per
    /// stage of `program`.
    ///
    /// Capacity and program are checked before any device is requested.
    /// A shader that fails validation is reported as [`KernelError::Gpu`];
    /// a program lacking a stage's entry point as
    /// [`KernelError::MissingEntryPoint`].
    pub fn allocate(capacity: usize, program: Option<ShaderProgram>) -> Result<Self, KernelError> {
        if capacity == 0 {
            return Err(KernelError::InvalidCapacity(capacity));
        }
        let program = program.ok_or(KernelError::UnassignedProgram)?;

        // --- Device initialization ---
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| KernelError::Gpu("no suitable GPU adapter found".into()))?;

        tracing::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("droplet_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| KernelError::Gpu(format!("failed to create device: {e}")))?;

        // --- Shader ---
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(program.source.clone()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(KernelError::Gpu(format!(
                "shader `{}` failed validation: {err}",
                program.label
            )));
        }

        // --- Buffers and bindings ---
        let bufs = DropletBuffers::new(&device, capacity);

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("droplets_bgl"),
            entries: &[
                bgl_uniform(0),    // params
                bgl_storage_rw(1), // positions
                bgl_storage_rw(2), // velocities
                bgl_storage_rw(3), // densities
                bgl_storage_rw(4), // near_densities
                bgl_storage_rw(5), // velocity_snapshot
                bgl_uniform(6),    // obstacles
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("droplets_bg"),
            layout: &bgl,
            entries: &[
                bg_entry(0, &bufs.params),
                bg_entry(1, &bufs.positions),
                bg_entry(2, &bufs.velocities),
                bg_entry(3, &bufs.densities),
                bg_entry(4, &bufs.near_densities),
                bg_entry(5, &bufs.velocity_snapshot),
                bg_entry(6, &bufs.obstacles),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("droplets_pl"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        // --- Compute pipelines ---
        let pipelines = KernelTable::resolve(|stage| {
            let entry = stage.entry_point();
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            });
            match pollster::block_on(device.pop_error_scope()) {
                Some(err) => {
                    tracing::error!(entry, "pipeline creation failed: {err}");
                    Err(KernelError::MissingEntryPoint { stage, entry })
                }
                None => Ok(pipeline),
            }
        })?;

        tracing::debug!(capacity, "GPU kernel allocated");

        Ok(Self {
            device,
            queue,
            pipelines,
            bind_group,
            bufs,
            uniforms: StageUniforms::default(),
            num_interactables: 0,
            released: false,
        })
    }

    /// [`allocate`](Self::allocate) with the bundled program.
    pub fn new(capacity: usize) -> Result<Self, KernelError> {
        Self::allocate(capacity, Some(ShaderProgram::builtin()))
    }
}

impl SimulationKernel for GpuKernel {
    fn backend_name(&self) -> &'static str {
        "gpu"
    }

    fn capacity(&self) -> usize {
        self.bufs.capacity
    }

    fn bind_uniforms(&mut self, uniforms: &StageUniforms) {
        self.uniforms = *uniforms;
    }

    fn bind_obstacles(&mut self, obstacles: &ObstacleBuffer) {
        if self.released {
            return;
        }
        self.bufs.update_obstacles(&self.queue, obstacles);
        self.num_interactables = obstacles.len() as u32;
    }

    fn dispatch(&mut self, stage: Stage, range: Range<usize>) {
        let end = range.end.min(self.bufs.capacity);
        if self.released || range.start >= end {
            return;
        }
        let params = GpuParams::new(
            &self.uniforms,
            range.start as u32,
            end as u32,
            self.num_interactables,
        );
        self.bufs.update_params(&self.queue, &params);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(stage.entry_point()),
        });
        if stage == Stage::Viscosity {
            self.bufs
                .encode_snapshot(&mut encoder, self.uniforms.num_droplets as usize);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(stage.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines[stage]);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(thread_groups(end - range.start), 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn read_positions(&self, count: usize) -> Vec<Vec3> {
        if self.released {
            return Vec::new();
        }
        self.bufs
            .read_vec3_prefix(&self.device, &self.queue, &self.bufs.positions, count)
    }

    fn read_velocities(&self, count: usize) -> Vec<Vec3> {
        if self.released {
            return Vec::new();
        }
        self.bufs
            .read_vec3_prefix(&self.device, &self.queue, &self.bufs.velocities, count)
    }

    fn read_densities(&self, count: usize) -> Vec<[f32; 2]> {
        if self.released {
            return Vec::new();
        }
        let density = self
            .bufs
            .read_f32_prefix(&self.device, &self.queue, &self.bufs.densities, count);
        let near = self
            .bufs
            .read_f32_prefix(&self.device, &self.queue, &self.bufs.near_densities, count);
        density.into_iter().zip(near).map(|(d, n)| [d, n]).collect()
    }

    fn write_positions(&mut self, data: &[Vec3]) {
        if !self.released {
            self.bufs
                .write_vec3_prefix(&self.queue, &self.bufs.positions, data);
        }
    }

    fn write_velocities(&mut self, data: &[Vec3]) {
        if !self.released {
            self.bufs
                .write_vec3_prefix(&self.queue, &self.bufs.velocities, data);
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.bufs.destroy();
        self.released = true;
        tracing::debug!("GPU kernel buffers destroyed");
    }
}

fn bg_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
