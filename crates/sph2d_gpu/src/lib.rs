//! wgpu compute backend for the sph2d solver.
//!
//! Implements [`sph2d::ComputeBackend`] over the packed buffer contract:
//! each stage call is a blocking round trip of upload, one compute pass,
//! and staging-buffer readback. The three entry points of the embedded
//! WGSL shader reproduce the host backend's semantics exactly, including
//! the five-slot cell cap and the boundary reflection inside the
//! integration stage.

use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::sync::mpsc;
use wgpu::util::DeviceExt;

use sph2d::{BackendError, ComputeBackend, KernelCoefficients, PackedCell, PackedParticle, SimConfig};

/// Headless device/queue pair for compute dispatch.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Acquire an adapter and device, blocking until done.
    pub fn new() -> Result<Self, BackendError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::Unavailable("no suitable GPU adapter".into()))?;

        log::info!("using GPU: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sph2d device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| BackendError::Unavailable(format!("device request failed: {e}")))?;

        Ok(Self { device, queue })
    }
}

/// Uniform parameter block; layout mirrors `Params` in the shader.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuParams {
    particle_count: u32,
    width: i32,
    height: i32,
    smoothing_length: f32,
    h2: f32,
    particle_mass: f32,
    pressure_constant: f32,
    resting_density: f32,
    viscosity_constant: f32,
    gravity: f32,
    damping_factor: f32,
    poly6: f32,
    spiky: f32,
    visc_laplacian: f32,
    dt: f32,
    _pad: f32,
}

impl GpuParams {
    fn new(config: &SimConfig, particle_count: u32) -> Self {
        let coeffs = KernelCoefficients::new(config.smoothing_length);
        Self {
            particle_count,
            width: config.width as i32,
            height: config.height as i32,
            smoothing_length: config.smoothing_length,
            h2: coeffs.h_squared,
            particle_mass: config.particle_mass,
            pressure_constant: config.pressure_constant,
            resting_density: config.resting_density,
            viscosity_constant: config.viscosity_constant,
            gravity: config.gravity,
            damping_factor: config.damping_factor,
            poly6: coeffs.poly6,
            spiky: coeffs.spiky,
            visc_laplacian: coeffs.viscosity,
            dt: 0.0,
            _pad: 0.0,
        }
    }
}

/// GPU implementation of the compute backend contract.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    params: GpuParams,
    params_buffer: wgpu::Buffer,
    particle_buffer: wgpu::Buffer,
    cell_buffer: wgpu::Buffer,
    staging: wgpu::Buffer,

    density_pipeline: wgpu::ComputePipeline,
    force_pipeline: wgpu::ComputePipeline,
    integrate_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,

    particle_capacity: usize,
    cell_count: usize,
}

impl WgpuBackend {
    /// Acquire a fresh device and build a backend sized for
    /// `particle_count` particles.
    pub fn create(config: &SimConfig, particle_count: usize) -> Result<Self, BackendError> {
        let context = GpuContext::new()?;
        Ok(Self::new(context, config, particle_count))
    }

    /// Build a backend on an existing device.
    pub fn new(context: GpuContext, config: &SimConfig, particle_count: usize) -> Self {
        let GpuContext { device, queue } = context;
        let cell_count = config.width * config.height;
        let params = GpuParams::new(config, particle_count as u32);

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sph2d params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let particle_bytes = (particle_count * std::mem::size_of::<PackedParticle>()) as u64;
        let particle_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sph2d particles"),
            size: particle_bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let cell_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sph2d cells"),
            size: (cell_count * std::mem::size_of::<PackedCell>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sph2d staging"),
            size: particle_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sph2d bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sph2d bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: cell_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sph2d pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let shader_source = include_str!("shaders/sph2d.wgsl");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sph2d solver"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(shader_source)),
        });

        let create_pipeline = |label: &str, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let density_pipeline = create_pipeline("sph2d density", "update_density");
        let force_pipeline = create_pipeline("sph2d force", "update_force");
        let integrate_pipeline = create_pipeline("sph2d integrate", "update_position");

        Self {
            device,
            queue,
            params,
            params_buffer,
            particle_buffer,
            cell_buffer,
            staging,
            density_pipeline,
            force_pipeline,
            integrate_pipeline,
            bind_group,
            particle_capacity: particle_count,
            cell_count,
        }
    }

    fn check_particles(&self, actual: usize) -> Result<(), BackendError> {
        if actual != self.particle_capacity {
            return Err(BackendError::BufferSizeMismatch {
                expected: self.particle_capacity,
                actual,
            });
        }
        Ok(())
    }

    fn check_cells(&self, actual: usize) -> Result<(), BackendError> {
        if actual != self.cell_count {
            return Err(BackendError::BufferSizeMismatch {
                expected: self.cell_count,
                actual,
            });
        }
        Ok(())
    }

    /// Upload state, run one compute pass, and read the particle buffer
    /// back into `particles`.
    fn dispatch(
        &mut self,
        pipeline_index: Pipeline,
        particles: &mut [PackedParticle],
        cells: Option<&[PackedCell]>,
    ) -> Result<(), BackendError> {
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));
        self.queue
            .write_buffer(&self.particle_buffer, 0, bytemuck::cast_slice(particles));
        if let Some(cells) = cells {
            self.queue
                .write_buffer(&self.cell_buffer, 0, bytemuck::cast_slice(cells));
        }

        let pipeline = match pipeline_index {
            Pipeline::Density => &self.density_pipeline,
            Pipeline::Force => &self.force_pipeline,
            Pipeline::Integrate => &self.integrate_pipeline,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sph2d dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sph2d stage"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let workgroups = (particles.len() as u32).div_ceil(64);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.particle_buffer,
            0,
            &self.staging,
            0,
            (particles.len() * std::mem::size_of::<PackedParticle>()) as u64,
        );
        self.queue.submit(Some(encoder.finish()));

        self.read_back(particles)
    }

    /// Blocking staging-buffer readback.
    fn read_back(&self, out: &mut [PackedParticle]) -> Result<(), BackendError> {
        let slice = self.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("buffer map failed: {e:?}");
                return Err(BackendError::ReadbackFailed(format!("{e:?}")));
            }
            Err(_) => {
                log::error!("buffer map channel disconnected; device may be lost");
                return Err(BackendError::DeviceLost);
            }
        }

        {
            let data = slice.get_mapped_range();
            out.copy_from_slice(bytemuck::cast_slice(&data));
        }
        self.staging.unmap();
        Ok(())
    }
}

enum Pipeline {
    Density,
    Force,
    Integrate,
}

impl ComputeBackend for WgpuBackend {
    fn run_density_pressure(
        &mut self,
        particles: &mut [PackedParticle],
        cells: &[PackedCell],
    ) -> Result<(), BackendError> {
        self.check_particles(particles.len())?;
        self.check_cells(cells.len())?;
        self.dispatch(Pipeline::Density, particles, Some(cells))
    }

    fn run_force(
        &mut self,
        particles: &mut [PackedParticle],
        cells: &[PackedCell],
    ) -> Result<(), BackendError> {
        self.check_particles(particles.len())?;
        self.check_cells(cells.len())?;
        self.dispatch(Pipeline::Force, particles, Some(cells))
    }

    fn run_integrate(
        &mut self,
        particles: &mut [PackedParticle],
        dt: f32,
    ) -> Result<(), BackendError> {
        self.check_particles(particles.len())?;
        self.params.dt = dt;
        self.dispatch(Pipeline::Integrate, particles, None)
    }
}
