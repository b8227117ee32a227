//! Compute-backend buffer contract and host-side reference backend.
//!
//! The compute execution strategy hands the whole tick's solver work to an
//! opaque backend through two flat buffers: one `PackedParticle` per
//! particle and one `PackedCell` per grid cell. The host serializes state,
//! invokes the density/pressure and force stages in strict sequence, and
//! reads results back before integration. [`HostBackend`] implements the
//! same contract on the CPU and is the reference for any real backend.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};
use std::fmt;

use crate::config::SimConfig;
use crate::grid::cell_coord;
use crate::kernels::KernelCoefficients;
use crate::particle::Particles;
use crate::solver::DENSITY_EPSILON;

/// Fixed per-cell id capacity of the packed grid.
///
/// Cells hold at most this many occupants; anything beyond is dropped at
/// build time and surfaced through the overflow counter. The cap is part
/// of the buffer contract, so fixing it means changing every backend.
pub const CELL_CAPACITY: usize = 5;

/// Per-particle record exchanged with a compute backend. 48 bytes,
/// naturally aligned; field order is the contract with the shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PackedParticle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub force: [f32; 2],
    pub cell: [i32; 2],
    pub density: f32,
    pub pressure: f32,
    pub id: u32,
    pub _pad: u32,
}

/// Bounded grid cell: up to [`CELL_CAPACITY`] member ids plus the live
/// occupancy count. 24 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PackedCell {
    pub ids: [u32; CELL_CAPACITY],
    pub count: u32,
}

/// Failures at the backend boundary. Fatal for the tick that hit them;
/// the caller decides whether to retry, never the strategy layer.
#[derive(Debug)]
pub enum BackendError {
    /// No usable compute device.
    Unavailable(String),
    /// A buffer handed to the backend does not match its allocated size.
    BufferSizeMismatch { expected: usize, actual: usize },
    DeviceLost,
    ReadbackFailed(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Unavailable(reason) => {
                write!(f, "compute backend unavailable: {}", reason)
            }
            BackendError::BufferSizeMismatch { expected, actual } => {
                write!(f, "buffer size mismatch: expected {}, got {}", expected, actual)
            }
            BackendError::DeviceLost => write!(f, "compute device lost"),
            BackendError::ReadbackFailed(reason) => {
                write!(f, "buffer readback failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// The narrow synchronous interface a compute backend implements.
///
/// Each call is a blocking round trip from the host's perspective: the
/// slices are the authoritative state on entry and hold the stage's
/// results on return. `run_force` must observe every particle's final
/// pressure from `run_density_pressure`, which the strict call sequence
/// guarantees. `run_integrate` applies the same semi-implicit Euler update
/// and boundary reflection as the CPU strategies.
pub trait ComputeBackend {
    fn run_density_pressure(
        &mut self,
        particles: &mut [PackedParticle],
        cells: &[PackedCell],
    ) -> Result<(), BackendError>;

    fn run_force(
        &mut self,
        particles: &mut [PackedParticle],
        cells: &[PackedCell],
    ) -> Result<(), BackendError>;

    fn run_integrate(
        &mut self,
        particles: &mut [PackedParticle],
        dt: f32,
    ) -> Result<(), BackendError>;
}

/// Serialize particle state into the flat buffer, recomputing each
/// particle's cell coordinate from its position.
pub fn pack_particles(particles: &Particles, out: &mut Vec<PackedParticle>, config: &SimConfig) {
    out.clear();
    out.reserve(particles.len());
    let h = config.smoothing_length;
    for p in particles.iter() {
        let cell = cell_coord(p.position, h, config.width, config.height);
        out.push(PackedParticle {
            position: p.position.to_array(),
            velocity: p.velocity.to_array(),
            force: p.force.to_array(),
            cell: cell.to_array(),
            density: p.density,
            pressure: p.pressure,
            id: p.id,
            _pad: 0,
        });
    }
}

/// Copy backend results back into the particle collection.
pub fn unpack_particles(packed: &[PackedParticle], particles: &mut Particles) {
    for (p, src) in particles.list.iter_mut().zip(packed) {
        p.position = Vec2::from_array(src.position);
        p.velocity = Vec2::from_array(src.velocity);
        p.force = Vec2::from_array(src.force);
        p.density = src.density;
        p.pressure = src.pressure;
        p.cell = IVec2::from_array(src.cell);
    }
}

/// Rebuild the bounded grid from packed particle state.
///
/// Returns the number of occupants dropped because their cell was already
/// full; dropped occupants silently vanish from neighbor sums, so callers
/// must surface the count rather than ignore it.
pub fn build_packed_grid(
    packed: &[PackedParticle],
    cells: &mut Vec<PackedCell>,
    config: &SimConfig,
) -> u32 {
    cells.clear();
    cells.resize(config.width * config.height, PackedCell::default());

    let mut dropped = 0u32;
    for p in packed {
        let index = p.cell[1] as usize * config.width + p.cell[0] as usize;
        let cell = &mut cells[index];
        if (cell.count as usize) < CELL_CAPACITY {
            cell.ids[cell.count as usize] = p.id;
            cell.count += 1;
        } else {
            dropped += 1;
        }
    }
    dropped
}

/// CPU implementation of the backend contract: the exact semantics any
/// real compute backend must reproduce over the packed buffers. Also the
/// test double for environments without a GPU.
pub struct HostBackend {
    config: SimConfig,
    coeffs: KernelCoefficients,
}

impl HostBackend {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            config: *config,
            coeffs: KernelCoefficients::new(config.smoothing_length),
        }
    }

    fn check_sizes(
        &self,
        particle_count: usize,
        cell_count: usize,
    ) -> Result<(), BackendError> {
        let expected = self.config.width * self.config.height;
        if cell_count != expected {
            return Err(BackendError::BufferSizeMismatch {
                expected,
                actual: cell_count,
            });
        }
        // The host backend has no fixed allocation; only an empty particle
        // buffer is a contract violation.
        if particle_count == 0 {
            return Err(BackendError::BufferSizeMismatch {
                expected: 1,
                actual: 0,
            });
        }
        Ok(())
    }

    /// Visit every valid occupant in the 3x3 neighborhood of `cell`.
    fn for_each_neighbor(
        &self,
        cells: &[PackedCell],
        cell: [i32; 2],
        mut visit: impl FnMut(u32),
    ) {
        let (w, h) = (self.config.width as i32, self.config.height as i32);
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let nx = cell[0] + dx;
                let ny = cell[1] + dy;
                if nx < 0 || nx >= w || ny < 0 || ny >= h {
                    continue;
                }
                let cell = &cells[(ny * w + nx) as usize];
                let count = (cell.count as usize).min(CELL_CAPACITY);
                for &id in &cell.ids[..count] {
                    visit(id);
                }
            }
        }
    }
}

impl ComputeBackend for HostBackend {
    fn run_density_pressure(
        &mut self,
        particles: &mut [PackedParticle],
        cells: &[PackedCell],
    ) -> Result<(), BackendError> {
        self.check_sizes(particles.len(), cells.len())?;
        let h = self.config.smoothing_length;
        let m = self.config.particle_mass;

        for i in 0..particles.len() {
            let pi = Vec2::from_array(particles[i].position);
            let mut density = 0.0;
            self.for_each_neighbor(cells, particles[i].cell, |j| {
                let distance = (Vec2::from_array(particles[j as usize].position) - pi).length();
                if distance < h {
                    let falloff = self.coeffs.h_squared - distance;
                    density += m * self.coeffs.poly6 * falloff * falloff * falloff;
                }
            });
            particles[i].density = density;
            particles[i].pressure =
                self.config.pressure_constant * (density - self.config.resting_density);
        }
        Ok(())
    }

    fn run_force(
        &mut self,
        particles: &mut [PackedParticle],
        cells: &[PackedCell],
    ) -> Result<(), BackendError> {
        self.check_sizes(particles.len(), cells.len())?;
        let h = self.config.smoothing_length;
        let m = self.config.particle_mass;

        for i in 0..particles.len() {
            let p = particles[i];
            let pi = Vec2::from_array(p.position);
            let vi = Vec2::from_array(p.velocity);
            let mut pressure = Vec2::ZERO;
            let mut viscosity = Vec2::ZERO;

            self.for_each_neighbor(cells, p.cell, |j| {
                let q = &particles[j as usize];
                if q.id == p.id {
                    return;
                }
                let offset = Vec2::from_array(q.position) - pi;
                let distance = offset.length();
                if distance >= h || q.density <= DENSITY_EPSILON {
                    return;
                }
                pressure += -offset.normalize_or_zero()
                    * (m * (p.pressure + q.pressure) / (2.0 * q.density)
                        * self.coeffs.spiky
                        * (h - distance)
                        * (h - distance));
                viscosity += (Vec2::from_array(q.velocity) - vi)
                    * (self.config.viscosity_constant * m / q.density
                        * self.coeffs.viscosity
                        * (h - distance));
            });

            let gravity =
                Vec2::new(0.0, -self.config.gravity * m) * p.density;
            particles[i].force = (pressure + viscosity + gravity).to_array();
        }
        Ok(())
    }

    fn run_integrate(
        &mut self,
        particles: &mut [PackedParticle],
        dt: f32,
    ) -> Result<(), BackendError> {
        let h = self.config.smoothing_length;
        let x_max = self.config.world_width() - h;
        let y_max = self.config.world_height() - crate::boundary::TOP_MARGIN;
        let damping = self.config.damping_factor;

        for p in particles.iter_mut() {
            let mut velocity = Vec2::from_array(p.velocity);
            let mut position = Vec2::from_array(p.position);
            if p.density > DENSITY_EPSILON {
                velocity += dt * Vec2::from_array(p.force) / p.density;
            }
            position += dt * velocity;

            if position.y < 0.0 {
                position.y = 0.0;
                velocity.y = -velocity.y * damping;
            }
            if position.y > y_max {
                position.y = y_max;
                velocity.y = -velocity.y * damping;
            }
            if position.x < 0.0 {
                position.x = 0.0;
                velocity.x = -velocity.x * damping;
            }
            if position.x > x_max {
                position.x = x_max;
                velocity.x = -velocity.x * damping;
            }

            p.position = position.to_array();
            p.velocity = velocity.to_array();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;

    fn test_config() -> SimConfig {
        SimConfig {
            smoothing_length: 1.0,
            width: 8,
            height: 8,
            ..Default::default()
        }
    }

    #[test]
    fn packed_layout_matches_the_buffer_contract() {
        assert_eq!(std::mem::size_of::<PackedParticle>(), 48);
        assert_eq!(std::mem::size_of::<PackedCell>(), 24);
    }

    #[test]
    fn pack_round_trips_particle_state() {
        let config = test_config();
        let mut particles = Particles::new();
        let mut p = Particle::new(0, Vec2::new(2.5, 3.5));
        p.velocity = Vec2::new(1.0, -1.0);
        p.density = 4.0;
        p.pressure = -2.0;
        particles.list.push(p);

        let mut packed = Vec::new();
        pack_particles(&particles, &mut packed, &config);
        assert_eq!(packed[0].cell, [2, 3]);

        let mut back = Particles::new();
        back.list.push(Particle::new(0, Vec2::ZERO));
        unpack_particles(&packed, &mut back);
        assert_eq!(back.list[0].position, p.position);
        assert_eq!(back.list[0].velocity, p.velocity);
        assert_eq!(back.list[0].density, p.density);
        assert_eq!(back.list[0].cell, IVec2::new(2, 3));
    }

    #[test]
    fn packed_grid_counts_overflow_instead_of_dropping_silently() {
        let config = test_config();
        let mut particles = Particles::new();
        // Seven particles in the same cell: two over capacity.
        for i in 0..7 {
            particles
                .list
                .push(Particle::new(i, Vec2::new(2.5, 2.5)));
        }
        let mut packed = Vec::new();
        pack_particles(&particles, &mut packed, &config);

        let mut cells = Vec::new();
        let dropped = build_packed_grid(&packed, &mut cells, &config);
        assert_eq!(dropped, 2);

        let cell = &cells[2 * config.width + 2];
        assert_eq!(cell.count as usize, CELL_CAPACITY);
        assert_eq!(&cell.ids, &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn host_backend_rejects_mismatched_cell_buffer() {
        let config = test_config();
        let mut backend = HostBackend::new(&config);
        let mut packed = vec![PackedParticle::default()];
        let cells = vec![PackedCell::default(); 3]; // wrong: expects 64
        let result = backend.run_density_pressure(&mut packed, &cells);
        assert!(matches!(
            result,
            Err(BackendError::BufferSizeMismatch { expected: 64, actual: 3 })
        ));
    }

    #[test]
    fn host_backend_density_includes_self_term() {
        let config = test_config();
        let coeffs = KernelCoefficients::new(config.smoothing_length);
        let mut backend = HostBackend::new(&config);

        let mut particles = Particles::new();
        particles.list.push(Particle::new(0, Vec2::new(4.0, 4.0)));
        let mut packed = Vec::new();
        pack_particles(&particles, &mut packed, &config);
        let mut cells = Vec::new();
        build_packed_grid(&packed, &mut cells, &config);

        backend.run_density_pressure(&mut packed, &cells).unwrap();
        let expected = config.particle_mass * coeffs.poly6 * coeffs.h_squared.powi(3);
        assert!((packed[0].density - expected).abs() < 1e-6);
    }

    #[test]
    fn host_backend_integrate_applies_boundary() {
        let config = test_config();
        let mut backend = HostBackend::new(&config);
        let mut packed = vec![PackedParticle {
            position: [3.0, 0.05],
            velocity: [0.0, -1.0],
            density: 1.0,
            id: 0,
            ..Default::default()
        }];

        backend.run_integrate(&mut packed, 0.1).unwrap();

        assert_eq!(packed[0].position[1], 0.0);
        assert_eq!(packed[0].velocity[1], 1.0 * config.damping_factor);
    }
}
