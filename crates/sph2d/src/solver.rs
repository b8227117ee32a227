//! Density/pressure and force passes.
//!
//! Two CPU variants of each pass share the same kernel sums: a brute-force
//! all-pairs reference and a grid-accelerated version restricted to the 3x3
//! cell neighborhood. Both must agree within floating-point tolerance since
//! the grid only filters out pairs beyond the cutoff radius anyway.
//!
//! Each pass snapshots the fields it reads and writes results back only
//! after every particle has been computed, so no particle observes a
//! half-updated neighbor.

use glam::Vec2;
use rayon::prelude::*;

use crate::config::SimConfig;
use crate::grid::SpatialGrid;
use crate::kernels::KernelCoefficients;
use crate::particle::{Particle, Particles};

/// Densities at or below this are treated as degenerate: the neighbor's
/// contribution is skipped instead of dividing toward a non-finite force.
pub(crate) const DENSITY_EPSILON: f32 = 1e-6;

fn density_contribution(
    p: &Particle,
    q: &Particle,
    config: &SimConfig,
    coeffs: &KernelCoefficients,
) -> f32 {
    let distance = (q.position - p.position).length();
    if distance < config.smoothing_length {
        let falloff = coeffs.h_squared - distance;
        config.particle_mass * coeffs.poly6 * falloff * falloff * falloff
    } else {
        0.0
    }
}

/// Pressure and viscosity contribution of neighbor `q` on particle `p`.
/// Zero beyond the cutoff, for `q == p`, and for degenerate `q` density.
fn force_contribution(
    p: &Particle,
    q: &Particle,
    config: &SimConfig,
    coeffs: &KernelCoefficients,
) -> Vec2 {
    if q.id == p.id {
        return Vec2::ZERO;
    }
    let offset = q.position - p.position;
    let distance = offset.length();
    if distance >= config.smoothing_length || q.density <= DENSITY_EPSILON {
        return Vec2::ZERO;
    }

    let h = config.smoothing_length;
    let m = config.particle_mass;
    let pressure = -offset.normalize_or_zero()
        * (m * (p.pressure + q.pressure) / (2.0 * q.density)
            * coeffs.spiky
            * (h - distance)
            * (h - distance));
    let viscosity = (q.velocity - p.velocity)
        * (config.viscosity_constant * m / q.density * coeffs.viscosity * (h - distance));
    pressure + viscosity
}

fn apply_densities(particles: &mut Particles, densities: Vec<f32>, config: &SimConfig) {
    for (p, density) in particles.list.iter_mut().zip(densities) {
        p.density = density;
        p.pressure = config.pressure_constant * (density - config.resting_density);
    }
}

fn apply_forces(particles: &mut Particles, forces: Vec<Vec2>) {
    for (p, force) in particles.list.iter_mut().zip(forces) {
        p.force = force;
    }
}

fn gravity(p: &Particle, config: &SimConfig) -> Vec2 {
    // Gravity is scaled by the particle's density in this model.
    Vec2::new(0.0, -config.gravity * config.particle_mass) * p.density
}

/// O(n²) density/pressure pass: every particle against every particle,
/// including itself.
pub fn density_pressure_brute(
    particles: &mut Particles,
    config: &SimConfig,
    coeffs: &KernelCoefficients,
) {
    let list = &particles.list;
    let densities: Vec<f32> = list
        .par_iter()
        .map(|p| {
            list.iter()
                .map(|q| density_contribution(p, q, config, coeffs))
                .sum()
        })
        .collect();
    apply_densities(particles, densities, config);
}

/// Grid-accelerated density/pressure pass over the 3x3 neighborhood.
/// The grid must have been rebuilt from the current positions.
pub fn density_pressure_grid(
    particles: &mut Particles,
    grid: &SpatialGrid,
    config: &SimConfig,
    coeffs: &KernelCoefficients,
) {
    let list = &particles.list;
    let densities: Vec<f32> = list
        .par_iter()
        .map(|p| {
            grid.neighbors(p.cell)
                .map(|j| density_contribution(p, &list[j as usize], config, coeffs))
                .sum()
        })
        .collect();
    apply_densities(particles, densities, config);
}

/// O(n²) force pass. Requires the density/pressure pass to have completed
/// for all particles.
pub fn forces_brute(particles: &mut Particles, config: &SimConfig, coeffs: &KernelCoefficients) {
    let list = &particles.list;
    let forces: Vec<Vec2> = list
        .par_iter()
        .map(|p| {
            let interaction: Vec2 = list
                .iter()
                .map(|q| force_contribution(p, q, config, coeffs))
                .sum();
            interaction + gravity(p, config)
        })
        .collect();
    apply_forces(particles, forces);
}

/// Grid-accelerated force pass over the 3x3 neighborhood.
pub fn forces_grid(
    particles: &mut Particles,
    grid: &SpatialGrid,
    config: &SimConfig,
    coeffs: &KernelCoefficients,
) {
    let list = &particles.list;
    let forces: Vec<Vec2> = list
        .par_iter()
        .map(|p| {
            let interaction: Vec2 = grid
                .neighbors(p.cell)
                .map(|j| force_contribution(p, &list[j as usize], config, coeffs))
                .sum();
            interaction + gravity(p, config)
        })
        .collect();
    apply_forces(particles, forces);
}
