//! SPH smoothing-kernel normalization constants.

use std::f32::consts::PI;

/// Precomputed normalization constants for the three SPH kernels,
/// derived once from the smoothing length `h` and immutable for a run.
///
/// The density sum uses a poly6-style kernel, the pressure gradient the
/// spiky kernel, and the viscosity term the viscosity Laplacian. Keeping
/// the constants precomputed avoids `powi` in the per-pair hot path.
#[derive(Clone, Copy, Debug)]
pub struct KernelCoefficients {
    /// Density (poly6) coefficient: `315 / (65 π h⁹)`
    pub poly6: f32,
    /// Pressure gradient (spiky) coefficient: `-45 / (π h⁶)`
    pub spiky: f32,
    /// Viscosity Laplacian coefficient: `45 / (π h⁶)`
    pub viscosity: f32,
    /// `h²`, the falloff base of the density kernel
    pub h_squared: f32,
}

impl KernelCoefficients {
    /// Derive the coefficients for smoothing length `h`.
    ///
    /// `h` must be positive; callers validate via
    /// [`SimConfig::validate`](crate::config::SimConfig::validate).
    pub fn new(h: f32) -> Self {
        debug_assert!(h > 0.0, "smoothing length must be positive, got {}", h);
        Self {
            poly6: 315.0 / (65.0 * PI * h.powi(9)),
            spiky: -45.0 / (PI * h.powi(6)),
            viscosity: 45.0 / (PI * h.powi(6)),
            h_squared: h * h,
        }
    }
}
