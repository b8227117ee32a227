//! 2D SPH dam-break fluid simulation.
//!
//! A rectangular block of particles collapses under gravity inside a
//! reflecting box. Density, pressure and viscosity are computed with
//! classic SPH kernel sums over a uniform spatial grid, and the solver
//! stages run under one of three interchangeable execution strategies:
//! brute-force all-pairs, grid-accelerated CPU, or an external compute
//! backend exchanging flat particle/cell buffers with the host.
//!
//! This crate is backend-agnostic; the `sph2d_gpu` crate provides a wgpu
//! implementation of [`ComputeBackend`].
//!
//! # Example
//!
//! ```
//! use sph2d::{DamBreakLayout, ExecutionStrategy, SimConfig, SphSimulation};
//!
//! let config = SimConfig::default();
//! let layout = DamBreakLayout {
//!     particle_count: 64,
//!     dam_width: 8,
//!     jitter: 0.01,
//! };
//! let mut sim = SphSimulation::new(config, layout, ExecutionStrategy::Grid).unwrap();
//!
//! for _ in 0..10 {
//!     let metrics = sim.step(1.0 / 60.0).unwrap();
//!     assert_eq!(metrics.particle_count, 64);
//! }
//! ```

pub mod boundary;
pub mod compute;
pub mod config;
pub mod grid;
pub mod integrate;
pub mod kernels;
pub mod particle;
pub mod simulation;
pub mod solver;

pub use compute::{
    BackendError, ComputeBackend, HostBackend, PackedCell, PackedParticle, CELL_CAPACITY,
};
pub use config::{ConfigError, DamBreakLayout, SimConfig};
pub use grid::SpatialGrid;
pub use kernels::KernelCoefficients;
pub use particle::{Particle, Particles};
pub use simulation::{ExecutionStrategy, SphSimulation, StepError, StepMetrics};

pub use glam::{IVec2, Vec2};
