//! GPU backend parity against the host reference backend.
//!
//! These tests need a usable adapter; on machines without one they log and
//! return early instead of failing.

use sph2d::{
    ComputeBackend, DamBreakLayout, ExecutionStrategy, HostBackend, SimConfig, SphSimulation,
};
use sph2d_gpu::WgpuBackend;

fn test_config() -> SimConfig {
    SimConfig {
        smoothing_length: 1.0,
        pressure_constant: 120.0,
        viscosity_constant: 6.0,
        resting_density: 1.5,
        particle_mass: 1.0,
        damping_factor: 0.5,
        width: 16,
        height: 16,
        gravity: 9.8,
    }
}

fn gpu_backend(config: &SimConfig, particle_count: usize) -> Option<WgpuBackend> {
    match WgpuBackend::create(config, particle_count) {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

#[test]
fn gpu_matches_host_backend_over_several_ticks() {
    let config = test_config();
    let layout = DamBreakLayout {
        particle_count: 48,
        dam_width: 8,
        jitter: 0.0,
    };
    let Some(backend) = gpu_backend(&config, layout.particle_count) else {
        return;
    };

    let mut gpu_sim = SphSimulation::new(
        config,
        layout,
        ExecutionStrategy::Compute(Box::new(backend)),
    )
    .unwrap();
    let mut host_sim = SphSimulation::new(
        config,
        layout,
        ExecutionStrategy::Compute(Box::new(HostBackend::new(&config))),
    )
    .unwrap();

    let dt = 1.0 / 120.0;
    for _ in 0..4 {
        gpu_sim.step(dt).unwrap();
        host_sim.step(dt).unwrap();
    }

    for (a, b) in gpu_sim.particles().iter().zip(host_sim.particles()) {
        assert!(
            (a.position - b.position).length() < 1e-3,
            "position diverged at particle {}: {:?} vs {:?}",
            a.id,
            a.position,
            b.position
        );
        assert!((a.velocity - b.velocity).length() < 1e-3);
        assert!(
            (a.density - b.density).abs() < 1e-3,
            "density diverged at particle {}",
            a.id
        );
    }
}

#[test]
fn gpu_backend_rejects_wrong_buffer_sizes() {
    let config = test_config();
    let Some(mut backend) = gpu_backend(&config, 8) else {
        return;
    };

    let mut particles = vec![sph2d::PackedParticle::default(); 4]; // expects 8
    let cells = vec![sph2d::PackedCell::default(); config.width * config.height];
    let result = backend.run_density_pressure(&mut particles, &cells);
    assert!(matches!(
        result,
        Err(sph2d::BackendError::BufferSizeMismatch { expected: 8, actual: 4 })
    ));
}
