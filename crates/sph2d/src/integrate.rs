//! Semi-implicit Euler time integration.

use crate::particle::Particles;
use crate::solver::DENSITY_EPSILON;

/// Advance velocities and positions by one tick:
/// `v += dt * F / rho; x += dt * v`.
///
/// Must run only after the force pass has completed for all particles.
/// A degenerate (near-zero) density skips the velocity update rather than
/// dividing toward a non-finite value; position still advances with the
/// existing velocity.
pub fn integrate(particles: &mut Particles, dt: f32) {
    for p in &mut particles.list {
        if p.density > DENSITY_EPSILON {
            p.velocity += dt * p.force / p.density;
        }
        p.position += dt * p.velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use glam::Vec2;

    #[test]
    fn velocity_update_precedes_position_update() {
        let mut particles = Particles::new();
        let mut p = Particle::new(0, Vec2::new(1.0, 1.0));
        p.density = 2.0;
        p.force = Vec2::new(0.0, -4.0);
        particles.list.push(p);

        integrate(&mut particles, 0.5);

        let p = &particles.list[0];
        // v = 0 + 0.5 * (-4 / 2) = -1; x advances with the NEW velocity.
        assert_eq!(p.velocity, Vec2::new(0.0, -1.0));
        assert_eq!(p.position, Vec2::new(1.0, 0.5));
    }

    #[test]
    fn zero_density_does_not_produce_nan() {
        let mut particles = Particles::new();
        let mut p = Particle::new(0, Vec2::new(1.0, 1.0));
        p.density = 0.0;
        p.force = Vec2::new(1.0, 1.0);
        p.velocity = Vec2::new(0.5, 0.0);
        particles.list.push(p);

        integrate(&mut particles, 0.1);

        let p = &particles.list[0];
        assert!(p.velocity.is_finite());
        assert_eq!(p.velocity, Vec2::new(0.5, 0.0));
        assert_eq!(p.position, Vec2::new(1.05, 1.0));
    }
}
