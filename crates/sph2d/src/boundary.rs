//! Reflecting domain boundary.

use crate::config::SimConfig;
use crate::particle::{Particle, Particles};

/// Gap kept below the top of the domain so particles never reach the last
/// row of cells.
pub const TOP_MARGIN: f32 = 0.2;

/// Clamp one particle to the domain box, negating and damping the
/// corresponding velocity component on each violated axis independently.
///
/// The box is `[0, width*h - h] x [0, height*h - TOP_MARGIN]`: one cell of
/// slack on the right and a fixed margin at the top, matching the walls the
/// dam-break scene is built against.
pub fn reflect(p: &mut Particle, config: &SimConfig) {
    let h = config.smoothing_length;
    let x_max = config.world_width() - h;
    let y_max = config.world_height() - TOP_MARGIN;

    if p.position.y < 0.0 {
        p.position.y = 0.0;
        p.velocity.y = -p.velocity.y * config.damping_factor;
    }
    if p.position.y > y_max {
        p.position.y = y_max;
        p.velocity.y = -p.velocity.y * config.damping_factor;
    }
    if p.position.x < 0.0 {
        p.position.x = 0.0;
        p.velocity.x = -p.velocity.x * config.damping_factor;
    }
    if p.position.x > x_max {
        p.position.x = x_max;
        p.velocity.x = -p.velocity.x * config.damping_factor;
    }
}

/// Apply the boundary to every particle, once per tick, after integration.
pub fn apply(particles: &mut Particles, config: &SimConfig) {
    for p in &mut particles.list {
        reflect(p, config);
    }
}
