//! Particle state and the dam-break initial layout.

use glam::{IVec2, Vec2};

use crate::config::{DamBreakLayout, SimConfig};

/// A single SPH particle.
///
/// `id` is the particle's stable index into the collection for the whole
/// run. `cell` is derived from `position` at every grid rebuild and is not
/// authoritative between rebuilds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Net force accumulated by the last force pass.
    pub force: Vec2,
    /// Recomputed every tick; always >= 0.
    pub density: f32,
    /// `pressure_constant * (density - resting_density)`; may be negative.
    pub pressure: f32,
    /// Grid cell coordinate as of the last rebuild.
    pub cell: IVec2,
}

impl Particle {
    /// Create a stationary particle at the given position.
    pub fn new(id: u32, position: Vec2) -> Self {
        Self {
            id,
            position,
            ..Default::default()
        }
    }

    /// Velocity magnitude.
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }
}

/// The particle collection, indexed by particle id.
///
/// Built once at initialization; no particles are created or destroyed
/// mid-run.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pub list: Vec<Particle>,
}

impl Particles {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list: Vec::with_capacity(capacity),
        }
    }

    /// Lay out the dam-break block: `layout.rows()` rows of
    /// `layout.dam_width` particles at `smoothing_length` spacing, centered
    /// horizontally in the domain and stacked from `y = 0` upward. Each
    /// particle's x position gets a small random jitter so columns do not
    /// start perfectly aligned.
    pub fn dam_break(config: &SimConfig, layout: &DamBreakLayout) -> Self {
        let h = config.smoothing_length;
        // Integer cell arithmetic so the block sits on cell boundaries.
        let x0 = (config.width / 2).saturating_sub(layout.dam_width / 2) as f32 * h;
        let jitter_amp = layout.jitter * h;

        let mut particles = Self::with_capacity(layout.particle_count);
        let mut id = 0u32;
        for row in 0..layout.rows() {
            let y = row as f32 * h;
            for col in 0..layout.dam_width {
                let jitter = if jitter_amp > 0.0 {
                    (rand::random::<f32>() * 2.0 - 1.0) * jitter_amp
                } else {
                    0.0
                };
                let x = x0 + col as f32 * h + jitter;
                particles.list.push(Particle::new(id, Vec2::new(x, y)));
                id += 1;
            }
        }
        particles
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Particle> {
        self.list.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Particle> {
        self.list.get_mut(id as usize)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SimConfig {
        SimConfig {
            width: 16,
            height: 16,
            smoothing_length: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn dam_break_builds_requested_count() {
        let layout = DamBreakLayout {
            particle_count: 24,
            dam_width: 6,
            jitter: 0.01,
        };
        let particles = Particles::dam_break(&test_config(), &layout);
        assert_eq!(particles.len(), 24);
        // Ids are the index into the collection.
        for (i, p) in particles.iter().enumerate() {
            assert_eq!(p.id as usize, i);
        }
    }

    #[test]
    fn dam_break_rows_stack_upward_at_spacing_h() {
        let layout = DamBreakLayout {
            particle_count: 16,
            dam_width: 4,
            jitter: 0.0,
        };
        let particles = Particles::dam_break(&test_config(), &layout);
        for (i, p) in particles.iter().enumerate() {
            let row = i / 4;
            assert_eq!(p.position.y, row as f32);
            assert_eq!(p.velocity, Vec2::ZERO);
        }
    }

    #[test]
    fn dam_break_is_horizontally_centered() {
        let layout = DamBreakLayout {
            particle_count: 16,
            dam_width: 4,
            jitter: 0.0,
        };
        let particles = Particles::dam_break(&test_config(), &layout);
        // width/2 - dam_width/2 = 8 - 2 = 6 cells.
        assert_eq!(particles.list[0].position.x, 6.0);
        assert_eq!(particles.list[3].position.x, 9.0);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let layout = DamBreakLayout {
            particle_count: 64,
            dam_width: 8,
            jitter: 0.01,
        };
        let particles = Particles::dam_break(&test_config(), &layout);
        for (i, p) in particles.iter().enumerate() {
            let col = (i % 8) as f32;
            let expected_x = 4.0 + col;
            assert!(
                (p.position.x - expected_x).abs() <= 0.01 + 1e-6,
                "jitter out of range at particle {}: {}",
                i,
                p.position.x
            );
        }
    }
}
