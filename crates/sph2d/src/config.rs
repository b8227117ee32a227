//! Simulation configuration and validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Immutable per-run simulation parameters.
///
/// `width` and `height` are the domain dimensions in grid cells; one cell
/// is `smoothing_length` world units across, so the world-space domain is
/// `[0, width * h] x [0, height * h]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Kernel support radius, also the grid cell size.
    pub smoothing_length: f32,
    /// Stiffness `k` of the state equation `P = k * (rho - rho0)`.
    pub pressure_constant: f32,
    /// Viscosity strength `mu`.
    pub viscosity_constant: f32,
    /// Reference density `rho0`.
    pub resting_density: f32,
    /// Uniform particle mass.
    pub particle_mass: f32,
    /// Velocity scale applied on boundary reflection, in `[0, 1]`.
    pub damping_factor: f32,
    /// Domain width in grid cells.
    pub width: usize,
    /// Domain height in grid cells.
    pub height: usize,
    /// Gravity magnitude (applied as `(0, -g)`).
    pub gravity: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            smoothing_length: 1.0,
            pressure_constant: 150.0,
            viscosity_constant: 8.0,
            resting_density: 1.0,
            particle_mass: 1.0,
            damping_factor: 0.5,
            width: 32,
            height: 32,
            gravity: 9.8,
        }
    }
}

impl SimConfig {
    /// Check every parameter that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.smoothing_length > 0.0) {
            return Err(ConfigError::NonPositiveSmoothingLength(
                self.smoothing_length,
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyDomain {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Total world size in X.
    pub fn world_width(&self) -> f32 {
        self.width as f32 * self.smoothing_length
    }

    /// Total world size in Y.
    pub fn world_height(&self) -> f32 {
        self.height as f32 * self.smoothing_length
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Initial dam-break block: `particle_count` particles laid out in rows of
/// `dam_width`, stacked from the floor upward and centered horizontally.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DamBreakLayout {
    pub particle_count: usize,
    /// Particles per row.
    pub dam_width: usize,
    /// Per-particle horizontal jitter as a fraction of the smoothing length.
    pub jitter: f32,
}

impl Default for DamBreakLayout {
    fn default() -> Self {
        Self {
            particle_count: 256,
            dam_width: 16,
            jitter: 0.01,
        }
    }
}

impl DamBreakLayout {
    /// Number of rows in the block.
    pub fn rows(&self) -> usize {
        if self.dam_width == 0 {
            0
        } else {
            self.particle_count / self.dam_width
        }
    }

    /// Check that the block is well formed and fits inside the domain.
    pub fn validate(&self, config: &SimConfig) -> Result<(), ConfigError> {
        if self.dam_width == 0 {
            return Err(ConfigError::ZeroDamWidth);
        }
        if self.particle_count == 0 || self.particle_count % self.dam_width != 0 {
            return Err(ConfigError::ParticleCountMismatch {
                particle_count: self.particle_count,
                dam_width: self.dam_width,
            });
        }
        if self.dam_width > config.width || self.rows() > config.height {
            return Err(ConfigError::DamExceedsDomain {
                dam_width: self.dam_width,
                rows: self.rows(),
                width: config.width,
                height: config.height,
            });
        }
        Ok(())
    }
}

/// Fatal configuration problems, reported before any state is created.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositiveSmoothingLength(f32),
    EmptyDomain { width: usize, height: usize },
    ZeroDamWidth,
    ParticleCountMismatch { particle_count: usize, dam_width: usize },
    DamExceedsDomain {
        dam_width: usize,
        rows: usize,
        width: usize,
        height: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveSmoothingLength(h) => {
                write!(f, "smoothing length must be positive, got {}", h)
            }
            ConfigError::EmptyDomain { width, height } => {
                write!(f, "domain must be at least 1x1 cells, got {}x{}", width, height)
            }
            ConfigError::ZeroDamWidth => write!(f, "dam width must be at least 1"),
            ConfigError::ParticleCountMismatch {
                particle_count,
                dam_width,
            } => write!(
                f,
                "particle count {} is not a positive multiple of dam width {}",
                particle_count, dam_width
            ),
            ConfigError::DamExceedsDomain {
                dam_width,
                rows,
                width,
                height,
            } => write!(
                f,
                "dam block {}x{} does not fit the {}x{} cell domain",
                dam_width, rows, width, height
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert!(DamBreakLayout::default().validate(&config).is_ok());
    }

    #[test]
    fn rejects_non_positive_smoothing_length() {
        let mut config = SimConfig::default();
        config.smoothing_length = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveSmoothingLength(_))
        ));
        config.smoothing_length = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_domain() {
        let mut config = SimConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDomain { .. })
        ));
    }

    #[test]
    fn rejects_inconsistent_particle_count() {
        let config = SimConfig::default();
        let layout = DamBreakLayout {
            particle_count: 10,
            dam_width: 4,
            jitter: 0.0,
        };
        assert!(matches!(
            layout.validate(&config),
            Err(ConfigError::ParticleCountMismatch { .. })
        ));
    }

    #[test]
    fn rejects_dam_larger_than_domain() {
        let mut config = SimConfig::default();
        config.width = 4;
        config.height = 4;
        let layout = DamBreakLayout {
            particle_count: 40,
            dam_width: 8,
            jitter: 0.0,
        };
        assert!(matches!(
            layout.validate(&config),
            Err(ConfigError::DamExceedsDomain { .. })
        ));
    }

    #[test]
    fn json_round_trip() {
        let config = SimConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width, config.width);
        assert_eq!(back.smoothing_length, config.smoothing_length);
        assert_eq!(back.pressure_constant, config.pressure_constant);
    }
}
