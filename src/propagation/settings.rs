//! Simulation and propagator configuration
//!
//! Everything here round-trips through TOML. Missing keys take their
//! defaults, so a settings file only needs the values it changes:
//!
//! ```toml
//! [forces]
//! include_third_body = false
//!
//! [propagator]
//! step_size = 30.0
//! ```

use serde::{Deserialize, Serialize};

use super::forces::ForceOptions;
use crate::ephemeris::FallbackSettings;

/// Numerical propagation configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagatorConfig {
    /// Nominal bulk step size in seconds
    pub step_size: f64,

    /// Longest sub-step taken by the live loop (seconds)
    pub max_live_step: f64,

    /// Subdivide each step with error control
    pub adaptive: bool,

    /// Error tolerance for adaptive stepping (km, km/s)
    pub tolerance: f64,

    /// Maximum number of steps before giving up
    pub max_steps: usize,

    /// Output interval for bulk samples (seconds, 0 = every step)
    pub history_interval: f64,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            step_size: 60.0,
            max_live_step: 10.0,
            adaptive: false,
            tolerance: 1e-6,
            max_steps: 1_000_000,
            history_interval: 0.0,
        }
    }
}

impl PropagatorConfig {
    /// Quick propagation settings (lower accuracy, faster)
    pub fn fast() -> Self {
        Self {
            step_size: 120.0,
            max_live_step: 60.0,
            tolerance: 1e-4,
            max_steps: 100_000,
            ..Default::default()
        }
    }

    /// High-precision settings
    pub fn high_precision() -> Self {
        Self {
            step_size: 10.0,
            max_live_step: 5.0,
            adaptive: true,
            tolerance: 1e-9,
            max_steps: 10_000_000,
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_history(mut self, interval: f64) -> Self {
        self.history_interval = interval;
        self
    }
}

/// Orbit sampling and cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitCacheSettings {
    /// Points per sampled orbit
    pub samples: usize,

    /// Clock jumps longer than this (seconds) invalidate every cached orbit
    pub invalidation_threshold: f64,
}

impl Default for OrbitCacheSettings {
    fn default() -> Self {
        Self {
            samples: 180,
            invalidation_threshold: 3600.0,
        }
    }
}

/// Top-level settings for a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub forces: ForceOptions,
    pub propagator: PropagatorConfig,
    pub orbit_cache: OrbitCacheSettings,
    pub fallback: FallbackSettings,
}

impl SimulationSettings {
    pub fn fast() -> Self {
        Self {
            forces: ForceOptions {
                include_j2: true,
                include_drag: false,
                include_third_body: false,
            },
            propagator: PropagatorConfig::fast(),
            orbit_cache: OrbitCacheSettings {
                samples: 90,
                ..Default::default()
            },
            fallback: FallbackSettings::default(),
        }
    }

    pub fn high_precision() -> Self {
        Self {
            forces: ForceOptions::default(),
            propagator: PropagatorConfig::high_precision(),
            orbit_cache: OrbitCacheSettings {
                samples: 360,
                invalidation_threshold: 600.0,
            },
            fallback: FallbackSettings {
                step: 600.0,
                max_steps: 20_000,
                ..Default::default()
            },
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings = SimulationSettings::from_toml_str(
            r#"
            [forces]
            include_drag = false

            [propagator]
            step_size = 15.0
            "#,
        )
        .unwrap();

        assert!(!settings.forces.include_drag);
        assert!(settings.forces.include_j2);
        assert_eq!(settings.propagator.step_size, 15.0);
        assert_eq!(settings.propagator.max_live_step, PropagatorConfig::default().max_live_step);
        assert_eq!(settings.orbit_cache, OrbitCacheSettings::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let settings = SimulationSettings::high_precision();
        let text = settings.to_toml_string().unwrap();
        assert_eq!(SimulationSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            SimulationSettings::from_toml_str("").unwrap(),
            SimulationSettings::default()
        );
    }
}
