//! Orbital and spacecraft state representations
//!
//! Units are kilometers, km/s and km³/s² throughout. A state is always
//! relative to some origin (a central body or the solar-system barycenter);
//! the owner of the state knows which.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::bodies::BodyId;
use crate::error::SatelliteError;
use crate::time::Epoch;

/// Newtonian constant of gravitation in km³/(kg·s²)
pub const GRAVITATIONAL_CONSTANT: f64 = 6.674_30e-20;

/// Square meters to square kilometers
pub const M2_TO_KM2: f64 = 1e-6;

/// Position and velocity at an epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalState {
    /// Position (km)
    pub position: Vector3<f64>,

    /// Velocity (km/s)
    pub velocity: Vector3<f64>,

    pub epoch: Epoch,
}

impl OrbitalState {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, epoch: Epoch) -> Self {
        Self {
            position,
            velocity,
            epoch,
        }
    }

    /// State at rest at the origin
    pub fn zero(epoch: Epoch) -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros(), epoch)
    }

    pub fn radius(&self) -> f64 {
        self.position.norm()
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite()) && self.velocity.iter().all(|c| c.is_finite())
    }

    /// This state re-expressed relative to `origin`
    pub fn relative_to(&self, origin: &OrbitalState) -> Self {
        Self::new(
            self.position - origin.position,
            self.velocity - origin.velocity,
            self.epoch,
        )
    }

    /// This state (relative to `origin`) re-expressed in origin's frame
    pub fn offset_by(&self, origin: &OrbitalState) -> Self {
        Self::new(
            self.position + origin.position,
            self.velocity + origin.velocity,
            self.epoch,
        )
    }

    /// Specific orbital energy (vis-viva), km²/s²
    pub fn specific_energy(&self, mu: f64) -> f64 {
        0.5 * self.velocity.norm_squared() - mu / self.radius()
    }

    /// Semi-major axis in km (negative for hyperbolic)
    pub fn semi_major_axis(&self, mu: f64) -> f64 {
        -mu / (2.0 * self.specific_energy(mu))
    }

    /// Orbital period in seconds, `None` for unbound orbits
    pub fn period(&self, mu: f64) -> Option<f64> {
        let a = self.semi_major_axis(mu);
        if a > 0.0 {
            Some(2.0 * std::f64::consts::PI * (a.powi(3) / mu).sqrt())
        } else {
            None
        }
    }
}

/// Physical properties that drive drag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpacecraftProperties {
    /// Mass in kilograms
    pub mass_kg: f64,

    /// Cross-sectional area in m²
    pub area_m2: f64,

    /// Drag coefficient (dimensionless, typically 2.0-2.5)
    pub drag_coefficient: f64,

    /// Optional ballistic coefficient m / (Cd × A) in kg/m², overrides the
    /// mass/area/Cd combination when set
    #[serde(default)]
    pub ballistic_coefficient: Option<f64>,
}

impl Default for SpacecraftProperties {
    /// Small satellite: 100 kg, 1 m², Cd 2.2
    fn default() -> Self {
        Self {
            mass_kg: 100.0,
            area_m2: 1.0,
            drag_coefficient: 2.2,
            ballistic_coefficient: None,
        }
    }
}

impl SpacecraftProperties {
    pub fn new(mass_kg: f64, area_m2: f64, drag_coefficient: f64) -> Self {
        Self {
            mass_kg,
            area_m2,
            drag_coefficient,
            ballistic_coefficient: None,
        }
    }

    pub fn with_ballistic_coefficient(mut self, ballistic_coefficient: f64) -> Self {
        self.ballistic_coefficient = Some(ballistic_coefficient);
        self
    }

    pub fn validate(&self) -> Result<(), SatelliteError> {
        let checks = [
            ("mass", self.mass_kg),
            ("cross-sectional area", self.area_m2),
            ("drag coefficient", self.drag_coefficient),
        ];
        for (field, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(SatelliteError::InvalidParameter { field, value });
            }
        }
        if let Some(b) = self.ballistic_coefficient {
            if !b.is_finite() || b <= 0.0 {
                return Err(SatelliteError::InvalidParameter {
                    field: "ballistic coefficient",
                    value: b,
                });
            }
        }
        Ok(())
    }

    /// Ballistic coefficient m / (Cd × A) in kg/m²
    ///
    /// Lower values mean more drag, faster decay.
    pub fn ballistic_coefficient(&self) -> f64 {
        if let Some(b) = self.ballistic_coefficient {
            return b;
        }
        let cd_area = self.drag_coefficient * self.area_m2;
        if cd_area > 0.0 {
            self.mass_kg / cd_area
        } else {
            f64::INFINITY
        }
    }

    /// Cd × A / m in km²/kg, ready to multiply by kg/km³ × (km/s)²
    pub fn drag_factor(&self) -> f64 {
        M2_TO_KM2 / self.ballistic_coefficient()
    }
}

/// Everything the force models need to know about a spacecraft
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpacecraftState {
    /// State relative to `central_body`, ecliptic axes
    pub orbital: OrbitalState,

    pub central_body: BodyId,

    pub properties: SpacecraftProperties,
}

impl SpacecraftState {
    pub fn new(orbital: OrbitalState, central_body: BodyId, properties: SpacecraftProperties) -> Self {
        Self {
            orbital,
            central_body,
            properties,
        }
    }

    /// Spacecraft with default physical properties
    pub fn with_defaults(orbital: OrbitalState, central_body: BodyId) -> Self {
        Self::new(orbital, central_body, SpacecraftProperties::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MU_EARTH: f64 = 398_600.4418;

    #[test]
    fn test_circular_orbit_quantities() {
        let r = 6371.0 + 420.0;
        let v = (MU_EARTH / r).sqrt();
        let state = OrbitalState::new(
            Vector3::new(r, 0.0, 0.0),
            Vector3::new(0.0, v, 0.0),
            Epoch::J2000,
        );

        assert!((state.speed() - 7.66).abs() < 0.1);
        assert!((state.semi_major_axis(MU_EARTH) - r).abs() < 1e-6);

        let period = state.period(MU_EARTH).unwrap();
        assert!((period / 60.0 - 92.0).abs() < 2.0);
    }

    #[test]
    fn test_relative_and_offset_are_inverse() {
        let a = OrbitalState::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.1, 0.2, 0.3),
            Epoch::J2000,
        );
        let origin = OrbitalState::new(
            Vector3::new(-5.0, 4.0, 1.0),
            Vector3::new(1.0, 0.0, -1.0),
            Epoch::J2000,
        );
        let back = a.relative_to(&origin).offset_by(&origin);
        assert!((back.position - a.position).norm() < 1e-12);
        assert!((back.velocity - a.velocity).norm() < 1e-12);
    }

    #[test]
    fn test_drag_factor_units() {
        let props = SpacecraftProperties::new(1000.0, 10.0, 2.2);
        assert!((props.ballistic_coefficient() - 1000.0 / 22.0).abs() < 1e-12);
        assert!((props.drag_factor() - 2.2e-8).abs() < 1e-20);

        let overridden = props.with_ballistic_coefficient(50.0);
        assert!((overridden.drag_factor() - 1e-6 / 50.0).abs() < 1e-20);
    }

    #[test]
    fn test_invalid_properties_rejected() {
        let props = SpacecraftProperties::new(0.0, 1.0, 2.2);
        assert!(props.validate().is_err());
        let props = SpacecraftProperties::new(10.0, f64::NAN, 2.2);
        assert!(props.validate().is_err());
        assert!(SpacecraftProperties::default().validate().is_ok());
    }
}
