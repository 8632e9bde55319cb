//! Exponential atmospheric density model
//!
//! The simplest atmosphere model, using an exponential density decay
//! with a single scale height. Fast but not very accurate.

use super::AtmosphereModel;

/// Exponential atmosphere model
///
/// ρ(h) = ρ_ref × exp(-(h - h_ref) / H) inside [min_altitude, max_altitude],
/// zero outside.
///
/// This ignores temperature, day/night and solar activity effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialAtmosphere {
    /// Altitude at which `reference_density` applies (km)
    pub reference_altitude: f64,

    /// Density at the reference altitude (kg/km³)
    pub reference_density: f64,

    /// Scale height (km)
    pub scale_height: f64,

    /// Density floor: below this altitude density is zero (km)
    pub min_altitude: f64,

    /// Density ceiling: above this altitude density is zero (km)
    pub max_altitude: f64,
}

impl ExponentialAtmosphere {
    pub fn new(
        reference_altitude: f64,
        reference_density: f64,
        scale_height: f64,
        min_altitude: f64,
        max_altitude: f64,
    ) -> Self {
        Self {
            reference_altitude,
            reference_density,
            scale_height,
            min_altitude,
            max_altitude,
        }
    }

    /// Thermospheric Earth atmosphere fitted around 200 km
    pub fn earth() -> Self {
        Self::new(200.0, 3.5e-3, 60.0, 100.0, 1000.0)
    }

    /// Mars surface-referenced atmosphere
    pub fn mars() -> Self {
        Self::new(0.0, 2.0e7, 11.1, 0.0, 250.0)
    }

    /// Reason the parameters are unusable, if any
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            self.reference_altitude,
            self.reference_density,
            self.scale_height,
            self.min_altitude,
            self.max_altitude,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err("atmosphere parameters must be finite".to_string());
        }
        if self.reference_density < 0.0 {
            return Err(format!(
                "reference density must be non-negative, got {}",
                self.reference_density
            ));
        }
        if self.scale_height <= 0.0 {
            return Err(format!(
                "scale height must be positive, got {}",
                self.scale_height
            ));
        }
        if self.min_altitude > self.max_altitude {
            return Err(format!(
                "altitude band is empty ({} > {})",
                self.min_altitude, self.max_altitude
            ));
        }
        Ok(())
    }
}

impl AtmosphereModel for ExponentialAtmosphere {
    fn density(&self, altitude_km: f64) -> f64 {
        if !altitude_km.is_finite() || !self.is_active(altitude_km) {
            return 0.0;
        }
        self.reference_density * (-(altitude_km - self.reference_altitude) / self.scale_height).exp()
    }

    fn name(&self) -> &'static str {
        "Exponential"
    }

    fn description(&self) -> &'static str {
        "Simple exponential density decay"
    }

    fn min_altitude(&self) -> f64 {
        self.min_altitude.max(0.0)
    }

    fn max_altitude(&self) -> f64 {
        self.max_altitude
    }
}
