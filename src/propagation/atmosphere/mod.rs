//! Atmospheric density models for drag calculations
//!
//! Models are keyed on altitude above the central body's reference surface
//! and return density in kg/km³, so drag can be computed directly in
//! km/s² without unit juggling at the call site.
//!
//! # Implemented Models
//!
//! - **Exponential**: single scale height about a reference altitude, clamped
//!   to an active altitude band

mod exponential;

pub use exponential::ExponentialAtmosphere;

use std::fmt::Debug;

/// Trait for atmospheric density models
///
/// Implementations must be thread-safe (Send + Sync) so bodies can be
/// shared with background propagation workers.
pub trait AtmosphereModel: Send + Sync + Debug {
    /// Density in kg/km³ at `altitude_km` above the surface
    ///
    /// Never fails: non-finite or out-of-band altitudes give zero.
    fn density(&self, altitude_km: f64) -> f64;

    /// Model name for logging and display
    fn name(&self) -> &'static str;

    /// Brief description of the model
    fn description(&self) -> &'static str {
        "Atmospheric density model"
    }

    /// Lowest altitude with non-zero density (km)
    fn min_altitude(&self) -> f64;

    /// Highest altitude with non-zero density (km)
    fn max_altitude(&self) -> f64;

    /// Whether drag needs evaluating at this altitude
    fn is_active(&self, altitude_km: f64) -> bool {
        altitude_km >= self.min_altitude() && altitude_km <= self.max_altitude()
    }
}
