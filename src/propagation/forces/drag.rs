//! Atmospheric drag force model
//!
//! Computes acceleration due to atmospheric drag using the formula:
//!
//! a = -½ ρ |v_rel| v_rel / B
//!
//! where:
//! - ρ is density from the central body's atmosphere model (kg/km³)
//! - v_rel is velocity relative to the co-rotating atmosphere (km/s)
//! - B is the ballistic coefficient m / (Cd × A), with A converted to km²

use nalgebra::Vector3;

use super::{ForceContext, ForceModel};
use crate::bodies::CelestialBody;
use crate::error::Diagnostic;
use crate::propagation::state::{OrbitalState, SpacecraftState};

/// Drag through the central body's atmosphere, if it has one
#[derive(Debug, Clone, Copy, Default)]
pub struct AtmosphericDrag;

/// Velocity relative to the atmosphere co-rotating with `body`
///
/// `state` is body-centered. The atmosphere moves with ω × r.
pub fn relative_velocity(body: &CelestialBody, state: &OrbitalState) -> Vector3<f64> {
    let omega = body.angular_velocity(state.epoch);
    state.velocity - omega.cross(&state.position)
}

impl ForceModel for AtmosphericDrag {
    fn acceleration(
        &self,
        state: &SpacecraftState,
        context: &ForceContext,
        _diagnostics: &mut Vec<Diagnostic>,
    ) -> Vector3<f64> {
        let central = context.central;
        let Some(atmosphere) = &central.atmosphere else {
            return Vector3::zeros();
        };

        let altitude = central.altitude(&state.orbital.position, state.orbital.epoch);
        let density = atmosphere.density(altitude);
        if density <= 0.0 {
            return Vector3::zeros();
        }

        let v_rel = relative_velocity(central, &state.orbital);
        let speed = v_rel.norm();
        if speed == 0.0 {
            return Vector3::zeros();
        }

        -0.5 * density * speed * state.properties.drag_factor() * v_rel
    }

    fn name(&self) -> &'static str {
        "Atmospheric Drag"
    }

    fn description(&self) -> &'static str {
        "Aerodynamic drag from atmospheric density"
    }
}
