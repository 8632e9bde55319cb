//! Central-body gravity: point mass and J2 oblateness

use nalgebra::{Matrix3, Vector3};

use super::{ForceContext, ForceModel};
use crate::bodies::CelestialBody;
use crate::error::Diagnostic;
use crate::propagation::state::SpacecraftState;
use crate::time::Epoch;

/// Below this distance (km) the central terms are left out
const MIN_RADIUS: f64 = 1e-3;

/// Point mass attraction: a = -μ/r³ × r
#[derive(Debug, Clone, Copy, Default)]
pub struct CentralGravity;

impl ForceModel for CentralGravity {
    fn acceleration(
        &self,
        state: &SpacecraftState,
        context: &ForceContext,
        _diagnostics: &mut Vec<Diagnostic>,
    ) -> Vector3<f64> {
        let position = &state.orbital.position;
        let r = position.norm();
        if r < MIN_RADIUS {
            return Vector3::zeros();
        }
        -context.central.gm / (r * r * r) * position
    }

    fn name(&self) -> &'static str {
        "Central Gravity"
    }

    fn description(&self) -> &'static str {
        "Point-mass attraction of the central body"
    }
}

/// Second zonal harmonic of the central body
///
/// Evaluated in the body's equatorial frame and rotated back. Bodies
/// without a J2 coefficient or radius contribute nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct J2Oblateness;

impl J2Oblateness {
    /// Rotation from ecliptic axes into the body's equator frame
    fn equator_frame(body: &CelestialBody, epoch: Epoch) -> Matrix3<f64> {
        body.orientation
            .map(|o| o.ecliptic_to_equator(epoch))
            .unwrap_or_else(Matrix3::identity)
    }
}

impl ForceModel for J2Oblateness {
    fn acceleration(
        &self,
        state: &SpacecraftState,
        context: &ForceContext,
        _diagnostics: &mut Vec<Diagnostic>,
    ) -> Vector3<f64> {
        let central = context.central;
        let Some(j2) = central.j2 else {
            return Vector3::zeros();
        };
        if j2 == 0.0 || central.radius <= 0.0 {
            return Vector3::zeros();
        }

        let to_equator = Self::equator_frame(central, state.orbital.epoch);
        let p = to_equator * state.orbital.position;
        let r = p.norm();
        if r < MIN_RADIUS {
            return Vector3::zeros();
        }

        let r2 = r * r;
        let r5 = r2 * r2 * r;
        let factor = 1.5 * j2 * central.gm * central.radius * central.radius / r5;
        let z2_r2 = (p.z * p.z) / r2;

        let local = Vector3::new(
            factor * p.x * (5.0 * z2_r2 - 1.0),
            factor * p.y * (5.0 * z2_r2 - 1.0),
            factor * p.z * (5.0 * z2_r2 - 3.0),
        );
        to_equator.transpose() * local
    }

    fn name(&self) -> &'static str {
        "J2 Oblateness"
    }

    fn description(&self) -> &'static str {
        "Second zonal harmonic of the central body"
    }
}
