//! Third-body gravitational perturbations
//!
//! Every massive body other than the central one perturbs the satellite by
//! the difference between its pull on the satellite and its pull on the
//! central body:
//!
//! a = GM_k (d_k / |d_k|³ - s_k / |s_k|³)
//!
//! where s_k is the body relative to the central body and d_k is the body
//! relative to the satellite. Using the difference keeps the central body's
//! own acceleration from being counted twice.

use nalgebra::Vector3;

use super::{ForceContext, ForceModel};
use crate::error::Diagnostic;
use crate::propagation::state::SpacecraftState;

#[derive(Debug, Clone, Copy, Default)]
pub struct ThirdBodyPerturbation;

impl ForceModel for ThirdBodyPerturbation {
    fn acceleration(
        &self,
        state: &SpacecraftState,
        context: &ForceContext,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vector3<f64> {
        let central = context.central;
        let Some(central_state) = central.state else {
            diagnostics.push(Diagnostic::MissingBodyState { body: central.id });
            return Vector3::zeros();
        };

        let mut total = Vector3::zeros();
        for body in context.bodies.iter() {
            if body.id == central.id || body.is_barycenter() || body.gm <= 0.0 {
                continue;
            }
            let Some(body_state) = body.state else {
                if !body.sources.skip {
                    diagnostics.push(Diagnostic::MissingBodyState { body: body.id });
                }
                continue;
            };

            let s = body_state.position - central_state.position;
            let d = s - state.orbital.position;
            let s_norm = s.norm();
            let d_norm = d.norm();
            if s_norm == 0.0 || d_norm == 0.0 {
                continue;
            }
            total += body.gm * (d / (d_norm * d_norm * d_norm) - s / (s_norm * s_norm * s_norm));
        }
        total
    }

    fn name(&self) -> &'static str {
        "Third Body"
    }

    fn description(&self) -> &'static str {
        "Differential attraction of all other massive bodies"
    }
}
