//! Force models for orbital mechanics
//!
//! This module provides composable force models that can be combined
//! to create a complete dynamics model for orbit propagation.
//!
//! # Architecture
//!
//! Each force model implements the `ForceModel` trait, which computes
//! the acceleration contribution at a given spacecraft state. Positions are
//! relative to the spacecraft's central body, J2000 ecliptic axes, km.
//!
//! Multiple models are combined using `CompositeForce`, which sums
//! all enabled force contributions.
//!
//! # Available Models
//!
//! - **CentralGravity**: point-mass attraction of the central body
//! - **J2Oblateness**: second zonal harmonic of the central body
//! - **AtmosphericDrag**: drag through the central body's co-rotating atmosphere
//! - **ThirdBodyPerturbation**: differential pull of every other massive body

mod drag;
mod gravity;
mod third_body;

pub use drag::AtmosphericDrag;
pub use gravity::{CentralGravity, J2Oblateness};
pub use third_body::ThirdBodyPerturbation;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::bodies::{BodyRegistry, CelestialBody};
use crate::error::Diagnostic;
use crate::propagation::state::SpacecraftState;

/// Which perturbations are active on top of central gravity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceOptions {
    pub include_j2: bool,
    pub include_drag: bool,
    pub include_third_body: bool,
}

impl Default for ForceOptions {
    fn default() -> Self {
        Self {
            include_j2: true,
            include_drag: true,
            include_third_body: true,
        }
    }
}

impl ForceOptions {
    /// Central gravity only
    pub fn two_body() -> Self {
        Self {
            include_j2: false,
            include_drag: false,
            include_third_body: false,
        }
    }
}

/// Bodies visible to a force evaluation
///
/// The registry is a frozen snapshot for the duration of one step.
pub struct ForceContext<'a> {
    pub bodies: &'a BodyRegistry,
    pub central: &'a CelestialBody,
}

/// Trait for force model contributions
///
/// Models should be thread-safe so a composite can move to a worker thread.
pub trait ForceModel: Send + Sync {
    /// Acceleration contribution in km/s²
    ///
    /// Missing optional data (no J2, no atmosphere, a body without a state)
    /// yields a zero contribution; anything worth reporting goes into
    /// `diagnostics`.
    fn acceleration(
        &self,
        state: &SpacecraftState,
        context: &ForceContext,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vector3<f64>;

    /// Force model name for debugging and logging
    fn name(&self) -> &'static str;

    /// Brief description of the model
    fn description(&self) -> &'static str {
        self.name()
    }

    /// Disabled models are skipped during acceleration computation
    fn enabled(&self) -> bool {
        true
    }
}

/// Total acceleration plus the conditions met while computing it
#[derive(Debug, Clone, PartialEq)]
pub struct AccelerationResult {
    pub acceleration: Vector3<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Composite force model that aggregates multiple force contributions
pub struct CompositeForce {
    forces: Vec<Box<dyn ForceModel>>,
}

impl Default for CompositeForce {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeForce")
            .field("forces", &self.model_names())
            .finish()
    }
}

impl CompositeForce {
    /// Create an empty composite force model
    pub fn new() -> Self {
        Self { forces: Vec::new() }
    }

    /// Central gravity plus whatever `options` enables
    pub fn from_options(options: &ForceOptions) -> Self {
        let mut builder = Self::builder().with(Box::new(CentralGravity));
        if options.include_j2 {
            builder = builder.with(Box::new(J2Oblateness));
        }
        if options.include_drag {
            builder = builder.with(Box::new(AtmosphericDrag));
        }
        if options.include_third_body {
            builder = builder.with(Box::new(ThirdBodyPerturbation));
        }
        builder.build()
    }

    pub fn add(&mut self, force: Box<dyn ForceModel>) {
        log::debug!("Adding force model: {}", force.name());
        self.forces.push(force);
    }

    pub fn builder() -> CompositeForceBuilder {
        CompositeForceBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn model_names(&self) -> Vec<&'static str> {
        self.forces.iter().map(|f| f.name()).collect()
    }

    /// Sum of all enabled forces with the diagnostics they raised
    ///
    /// An unknown central body contributes nothing and is reported once;
    /// every term is measured from the central body, so none can be
    /// evaluated without it.
    pub fn evaluate(&self, state: &SpacecraftState, bodies: &BodyRegistry) -> AccelerationResult {
        let mut diagnostics = Vec::new();
        let Some(central) = bodies.get(state.central_body) else {
            diagnostics.push(Diagnostic::MissingCentralBody {
                body: state.central_body,
            });
            return AccelerationResult {
                acceleration: Vector3::zeros(),
                diagnostics,
            };
        };
        let context = ForceContext { bodies, central };

        let acceleration = self
            .forces
            .iter()
            .filter(|f| f.enabled())
            .map(|f| f.acceleration(state, &context, &mut diagnostics))
            .fold(Vector3::zeros(), |acc, a| acc + a);

        AccelerationResult {
            acceleration,
            diagnostics,
        }
    }

    /// Total acceleration, dropping diagnostics
    pub fn total_acceleration(&self, state: &SpacecraftState, bodies: &BodyRegistry) -> Vector3<f64> {
        self.evaluate(state, bodies).acceleration
    }

    /// Individual contributions for debugging
    pub fn acceleration_breakdown(
        &self,
        state: &SpacecraftState,
        bodies: &BodyRegistry,
    ) -> Vec<(&'static str, Vector3<f64>)> {
        let Some(central) = bodies.get(state.central_body) else {
            return Vec::new();
        };
        let context = ForceContext { bodies, central };
        let mut sink = Vec::new();
        self.forces
            .iter()
            .filter(|f| f.enabled())
            .map(|f| (f.name(), f.acceleration(state, &context, &mut sink)))
            .collect()
    }
}

/// Builder for CompositeForce
pub struct CompositeForceBuilder {
    forces: Vec<Box<dyn ForceModel>>,
}

impl CompositeForceBuilder {
    fn new() -> Self {
        Self { forces: Vec::new() }
    }

    pub fn with(mut self, force: Box<dyn ForceModel>) -> Self {
        self.forces.push(force);
        self
    }

    pub fn build(self) -> CompositeForce {
        CompositeForce {
            forces: self.forces,
        }
    }
}

/// One-shot acceleration for a state under the given options
pub fn compute_acceleration(
    state: &SpacecraftState,
    bodies: &BodyRegistry,
    options: &ForceOptions,
) -> AccelerationResult {
    CompositeForce::from_options(options).evaluate(state, bodies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::test_support::*;
    use crate::propagation::OrbitalState;
    use crate::time::Epoch;

    fn leo_state(central: i32) -> SpacecraftState {
        let r = R_EARTH + 400.0;
        SpacecraftState::with_defaults(
            OrbitalState::new(
                Vector3::new(r, 0.0, 0.0),
                Vector3::new(0.0, (MU_EARTH / r).sqrt(), 0.0),
                Epoch::J2000,
            ),
            central,
        )
    }

    #[test]
    fn test_composite_force_empty() {
        let forces = CompositeForce::new();
        assert!(forces.is_empty());
        let registry = earth_only();
        assert_eq!(forces.total_acceleration(&leo_state(399), &registry), Vector3::zeros());
    }

    #[test]
    fn test_two_body_points_at_center() {
        let registry = earth_only();
        let state = leo_state(399);
        let result = compute_acceleration(&state, &registry, &ForceOptions::two_body());

        assert!(result.diagnostics.is_empty());
        let a = result.acceleration;
        assert!(a.x < 0.0);
        assert!(a.y.abs() < 1e-15 && a.z.abs() < 1e-15);

        let r = state.orbital.radius();
        let expected = MU_EARTH / (r * r);
        assert!((a.norm() - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_missing_central_body_is_diagnosed() {
        let registry = earth_only();
        let result = compute_acceleration(&leo_state(499), &registry, &ForceOptions::default());
        assert_eq!(result.acceleration, Vector3::zeros());
        assert_eq!(
            result.diagnostics,
            vec![Diagnostic::MissingCentralBody { body: 499 }]
        );
    }

    #[test]
    fn test_breakdown_matches_total() {
        let registry = earth_only();
        let state = leo_state(399);
        let forces = CompositeForce::from_options(&ForceOptions::default());
        assert_eq!(forces.model_names().len(), 4);

        let sum = forces
            .acceleration_breakdown(&state, &registry)
            .into_iter()
            .fold(Vector3::zeros(), |acc, (_, a)| acc + a);
        assert!((sum - forces.total_acceleration(&state, &registry)).norm() < 1e-18);
    }
}
