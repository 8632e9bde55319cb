//! Numerical orbit propagator
//!
//! Orchestrates the integrator and the force models. A single step treats
//! the body registry as a frozen snapshot; the bulk [`Trajectory`] owns a
//! copy of the registry and moves every body forward between steps, so the
//! bodies always sit where they are at the propagated time.

use std::cell::RefCell;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::Vector3;
use serde::Serialize;

use super::forces::CompositeForce;
use super::integrator::{Integrator, NativeRK4};
use super::settings::{PropagatorConfig, SimulationSettings};
use super::soi::{check_soi, SoiTransition};
use super::state::{OrbitalState, SpacecraftState};
use crate::bodies::{BodyId, BodyRegistry};
use crate::ephemeris::StateVectorCalculator;
use crate::error::{Diagnostic, PropagationError, SatelliteError};
use crate::maneuver::{ManeuverId, ManeuverPlan};
use crate::simulation::SatelliteId;
use crate::time::Epoch;

/// Remaining durations shorter than this (seconds) count as arrived
const TIME_EPSILON: f64 = 1e-6;

/// Cooperative cancellation flag shared with a running propagation
///
/// Checked between steps, never inside one.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One bulk propagation output point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectorySample {
    pub time: Epoch,
    /// Body the position and velocity are relative to
    pub central_body: BodyId,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl TrajectorySample {
    fn from_state(state: &SpacecraftState) -> Self {
        Self {
            time: state.orbital.epoch,
            central_body: state.central_body,
            position: state.orbital.position,
            velocity: state.orbital.velocity,
        }
    }

    pub fn orbital(&self) -> OrbitalState {
        OrbitalState::new(self.position, self.velocity, self.time)
    }
}

/// How a bulk propagation ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PropagationStatus {
    Completed,
    /// Position or velocity went NaN/Inf on the step ending at `time`
    NonFinite { time: Epoch },
    Cancelled,
    MaxStepsExceeded,
}

/// Everything needed to start a bulk propagation
#[derive(Debug, Clone)]
pub struct PropagationRequest {
    pub initial: SpacecraftState,

    /// Seconds to propagate forward
    pub duration: f64,

    /// Step size override (seconds); the configured step otherwise
    pub step: Option<f64>,

    pub maneuvers: ManeuverPlan,

    /// Satellite the request belongs to, for diagnostics
    pub satellite: Option<SatelliteId>,
}

impl PropagationRequest {
    pub fn new(initial: SpacecraftState, duration: f64) -> Self {
        Self {
            initial,
            duration,
            step: None,
            maneuvers: ManeuverPlan::default(),
            satellite: None,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_maneuvers(mut self, maneuvers: ManeuverPlan) -> Self {
        self.maneuvers = maneuvers;
        self
    }

    pub fn for_satellite(mut self, id: SatelliteId) -> Self {
        self.satellite = Some(id);
        self
    }
}

/// Collected output of a bulk propagation
#[derive(Debug, Clone, Serialize)]
pub struct PropagationResult {
    pub samples: Vec<TrajectorySample>,
    pub status: PropagationStatus,

    /// Last finite state reached
    pub final_state: SpacecraftState,

    /// Distinct conditions met along the way
    pub diagnostics: Vec<Diagnostic>,

    pub soi_transitions: Vec<SoiTransition>,
    pub executed_maneuvers: Vec<ManeuverId>,

    /// Integration steps taken
    pub steps: usize,

    pub satellite: Option<SatelliteId>,
}

impl PropagationResult {
    pub fn is_complete(&self) -> bool {
        self.status == PropagationStatus::Completed
    }

    /// Turn an interrupted run into the matching error
    pub fn check(&self) -> Result<(), PropagationError> {
        match self.status {
            PropagationStatus::Completed => Ok(()),
            PropagationStatus::NonFinite { time } => Err(PropagationError::NonFiniteState {
                satellite: self.satellite,
                time,
            }),
            PropagationStatus::Cancelled => Err(PropagationError::Cancelled),
            PropagationStatus::MaxStepsExceeded => Err(PropagationError::MaxStepsExceeded(self.steps)),
        }
    }
}

/// Outcome of integrating one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: SpacecraftState,
    pub diagnostics: Vec<Diagnostic>,
}

impl StepOutcome {
    pub fn is_finite(&self) -> bool {
        self.state.orbital.is_finite()
    }
}

/// Reject a spacecraft that cannot be propagated against `bodies`
pub fn validate_spacecraft(state: &SpacecraftState, bodies: &BodyRegistry) -> Result<(), SatelliteError> {
    if !state.orbital.position.iter().all(|c| c.is_finite()) {
        return Err(SatelliteError::NonFiniteState { field: "position" });
    }
    if !state.orbital.velocity.iter().all(|c| c.is_finite()) {
        return Err(SatelliteError::NonFiniteState { field: "velocity" });
    }
    if !state.orbital.epoch.is_finite() {
        return Err(SatelliteError::NonFiniteState { field: "epoch" });
    }
    state.properties.validate()?;

    match bodies.get(state.central_body) {
        None => Err(SatelliteError::UnknownCentralBody(state.central_body)),
        Some(body) if body.is_barycenter() => Err(SatelliteError::BarycenterCentralBody(body.id)),
        Some(_) => Ok(()),
    }
}

/// Keep the first occurrence of each diagnostic
pub(crate) fn push_unique(into: &mut Vec<Diagnostic>, diagnostics: impl IntoIterator<Item = Diagnostic>) {
    for diagnostic in diagnostics {
        if !into.contains(&diagnostic) {
            into.push(diagnostic);
        }
    }
}

/// Numerical orbit propagator
///
/// Combines a numerical integrator with force models and a state-vector
/// calculator for moving the bodies during bulk runs.
pub struct Propagator {
    /// Numerical integrator (swappable at runtime)
    integrator: Box<dyn Integrator>,

    forces: CompositeForce,

    config: PropagatorConfig,

    calculator: StateVectorCalculator,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("integrator", &self.integrator.name())
            .field("forces", &self.forces)
            .field("config", &self.config)
            .finish()
    }
}

impl Propagator {
    /// Create a propagator with the default configuration
    pub fn new(integrator: impl Integrator + 'static, forces: CompositeForce) -> Self {
        Self {
            integrator: Box::new(integrator),
            forces,
            config: PropagatorConfig::default(),
            calculator: StateVectorCalculator::default(),
        }
    }

    pub fn with_config(
        integrator: Box<dyn Integrator>,
        forces: CompositeForce,
        config: PropagatorConfig,
        calculator: StateVectorCalculator,
    ) -> Self {
        Self {
            integrator,
            forces,
            config,
            calculator,
        }
    }

    /// RK4 with the forces, step sizes and fallback from `settings`
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        let forces = CompositeForce::from_options(&settings.forces);
        log::debug!("Propagator forces: {:?}", forces.model_names());
        Self::with_config(
            Box::new(NativeRK4::new()),
            forces,
            settings.propagator,
            StateVectorCalculator::new(settings.fallback),
        )
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PropagatorConfig {
        &mut self.config
    }

    pub fn forces(&self) -> &CompositeForce {
        &self.forces
    }

    pub fn calculator(&self) -> &StateVectorCalculator {
        &self.calculator
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }

    /// Advance `state` by `dt` seconds against a frozen set of bodies
    ///
    /// `bodies` must hold the body states at the spacecraft's epoch. The
    /// result may be non-finite; callers decide what to do with that.
    pub fn step(&self, state: &SpacecraftState, bodies: &BodyRegistry, dt: f64) -> StepOutcome {
        let diagnostics = RefCell::new(Vec::new());
        let derivatives = |orbital: &OrbitalState| {
            let trial = SpacecraftState {
                orbital: *orbital,
                ..*state
            };
            let result = self.forces.evaluate(&trial, bodies);
            push_unique(&mut diagnostics.borrow_mut(), result.diagnostics);
            (orbital.velocity, result.acceleration)
        };

        let orbital = if self.config.adaptive {
            self.adaptive_substeps(&state.orbital, dt, &derivatives)
        } else {
            self.integrator.step(&state.orbital, dt, &derivatives)
        };

        StepOutcome {
            state: SpacecraftState { orbital, ..*state },
            diagnostics: diagnostics.into_inner(),
        }
    }

    /// Cover `dt` with error-controlled sub-steps
    fn adaptive_substeps(
        &self,
        start: &OrbitalState,
        dt: f64,
        derivatives: &super::integrator::Derivatives,
    ) -> OrbitalState {
        let end = start.epoch + dt;
        let mut current = *start;
        let mut h = dt;

        loop {
            let remaining = end - current.epoch;
            if remaining <= TIME_EPSILON {
                break;
            }
            let result = self.integrator.adaptive_step(
                &current,
                h.min(remaining),
                self.config.tolerance,
                derivatives,
            );
            if !result.success {
                return result.state;
            }
            current = result.state;
            h = (result.dt_used * 2.0).min(dt);
        }

        current.epoch = end;
        current
    }

    /// Lazily propagate `request` forward from a copy of `bodies`
    pub fn trajectory(
        &self,
        request: PropagationRequest,
        bodies: &BodyRegistry,
    ) -> Result<Trajectory<'_>, PropagationError> {
        if request.duration < 0.0 {
            return Err(PropagationError::BackwardPropagation {
                requested: request.duration,
            });
        }
        if !request.duration.is_finite() {
            return Err(PropagationError::InvalidDuration(request.duration));
        }
        let step = request.step.unwrap_or(self.config.step_size);
        if !step.is_finite() || step <= 0.0 {
            return Err(PropagationError::InvalidStepSize(step));
        }
        validate_spacecraft(&request.initial, bodies)?;

        let start = request.initial.orbital.epoch;
        log::debug!(
            "Propagating {:.1} s from {} in {} s steps ({})",
            request.duration,
            start,
            step,
            self.integrator.name()
        );

        Ok(Trajectory {
            propagator: self,
            bodies: bodies.clone(),
            state: request.initial,
            maneuvers: request.maneuvers,
            satellite: request.satellite,
            end: start + request.duration,
            step,
            steps: 0,
            last_sample: start,
            cancel: None,
            initial_pending: true,
            status: None,
            diagnostics: Vec::new(),
            soi_transitions: Vec::new(),
            executed_maneuvers: Vec::new(),
        })
    }

    /// Run a bulk propagation to completion
    pub fn propagate(
        &self,
        request: PropagationRequest,
        bodies: &BodyRegistry,
    ) -> Result<PropagationResult, PropagationError> {
        Ok(self.trajectory(request, bodies)?.collect_result())
    }
}

/// Bulk propagation as an iterator of samples
///
/// Yields the initial state first, then one sample per step (or per
/// history interval). Ends at the requested duration or at the first
/// non-finite state, cancellation or step cap; [`Trajectory::status`] says
/// which. Once finished it keeps returning `None`.
pub struct Trajectory<'a> {
    propagator: &'a Propagator,
    bodies: BodyRegistry,
    state: SpacecraftState,
    maneuvers: ManeuverPlan,
    satellite: Option<SatelliteId>,
    end: Epoch,
    step: f64,
    steps: usize,
    last_sample: Epoch,
    cancel: Option<CancellationToken>,
    initial_pending: bool,
    status: Option<PropagationStatus>,
    diagnostics: Vec<Diagnostic>,
    soi_transitions: Vec<SoiTransition>,
    executed_maneuvers: Vec<ManeuverId>,
}

impl<'a> Trajectory<'a> {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// `None` while samples remain
    pub fn status(&self) -> Option<PropagationStatus> {
        self.status
    }

    pub fn state(&self) -> &SpacecraftState {
        &self.state
    }

    /// Integration steps taken so far, independent of how many were sampled
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn end(&self) -> Epoch {
        self.end
    }

    /// Number of steps needed to reach the end at the nominal step size
    pub fn expected_steps(&self) -> usize {
        let remaining = (self.end - self.state.orbital.epoch).max(0.0);
        (remaining / self.step).ceil() as usize
    }

    /// Drain the remaining samples into a result
    pub fn collect_result(mut self) -> PropagationResult {
        let samples: Vec<_> = self.by_ref().collect();
        self.into_result(samples)
    }

    /// Finish with samples the caller already collected
    pub fn into_result(mut self, samples: Vec<TrajectorySample>) -> PropagationResult {
        // Run out any steps the caller did not consume
        self.by_ref().for_each(drop);
        let status = self.status.unwrap_or(PropagationStatus::Completed);
        log::info!(
            "Propagation finished after {} steps with {:?} ({} samples, {} diagnostics)",
            self.steps,
            status,
            samples.len(),
            self.diagnostics.len()
        );
        PropagationResult {
            samples,
            status,
            final_state: self.state,
            diagnostics: self.diagnostics,
            soi_transitions: self.soi_transitions,
            executed_maneuvers: self.executed_maneuvers,
            steps: self.steps,
            satellite: self.satellite,
        }
    }

    fn finish(&mut self, status: PropagationStatus) -> Option<TrajectorySample> {
        self.status = Some(status);
        None
    }

    fn refresh_bodies(&mut self, epoch: Epoch) {
        if self.bodies.state_epoch() == Some(epoch) {
            return;
        }
        let report = self.propagator.calculator.update_all(&mut self.bodies, epoch);
        push_unique(&mut self.diagnostics, report.diagnostics);
    }
}

impl Iterator for Trajectory<'_> {
    type Item = TrajectorySample;

    fn next(&mut self) -> Option<TrajectorySample> {
        if self.status.is_some() {
            return None;
        }
        if self.initial_pending {
            self.initial_pending = false;
            return Some(TrajectorySample::from_state(&self.state));
        }

        loop {
            let now = self.state.orbital.epoch;
            let remaining = self.end - now;
            if remaining <= TIME_EPSILON {
                return self.finish(PropagationStatus::Completed);
            }
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                log::info!("Propagation cancelled at {}", now);
                return self.finish(PropagationStatus::Cancelled);
            }
            if self.steps >= self.propagator.config.max_steps {
                log::warn!("Propagation hit the {} step cap at {}", self.steps, now);
                return self.finish(PropagationStatus::MaxStepsExceeded);
            }

            let h = self.step.min(remaining);
            self.refresh_bodies(now);

            let mut rejected = Vec::new();
            let fired = self.maneuvers.fire_due(&mut self.state.orbital, now, h, &mut rejected);
            self.executed_maneuvers.extend(fired);
            push_unique(&mut self.diagnostics, rejected);

            let outcome = self.propagator.step(&self.state, &self.bodies, h);
            push_unique(&mut self.diagnostics, outcome.diagnostics.iter().cloned());
            self.steps += 1;

            let time = now + h;
            if !outcome.is_finite() {
                log::warn!("State became non-finite at {}, halting propagation", time);
                push_unique(
                    &mut self.diagnostics,
                    [Diagnostic::NonFiniteState {
                        satellite: self.satellite,
                        time,
                    }],
                );
                return self.finish(PropagationStatus::NonFinite { time });
            }
            self.state = outcome.state;

            self.refresh_bodies(time);
            if let Some(transition) = check_soi(&mut self.state, &self.bodies) {
                self.soi_transitions.push(transition);
            }

            let interval = self.propagator.config.history_interval;
            let at_end = self.end - time <= TIME_EPSILON;
            if interval <= 0.0 || at_end || time - self.last_sample >= interval - TIME_EPSILON {
                self.last_sample = time;
                return Some(TrajectorySample::from_state(&self.state));
            }
        }
    }
}

impl FusedIterator for Trajectory<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::test_support::*;
    use crate::maneuver::DeltaVFrame;
    use crate::propagation::forces::{CentralGravity, ForceContext, ForceModel, ForceOptions};
    use crate::propagation::state::SpacecraftProperties;

    fn propagator(options: ForceOptions, step: f64) -> Propagator {
        let settings = SimulationSettings {
            forces: options,
            propagator: PropagatorConfig::default().with_step(step),
            ..Default::default()
        };
        Propagator::from_settings(&settings)
    }

    fn circular(radius: f64, properties: SpacecraftProperties) -> SpacecraftState {
        SpacecraftState::new(
            OrbitalState::new(
                Vector3::new(radius, 0.0, 0.0),
                Vector3::new(0.0, (MU_EARTH / radius).sqrt(), 0.0),
                Epoch::J2000,
            ),
            399,
            properties,
        )
    }

    fn period(radius: f64) -> f64 {
        2.0 * std::f64::consts::PI * (radius.powi(3) / MU_EARTH).sqrt()
    }

    #[test]
    fn test_two_body_orbit_closes() {
        let registry = earth_only();
        let initial = circular(7000.0, SpacecraftProperties::default());
        let result = propagator(ForceOptions::two_body(), 10.0)
            .propagate(PropagationRequest::new(initial, period(7000.0)), &registry)
            .unwrap();

        assert!(result.is_complete());
        assert!(result.diagnostics.is_empty());
        let last = result.samples.last().unwrap();
        assert!((last.time - (Epoch::J2000 + period(7000.0))).abs() < 1e-6);
        let error = (last.position - initial.orbital.position).norm();
        assert!(error < 0.5, "closure error {} km", error);
    }

    #[test]
    fn test_two_body_energy_conserved() {
        let registry = earth_only();
        let mut initial = circular(8000.0, SpacecraftProperties::default());
        initial.orbital.velocity *= 1.1;
        let energy = initial.orbital.specific_energy(MU_EARTH);

        let result = propagator(ForceOptions::two_body(), 30.0)
            .propagate(PropagationRequest::new(initial, 5.0 * period(8000.0)), &registry)
            .unwrap();

        for sample in &result.samples {
            let e = sample.orbital().specific_energy(MU_EARTH);
            assert!(((e - energy) / energy).abs() < 0.01);
        }
    }

    #[test]
    fn test_samples_start_with_initial_state() {
        let registry = earth_only();
        let initial = circular(7000.0, SpacecraftProperties::default());
        let samples: Vec<_> = propagator(ForceOptions::two_body(), 60.0)
            .trajectory(PropagationRequest::new(initial, 600.0), &registry)
            .unwrap()
            .collect();

        assert_eq!(samples.len(), 11);
        assert_eq!(samples[0].time, Epoch::J2000);
        assert_eq!(samples[0].position, initial.orbital.position);
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_history_interval_thins_samples() {
        let registry = earth_only();
        let mut propagator = propagator(ForceOptions::two_body(), 10.0);
        propagator.config_mut().history_interval = 60.0;
        let result = propagator
            .propagate(
                PropagationRequest::new(circular(7000.0, SpacecraftProperties::default()), 605.0),
                &registry,
            )
            .unwrap();

        // Initial, every minute, and the final partial step
        assert_eq!(result.samples.len(), 12);
        assert_eq!(result.steps, 61);
    }

    #[test]
    fn test_step_count_advances_between_thinned_samples() {
        let registry = earth_only();
        let mut propagator = propagator(ForceOptions::two_body(), 10.0);
        propagator.config_mut().history_interval = 60.0;
        let request = PropagationRequest::new(circular(7000.0, SpacecraftProperties::default()), 605.0);
        let mut trajectory = propagator.trajectory(request, &registry).unwrap();
        let expected = trajectory.expected_steps();
        assert_eq!(expected, 61);

        let mut counts = Vec::new();
        while trajectory.next().is_some() {
            counts.push(trajectory.steps());
        }
        assert_eq!(counts.len(), 12);
        assert_eq!(counts[0], 0);
        assert_eq!(counts[1], 6);
        assert_eq!(*counts.last().unwrap(), expected);
    }

    fn drag_decay(altitude: f64) -> f64 {
        let registry = earth_only();
        let options = ForceOptions {
            include_j2: false,
            include_drag: true,
            include_third_body: false,
        };
        let r = R_EARTH + altitude;
        let initial = circular(r, SpacecraftProperties::new(1000.0, 10.0, 2.2));
        let result = propagator(options, 10.0)
            .propagate(PropagationRequest::new(initial, 86_400.0), &registry)
            .unwrap();
        assert!(result.is_complete());

        let a0 = initial.orbital.semi_major_axis(MU_EARTH);
        let a1 = result.final_state.orbital.semi_major_axis(MU_EARTH);
        a0 - a1
    }

    #[test]
    fn test_drag_decay_at_200_km() {
        let decay = drag_decay(200.0);
        assert!(decay > 0.05 && decay < 1.0, "decay {} km", decay);
    }

    #[test]
    fn test_drag_negligible_at_800_km() {
        let decay = drag_decay(800.0);
        assert!(decay >= 0.0 && decay < 0.01, "decay {} km", decay);
    }

    /// Central gravity that turns into NaN after a given time
    struct Blowup(Epoch);

    impl ForceModel for Blowup {
        fn acceleration(
            &self,
            state: &SpacecraftState,
            _context: &ForceContext,
            _diagnostics: &mut Vec<Diagnostic>,
        ) -> Vector3<f64> {
            if state.orbital.epoch > self.0 {
                Vector3::repeat(f64::NAN)
            } else {
                Vector3::zeros()
            }
        }

        fn name(&self) -> &'static str {
            "Blowup"
        }
    }

    #[test]
    fn test_non_finite_state_halts_with_partial_samples() {
        let registry = earth_only();
        let forces = CompositeForce::builder()
            .with(Box::new(CentralGravity))
            .with(Box::new(Blowup(Epoch::J2000 + 300.0)))
            .build();
        let mut propagator = Propagator::new(NativeRK4::new(), forces);
        propagator.config_mut().step_size = 60.0;

        let result = propagator
            .propagate(
                PropagationRequest::new(circular(7000.0, SpacecraftProperties::default()), 3600.0)
                    .for_satellite(7),
                &registry,
            )
            .unwrap();

        // Samples at 0..=300 s are clean; the step ending at 360 s is not
        assert_eq!(
            result.status,
            PropagationStatus::NonFinite {
                time: Epoch::J2000 + 360.0
            }
        );
        assert_eq!(result.samples.len(), 6);
        assert!(result.samples.iter().all(|s| s.orbital().is_finite()));
        assert!(result.final_state.orbital.is_finite());
        assert!(result.diagnostics.contains(&Diagnostic::NonFiniteState {
            satellite: Some(7),
            time: Epoch::J2000 + 360.0
        }));
        assert!(matches!(
            result.check(),
            Err(PropagationError::NonFiniteState { satellite: Some(7), .. })
        ));
    }

    #[test]
    fn test_cancellation_between_steps() {
        let registry = earth_only();
        let propagator = propagator(ForceOptions::two_body(), 60.0);
        let token = CancellationToken::new();
        let mut trajectory = propagator
            .trajectory(
                PropagationRequest::new(circular(7000.0, SpacecraftProperties::default()), 86_400.0),
                &registry,
            )
            .unwrap()
            .with_cancellation(token.clone());

        let first: Vec<_> = trajectory.by_ref().take(5).collect();
        token.cancel();
        assert!(trajectory.next().is_none());
        assert!(trajectory.next().is_none());
        assert_eq!(trajectory.status(), Some(PropagationStatus::Cancelled));

        let result = trajectory.into_result(first);
        assert_eq!(result.samples.len(), 5);
        assert_eq!(result.steps, 4);
        assert_eq!(result.check(), Err(PropagationError::Cancelled));
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let registry = earth_only();
        let propagator = propagator(ForceOptions::two_body(), 60.0);
        let good = circular(7000.0, SpacecraftProperties::default());

        assert!(matches!(
            propagator.propagate(PropagationRequest::new(good, -10.0), &registry),
            Err(PropagationError::BackwardPropagation { .. })
        ));
        assert!(matches!(
            propagator.propagate(PropagationRequest::new(good, 100.0).with_step(0.0), &registry),
            Err(PropagationError::InvalidStepSize(_))
        ));

        let mut bad = good;
        bad.orbital.velocity.y = f64::INFINITY;
        assert_eq!(
            propagator.propagate(PropagationRequest::new(bad, 100.0), &registry).unwrap_err(),
            PropagationError::Satellite(SatelliteError::NonFiniteState { field: "velocity" })
        );

        let mut orphan = good;
        orphan.central_body = 499;
        assert!(matches!(
            propagator.propagate(PropagationRequest::new(orphan, 100.0), &registry),
            Err(PropagationError::Satellite(SatelliteError::UnknownCentralBody(499)))
        ));
    }

    #[test]
    fn test_zero_duration_yields_only_initial_sample() {
        let registry = earth_only();
        let result = propagator(ForceOptions::two_body(), 60.0)
            .propagate(
                PropagationRequest::new(circular(7000.0, SpacecraftProperties::default()), 0.0),
                &registry,
            )
            .unwrap();
        assert_eq!(result.samples.len(), 1);
        assert_eq!(result.steps, 0);
        assert!(result.is_complete());
    }

    #[test]
    fn test_maneuver_fires_once_in_bulk_run() {
        let registry = earth_only();
        let initial = circular(7000.0, SpacecraftProperties::default());
        let mut plan = ManeuverPlan::new();
        plan.schedule(
            Epoch::J2000 + 125.0,
            Vector3::new(0.5, 0.0, 0.0),
            DeltaVFrame::Prograde,
            Epoch::J2000,
        )
        .unwrap();

        let result = propagator(ForceOptions::two_body(), 60.0)
            .propagate(
                PropagationRequest::new(initial, 1200.0).with_maneuvers(plan),
                &registry,
            )
            .unwrap();
        assert_eq!(result.executed_maneuvers, vec![0]);

        // Energy jumps once, at the 120 s boundary
        let energies: Vec<f64> = result
            .samples
            .iter()
            .map(|s| s.orbital().specific_energy(MU_EARTH))
            .collect();
        assert!((energies[2] - energies[0]).abs() < 1e-4);
        assert!(energies[3] - energies[2] > 1.0);
        assert!((energies[20] - energies[3]).abs() < 1e-4);
    }

    #[test]
    fn test_escape_switches_central_body() {
        let mut registry = sun_earth_moon();
        let calculator = StateVectorCalculator::default();
        calculator.update_all(&mut registry, Epoch::J2000);

        let earth = *registry.state(399).unwrap();
        let sun = *registry.state(10).unwrap();
        let outward = (earth.position - sun.position).normalize();
        let soi = registry.soi_radius(399).unwrap();
        let initial = SpacecraftState::with_defaults(
            OrbitalState::new(outward * soi * 0.98, outward * 5.0, Epoch::J2000),
            399,
        );

        let result = propagator(ForceOptions::two_body(), 600.0)
            .propagate(PropagationRequest::new(initial, 2.0 * 86_400.0), &registry)
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.soi_transitions.len(), 1);
        assert_eq!(
            (result.soi_transitions[0].from, result.soi_transitions[0].to),
            (399, 10)
        );
        assert_eq!(result.samples[0].central_body, 399);
        assert_eq!(result.samples.last().unwrap().central_body, 10);
        assert_eq!(result.final_state.central_body, 10);
    }
}
