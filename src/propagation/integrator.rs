//! Numerical integrators for orbit propagation
//!
//! The integrator only sees a derivative closure, so the same stepping code
//! drives satellite propagation (full force model) and the two-body
//! fallback used for bodies that have run off their ephemeris.
//!
//! # Available Integrators
//!
//! - **NativeRK4**: classic Runge-Kutta 4, with optional adaptive stepping
//!   by step doubling

use nalgebra::Vector3;

use super::state::OrbitalState;

/// Result of a single integration step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// New state after the step
    pub state: OrbitalState,

    /// Actual step size used (for adaptive methods)
    pub dt_used: f64,

    /// Estimated local truncation error (if available)
    pub error_estimate: Option<f64>,

    /// False when the step produced a non-finite state
    pub success: bool,
}

/// Time derivative of a state: (velocity, acceleration)
pub type Derivatives<'a> = dyn Fn(&OrbitalState) -> (Vector3<f64>, Vector3<f64>) + 'a;

/// Trait for numerical integrators
///
/// Implementations must be `Send + Sync` so a propagator can be moved to
/// a background worker.
pub trait Integrator: Send + Sync {
    /// Take a single fixed step of `dt` seconds
    fn step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState;

    /// Take an adaptive step with error control, never longer than `dt_suggested`
    fn adaptive_step(
        &self,
        state: &OrbitalState,
        dt_suggested: f64,
        tolerance: f64,
        derivatives: &Derivatives,
    ) -> StepResult;

    fn name(&self) -> &'static str;

    fn order(&self) -> u8;

    /// Number of function evaluations per step
    fn stages(&self) -> usize;
}

/// Runge-Kutta 4 integrator with adaptive stepping via step doubling
#[derive(Debug, Clone, Copy)]
pub struct NativeRK4 {
    /// Minimum allowed step size (seconds)
    pub min_step: f64,

    /// Safety factor for step size adjustment
    pub safety: f64,

    /// Maximum step shrink factor per retry
    pub max_shrink: f64,
}

impl Default for NativeRK4 {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRK4 {
    pub fn new() -> Self {
        Self {
            min_step: 0.01,
            safety: 0.9,
            max_shrink: 0.2,
        }
    }

    pub fn with_min_step(min_step: f64) -> Self {
        Self {
            min_step,
            ..Self::default()
        }
    }

    fn rk4_step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState {
        let half = dt / 2.0;
        let (v1, a1) = derivatives(state);

        let s2 = OrbitalState::new(
            state.position + v1 * half,
            state.velocity + a1 * half,
            state.epoch + half,
        );
        let (v2, a2) = derivatives(&s2);

        let s3 = OrbitalState::new(
            state.position + v2 * half,
            state.velocity + a2 * half,
            state.epoch + half,
        );
        let (v3, a3) = derivatives(&s3);

        let s4 = OrbitalState::new(
            state.position + v3 * dt,
            state.velocity + a3 * dt,
            state.epoch + dt,
        );
        let (v4, a4) = derivatives(&s4);

        let position = state.position + (v1 + 2.0 * v2 + 2.0 * v3 + v4) * (dt / 6.0);
        let velocity = state.velocity + (a1 + 2.0 * a2 + 2.0 * a3 + a4) * (dt / 6.0);

        OrbitalState::new(position, velocity, state.epoch + dt)
    }
}

impl Integrator for NativeRK4 {
    fn step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState {
        self.rk4_step(state, dt, derivatives)
    }

    fn adaptive_step(
        &self,
        state: &OrbitalState,
        dt_suggested: f64,
        tolerance: f64,
        derivatives: &Derivatives,
    ) -> StepResult {
        let mut h = dt_suggested;

        loop {
            let y_full = self.rk4_step(state, h, derivatives);
            let y_half1 = self.rk4_step(state, h / 2.0, derivatives);
            let y_half2 = self.rk4_step(&y_half1, h / 2.0, derivatives);

            let error_pos = (y_full.position - y_half2.position).norm();
            let error_vel = (y_full.velocity - y_half2.velocity).norm();
            let error = error_pos.max(error_vel);

            if !error.is_finite() {
                return StepResult {
                    state: y_half2,
                    dt_used: h,
                    error_estimate: None,
                    success: false,
                };
            }

            if error < tolerance || h <= self.min_step {
                // Richardson extrapolation of the two estimates
                let position = (16.0 * y_half2.position - y_full.position) / 15.0;
                let velocity = (16.0 * y_half2.velocity - y_full.velocity) / 15.0;

                return StepResult {
                    state: OrbitalState::new(position, velocity, y_half2.epoch),
                    dt_used: h,
                    error_estimate: Some(error),
                    success: true,
                };
            }

            let factor = self.safety * (tolerance / error).powf(0.2);
            h = (h * factor.clamp(self.max_shrink, 1.0)).max(self.min_step);
        }
    }

    fn name(&self) -> &'static str {
        "Native RK4"
    }

    fn order(&self) -> u8 {
        4
    }

    fn stages(&self) -> usize {
        4
    }
}

/// Point-mass derivatives about the origin
pub fn two_body(mu: f64) -> impl Fn(&OrbitalState) -> (Vector3<f64>, Vector3<f64>) {
    move |s: &OrbitalState| {
        let r = s.position.norm();
        (s.velocity, -mu / (r * r * r) * s.position)
    }
}
