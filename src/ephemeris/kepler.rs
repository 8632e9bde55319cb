//! Keplerian orbital elements and conversions

use std::f64::consts::{PI, TAU};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::bodies::BodyId;
use crate::frames::wrap_pi;
use crate::propagation::OrbitalState;
use crate::time::Epoch;

/// Newton-Raphson iteration cap for Kepler's equation
pub const KEPLER_MAX_ITERATIONS: u32 = 10;

/// Convergence tolerance on the eccentric anomaly update (radians)
pub const KEPLER_TOLERANCE: f64 = 1e-8;

/// Reference plane the elements are measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementFrame {
    /// J2000 ecliptic
    Ecliptic,
    /// J2000 Earth equator
    Equatorial,
    /// Equator of the center body (falls back to ecliptic without a pole)
    ParentEquator,
}

/// Classical Keplerian orbital elements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    /// Semi-major axis (km)
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    /// Inclination (radians)
    pub inclination: f64,
    /// Longitude of ascending node (radians)
    pub raan: f64,
    /// Argument of periapsis (radians)
    pub arg_periapsis: f64,
    /// Mean anomaly at `epoch` (radians)
    pub mean_anomaly: f64,
    pub epoch: Epoch,
    pub frame: ElementFrame,
    /// Body the orbit is described around
    pub center: BodyId,
}

/// Outcome of solving M = E - e·sin(E)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeplerSolution {
    pub eccentric_anomaly: f64,
    pub iterations: u32,
    pub converged: bool,
    /// |E - e·sin(E) - M| at the returned iterate
    pub residual: f64,
}

/// Solve Kepler's equation for the eccentric anomaly
///
/// Mean anomaly is wrapped to [-π, π). The starting guess is M itself for
/// moderate eccentricity and Danby's M + 0.85·e·sign(sin M) above 0.8.
pub fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> KeplerSolution {
    let m = wrap_pi(mean_anomaly);
    let e = eccentricity;

    let mut ea = if e < 0.8 {
        m
    } else {
        m + 0.85 * e * m.sin().signum()
    };

    let mut iterations = 0;
    let mut converged = false;
    while iterations < KEPLER_MAX_ITERATIONS {
        iterations += 1;
        let f = ea - e * ea.sin() - m;
        let fp = 1.0 - e * ea.cos();
        let delta = f / fp;
        ea -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            converged = true;
            break;
        }
    }

    KeplerSolution {
        eccentric_anomaly: ea,
        iterations,
        converged,
        residual: (ea - e * ea.sin() - m).abs(),
    }
}

/// True anomaly from eccentric anomaly
pub fn true_anomaly(eccentric_anomaly: f64, eccentricity: f64) -> f64 {
    let e = eccentricity;
    let (s, c) = (eccentric_anomaly / 2.0).sin_cos();
    2.0 * ((1.0 + e).sqrt() * s).atan2((1.0 - e).sqrt() * c)
}

/// Rotation from the perifocal frame to the elements' reference plane
///
/// R_z(-Ω) · R_x(-i) · R_z(-ω)
pub fn perifocal_rotation(raan: f64, inclination: f64, arg_periapsis: f64) -> Matrix3<f64> {
    let (sin_o, cos_o) = raan.sin_cos();
    let (sin_i, cos_i) = inclination.sin_cos();
    let (sin_w, cos_w) = arg_periapsis.sin_cos();

    Matrix3::new(
        cos_o * cos_w - sin_o * sin_w * cos_i,
        -cos_o * sin_w - sin_o * cos_w * cos_i,
        sin_o * sin_i,
        sin_o * cos_w + cos_o * sin_w * cos_i,
        -sin_o * sin_w + cos_o * cos_w * cos_i,
        -cos_o * sin_i,
        sin_w * sin_i,
        cos_w * sin_i,
        cos_i,
    )
}

impl OrbitalElements {
    /// Build from degrees, the way catalogs list them
    #[allow(clippy::too_many_arguments)]
    pub fn from_degrees(
        semi_major_axis: f64,
        eccentricity: f64,
        inclination_deg: f64,
        raan_deg: f64,
        arg_periapsis_deg: f64,
        mean_anomaly_deg: f64,
        epoch: Epoch,
        frame: ElementFrame,
        center: BodyId,
    ) -> Self {
        Self {
            semi_major_axis,
            eccentricity,
            inclination: inclination_deg.to_radians(),
            raan: raan_deg.to_radians(),
            arg_periapsis: arg_periapsis_deg.to_radians(),
            mean_anomaly: mean_anomaly_deg.to_radians(),
            epoch,
            frame,
            center,
        }
    }

    /// Reason the elements cannot describe a closed orbit, if any
    pub fn degeneracy(&self) -> Option<String> {
        let angles = [
            self.inclination,
            self.raan,
            self.arg_periapsis,
            self.mean_anomaly,
        ];
        if !self.semi_major_axis.is_finite() || self.semi_major_axis <= 0.0 {
            Some(format!(
                "semi-major axis must be positive, got {}",
                self.semi_major_axis
            ))
        } else if !self.eccentricity.is_finite()
            || self.eccentricity < 0.0
            || self.eccentricity >= 1.0
        {
            Some(format!(
                "eccentricity must be in [0, 1), got {}",
                self.eccentricity
            ))
        } else if angles.iter().any(|a| !a.is_finite()) {
            Some("angles must be finite".to_string())
        } else if !self.epoch.is_finite() {
            Some("epoch must be finite".to_string())
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.degeneracy().is_none()
    }

    /// Mean motion (radians per second)
    pub fn mean_motion(&self, mu: f64) -> f64 {
        (mu / self.semi_major_axis.powi(3)).sqrt()
    }

    /// Orbital period (seconds)
    pub fn period(&self, mu: f64) -> f64 {
        TAU / self.mean_motion(mu)
    }

    pub fn mean_anomaly_at(&self, epoch: Epoch, mu: f64) -> f64 {
        self.mean_anomaly + self.mean_motion(mu) * (epoch - self.epoch)
    }

    /// Position and velocity in the elements' reference plane, relative to
    /// the center body
    pub fn state_at(&self, epoch: Epoch, mu: f64) -> (OrbitalState, KeplerSolution) {
        let a = self.semi_major_axis;
        let e = self.eccentricity;

        let solution = solve_kepler(self.mean_anomaly_at(epoch, mu), e);
        let nu = true_anomaly(solution.eccentric_anomaly, e);

        let p = a * (1.0 - e * e);
        let r = p / (1.0 + e * nu.cos());
        let h = (mu * p).sqrt();

        let position_pf = Vector3::new(r * nu.cos(), r * nu.sin(), 0.0);
        let velocity_pf = Vector3::new(-mu / h * nu.sin(), mu / h * (e + nu.cos()), 0.0);

        let rot = perifocal_rotation(self.raan, self.inclination, self.arg_periapsis);
        let state = OrbitalState::new(rot * position_pf, rot * velocity_pf, epoch);
        (state, solution)
    }

    /// Osculating elements of a bound state (reference plane = state's axes)
    pub fn from_state(
        state: &OrbitalState,
        mu: f64,
        frame: ElementFrame,
        center: BodyId,
    ) -> Option<Self> {
        let r = state.position;
        let v = state.velocity;
        let r_mag = r.norm();
        let h = r.cross(&v);
        let h_mag = h.norm();
        if r_mag == 0.0 || h_mag == 0.0 {
            return None;
        }

        let a = state.semi_major_axis(mu);
        let e_vec = v.cross(&h) / mu - r / r_mag;
        let e = e_vec.norm();
        if !(a > 0.0) || e >= 1.0 {
            return None;
        }

        let inclination = (h.z / h_mag).clamp(-1.0, 1.0).acos();
        let node = Vector3::z().cross(&h);
        let node_mag = node.norm();

        let raan = if node_mag > 1e-12 {
            node.y.atan2(node.x).rem_euclid(TAU)
        } else {
            0.0
        };

        // Periapsis direction measured from the node (or the x axis when equatorial)
        let reference = if node_mag > 1e-12 {
            node / node_mag
        } else {
            Vector3::x()
        };
        let in_plane_normal = (h / h_mag).cross(&reference);
        let arg_periapsis = if e > 1e-12 {
            e_vec.dot(&in_plane_normal).atan2(e_vec.dot(&reference)).rem_euclid(TAU)
        } else {
            0.0
        };

        // True anomaly from periapsis (or from the reference direction for circular orbits)
        let periapsis_dir = if e > 1e-12 {
            e_vec / e
        } else {
            reference
        };
        let perp = (h / h_mag).cross(&periapsis_dir);
        let nu = r.dot(&perp).atan2(r.dot(&periapsis_dir));
        let ea = 2.0 * ((1.0 - e).sqrt() * (nu / 2.0).sin()).atan2((1.0 + e).sqrt() * (nu / 2.0).cos());
        let mean_anomaly = (ea - e * ea.sin()).rem_euclid(TAU);

        Some(Self {
            semi_major_axis: a,
            eccentricity: e,
            inclination,
            raan,
            arg_periapsis,
            mean_anomaly,
            epoch: state.epoch,
            frame,
            center,
        })
    }
}

/// Normalize an angle to [0, 2π)
pub fn normalize_angle(angle: f64) -> f64 {
    angle.rem_euclid(2.0 * PI)
}
