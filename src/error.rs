//! Error and diagnostic types
//!
//! Hard failures (invalid input, backward propagation) are typed errors.
//! Missing data never fails a computation; it is reported as a
//! [`Diagnostic`] next to the result instead.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::bodies::BodyId;
use crate::maneuver::ManeuverId;
use crate::simulation::SatelliteId;
use crate::time::Epoch;

/// Problems found while validating a body catalog
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,

    #[error("duplicate body id {0}")]
    DuplicateId(BodyId),

    #[error("catalog has no root body")]
    NoRoot,

    #[error("catalog has more than one root body ({0} and {1})")]
    MultipleRoots(BodyId, BodyId),

    #[error("body {id} references unknown parent {parent}")]
    UnknownParent { id: BodyId, parent: BodyId },

    #[error("body hierarchy contains a cycle through body {0}")]
    Cycle(BodyId),

    #[error("body {id} has degenerate orbital elements: {reason}")]
    DegenerateElements { id: BodyId, reason: String },

    #[error("body {id} has invalid {field}: {value}")]
    InvalidParameter {
        id: BodyId,
        field: &'static str,
        value: f64,
    },

    #[error("body {id} elements reference unknown center {center}")]
    UnknownCenter { id: BodyId, center: BodyId },

    #[error("body {id} has an unusable {what}: {reason}")]
    InvalidModel {
        id: BodyId,
        what: &'static str,
        reason: String,
    },

    #[error("invalid catalog epoch '{0}'")]
    InvalidEpoch(String),
}

/// Rejected satellite creation or lookup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SatelliteError {
    #[error("satellite {field} has non-finite components")]
    NonFiniteState { field: &'static str },

    #[error("unknown central body {0}")]
    UnknownCentralBody(BodyId),

    #[error("body {0} is a barycenter and cannot be a central body")]
    BarycenterCentralBody(BodyId),

    #[error("invalid satellite {field}: {value}")]
    InvalidParameter { field: &'static str, value: f64 },

    #[error("no satellite with id {0}")]
    NotFound(SatelliteId),
}

/// Hard propagation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationError {
    #[error("backward propagation is not supported (requested {requested} s)")]
    BackwardPropagation { requested: f64 },

    #[error("invalid propagation duration {0} s")]
    InvalidDuration(f64),

    #[error("invalid step size {0} s")]
    InvalidStepSize(f64),

    #[error("state became non-finite at {time}")]
    NonFiniteState {
        satellite: Option<SatelliteId>,
        time: Epoch,
    },

    #[error("propagation stopped after reaching the {0} step cap")]
    MaxStepsExceeded(usize),

    #[error("propagation was cancelled")]
    Cancelled,

    #[error("propagation worker has stopped")]
    WorkerStopped,

    #[error(transparent)]
    Satellite(#[from] SatelliteError),
}

/// Rejected maneuver scheduling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManeuverError {
    #[error("delta-v has non-finite components")]
    NonFiniteDeltaV,

    #[error("maneuver time {time} is before the current time {now}")]
    InPast { time: Epoch, now: Epoch },

    #[error("transfer radii must be positive (r1 = {r1}, r2 = {r2})")]
    InvalidRadius { r1: f64, r2: f64 },

    #[error("gravitational parameter must be positive, got {0}")]
    InvalidMu(f64),

    #[error("maneuver {0} needs an orbit plane, but the velocity is zero or radial")]
    UndefinedFrame(ManeuverId),

    #[error(transparent)]
    Satellite(#[from] SatelliteError),
}

/// Recoverable condition surfaced alongside a result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Central body could not be resolved, so its terms were treated as zero
    MissingCentralBody { body: BodyId },

    /// A perturbing body had no state this tick and was skipped
    MissingBodyState { body: BodyId },

    /// No data source could position a body at the requested time
    StateUnavailable { body: BodyId, time: Epoch },

    /// Kepler solve hit the iteration cap; the last iterate was used
    KeplerNotConverged { body: BodyId, residual: f64 },

    /// A maneuver could not be resolved into inertial axes and was dropped
    ManeuverRejected { maneuver: ManeuverId, time: Epoch },

    /// Propagated state went NaN/Inf and the run was halted
    NonFiniteState {
        satellite: Option<SatelliteId>,
        time: Epoch,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCentralBody { body } => {
                write!(f, "central body {} not found, gravity term omitted", body)
            }
            Self::MissingBodyState { body } => {
                write!(f, "body {} has no state this tick, skipped", body)
            }
            Self::StateUnavailable { body, time } => {
                write!(f, "no state available for body {} at {}", body, time)
            }
            Self::KeplerNotConverged { body, residual } => {
                write!(
                    f,
                    "Kepler solve for body {} did not converge (residual {:.3e})",
                    body, residual
                )
            }
            Self::ManeuverRejected { maneuver, time } => {
                write!(f, "maneuver {} at {} has no defined orbit frame, dropped", maneuver, time)
            }
            Self::NonFiniteState {
                satellite: Some(id),
                time,
            } => write!(f, "satellite {} state became non-finite at {}", id, time),
            Self::NonFiniteState {
                satellite: None,
                time,
            } => write!(f, "state became non-finite at {}", time),
        }
    }
}
