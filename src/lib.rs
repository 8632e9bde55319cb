//! orbitsim - multi-body orbital propagation
//!
//! Satellites are integrated under central gravity, J2, atmospheric drag
//! and third-body perturbations while the solar-system bodies move along
//! tabulated or Keplerian ephemerides. Central bodies change automatically
//! at sphere-of-influence boundaries.
//!
//! The [`Simulation`](simulation::Simulation) type drives the live loop;
//! [`Propagator`](propagation::Propagator) runs bulk predictions, directly
//! or on a [`PropagationWorker`](propagation::PropagationWorker).

pub mod bodies;
pub mod data;
pub mod ephemeris;
pub mod error;
pub mod frames;
pub mod maneuver;
pub mod propagation;
pub mod simulation;
pub mod time;

pub use bodies::{BodyId, BodyRegistry, CelestialBody};
pub use error::{CatalogError, Diagnostic, ManeuverError, PropagationError, SatelliteError};
pub use simulation::{Satellite, SatelliteId, Simulation, TickReport};
pub use time::Epoch;
