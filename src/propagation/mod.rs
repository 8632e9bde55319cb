//! Orbital propagation
//!
//! Numerical integration of spacecraft trajectories under composable force
//! models, in a multi-body system whose bodies move along their ephemerides.
//!
//! - `state`, `forces`, `atmosphere`: what is being integrated and the
//!   accelerations acting on it
//! - `integrator`, `propagator`: stepping, bulk trajectories and
//!   cancellation
//! - `soi`: central-body reassignment at step boundaries
//! - `worker`: bulk propagation on a background thread
//! - `orbit_track`, `ground_track`: derived products for display
//!
//! # Example
//!
//! ```ignore
//! use orbitsim::propagation::*;
//!
//! let propagator = Propagator::from_settings(&SimulationSettings::default());
//! let request = PropagationRequest::new(initial, 86_400.0).with_step(30.0);
//! let result = propagator.propagate(request, &registry)?;
//! ```

pub mod atmosphere;
pub mod forces;
pub mod ground_track;
pub mod integrator;
pub mod orbit_track;
mod propagator;
pub mod settings;
pub mod soi;
pub mod state;
pub mod worker;

pub use ground_track::{ground_track, GroundTrackPoint};
pub use integrator::{Integrator, NativeRK4};
pub use orbit_track::{Orbit, OrbitCache, OrbitKey, OrbitSource};
pub use propagator::*;
pub(crate) use propagator::push_unique;
pub use settings::{OrbitCacheSettings, PropagatorConfig, SimulationSettings};
pub use soi::{check_soi, SoiTransition};
pub use state::{OrbitalState, SpacecraftProperties, SpacecraftState};
pub use worker::{PropagationHandle, PropagationWorker};
