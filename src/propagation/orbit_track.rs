//! Orbit track generation and caching
//!
//! Samples one full orbit of a body or satellite, relative to what it
//! orbits. Body tracks are centered on the requested time (half a period
//! behind, half ahead); satellite tracks run one period forward from the
//! satellite's current state.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::RwLock;
use serde::Serialize;

use super::propagator::{PropagationRequest, Propagator};
use super::state::SpacecraftState;
use crate::bodies::{BodyId, BodyRegistry};
use crate::ephemeris::{DataSource, StateVectorCalculator};
use crate::simulation::SatelliteId;
use crate::time::Epoch;

/// How an orbit's points were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitSource {
    Tabulated,
    Kepler,
    Fallback,
    Propagated,
}

/// A sampled orbit, positions relative to `center` (km, ecliptic axes)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Orbit {
    pub center: BodyId,
    pub source: OrbitSource,
    pub period: f64,
    pub times: Vec<Epoch>,
    pub points: Vec<Vector3<f64>>,
    /// Time the orbit was sampled for
    pub computed_at: Epoch,
}

impl Orbit {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Sample one orbit of body `id` centered on `epoch`
///
/// Returns `None` for the root, for bodies with no primary, for unbound or
/// unpositionable bodies, and whenever fewer than two points resolve.
pub fn sample_body_orbit(
    registry: &BodyRegistry,
    calculator: &StateVectorCalculator,
    id: BodyId,
    epoch: Epoch,
    samples: usize,
) -> Option<Orbit> {
    if samples < 2 {
        return None;
    }
    let body = registry.get(id)?;
    let center = registry.primary(id)?;

    let source = match calculator.select_source(registry, id, epoch) {
        DataSource::Tabulated => OrbitSource::Tabulated,
        DataSource::Kepler | DataSource::BarycenterRelative => OrbitSource::Kepler,
        DataSource::PhysicsFallback => OrbitSource::Fallback,
        DataSource::Origin | DataSource::Skip | DataSource::Unavailable => return None,
    };

    let mut sink = Vec::new();
    let mut relative_at = |t: Epoch| {
        let body_state = calculator.calculate_state_vector(registry, id, t, &mut sink)?;
        let center_state = calculator.calculate_state_vector(registry, center, t, &mut sink)?;
        Some(body_state.state.relative_to(&center_state.state))
    };

    let mu = registry.two_body_mu(id, center);
    let period = match &body.sources.elements {
        Some(elements) => elements.period(registry.two_body_mu(id, elements.center)),
        None => relative_at(epoch)?.period(mu)?,
    };
    if !period.is_finite() || period <= 0.0 {
        return None;
    }

    let start = epoch - period / 2.0;
    let step = period / (samples - 1) as f64;
    let mut times = Vec::with_capacity(samples);
    let mut points = Vec::with_capacity(samples);
    for i in 0..samples {
        let t = start + step * i as f64;
        if let Some(state) = relative_at(t) {
            times.push(t);
            points.push(state.position);
        }
    }
    if !sink.is_empty() {
        log::debug!("Sampling {} raised {} diagnostics", body.name, sink.len());
    }
    if points.len() < 2 {
        return None;
    }

    Some(Orbit {
        center,
        source,
        period,
        times,
        points,
        computed_at: epoch,
    })
}

/// Propagate one orbital period of a satellite forward from `state`
///
/// Stops early if the satellite changes central body, so every point is
/// relative to the same center. Unbound trajectories, and tracks cut
/// below two points, give `None`.
pub fn sample_satellite_orbit(
    propagator: &Propagator,
    registry: &BodyRegistry,
    state: &SpacecraftState,
    samples: usize,
) -> Option<Orbit> {
    if samples < 2 {
        return None;
    }
    let central = registry.get(state.central_body)?;
    let period = state.orbital.period(central.gm)?;
    let step = period / (samples - 1) as f64;

    let request = PropagationRequest::new(*state, period).with_step(step);
    let trajectory = match propagator.trajectory(request, registry) {
        Ok(trajectory) => trajectory,
        Err(e) => {
            log::warn!("Cannot sample satellite orbit: {}", e);
            return None;
        }
    };

    let (times, points): (Vec<_>, Vec<_>) = trajectory
        .take_while(|s| s.central_body == state.central_body)
        .map(|s| (s.time, s.position))
        .unzip();
    if points.len() < 2 {
        return None;
    }

    Some(Orbit {
        center: state.central_body,
        source: OrbitSource::Propagated,
        period,
        times,
        points,
        computed_at: state.orbital.epoch,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrbitKey {
    Body(BodyId),
    Satellite(SatelliteId),
}

/// Shared cache of sampled orbits
///
/// Cloning shares the same storage, so a worker thread can fill it while
/// the simulation reads from it.
#[derive(Debug, Clone, Default)]
pub struct OrbitCache {
    orbits: Arc<RwLock<HashMap<OrbitKey, Arc<Orbit>>>>,
}

impl OrbitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached orbit, if it has at least two points
    pub fn get(&self, key: OrbitKey) -> Option<Arc<Orbit>> {
        self.orbits
            .read()
            .get(&key)
            .filter(|orbit| orbit.len() >= 2)
            .cloned()
    }

    pub fn insert(&self, key: OrbitKey, orbit: Orbit) -> Arc<Orbit> {
        let orbit = Arc::new(orbit);
        self.orbits.write().insert(key, Arc::clone(&orbit));
        orbit
    }

    pub fn invalidate(&self, key: OrbitKey) {
        self.orbits.write().remove(&key);
    }

    pub fn invalidate_all(&self) {
        let mut orbits = self.orbits.write();
        if !orbits.is_empty() {
            log::debug!("Invalidating {} cached orbits", orbits.len());
        }
        orbits.clear();
    }

    pub fn len(&self) -> usize {
        self.orbits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orbits.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::test_support::*;
    use crate::propagation::forces::ForceOptions;
    use crate::propagation::settings::SimulationSettings;
    use crate::propagation::OrbitalState;

    #[test]
    fn test_moon_orbit_is_centered_on_time() {
        let registry = sun_earth_moon();
        let calculator = StateVectorCalculator::default();
        let epoch = Epoch::J2000 + 86_400.0;
        let orbit = sample_body_orbit(&registry, &calculator, 301, epoch, 90).unwrap();

        assert_eq!(orbit.center, 399);
        assert_eq!(orbit.source, OrbitSource::Kepler);
        assert_eq!(orbit.len(), 90);
        assert!((orbit.period / 86_400.0 - 27.3).abs() < 0.5);
        assert!((orbit.times[0] - (epoch - orbit.period / 2.0)).abs() < 1e-6);
        assert!((*orbit.times.last().unwrap() - (epoch + orbit.period / 2.0)).abs() < 1e-3);

        // Closed ellipse: first and last points coincide
        assert!((orbit.points[0] - orbit.points[89]).norm() < 1.0);
        for point in &orbit.points {
            let r = point.norm();
            assert!(r > 384_400.0 * (1.0 - 0.0549) - 1.0 && r < 384_400.0 * (1.0 + 0.0549) + 1.0);
        }
    }

    #[test]
    fn test_barycentric_earth_orbits_sun() {
        let registry = sun_earth_moon();
        let orbit =
            sample_body_orbit(&registry, &StateVectorCalculator::default(), 399, Epoch::J2000, 36).unwrap();
        assert_eq!(orbit.center, 10);
        assert!((orbit.period / 86_400.0 - 365.25).abs() < 2.0);
    }

    #[test]
    fn test_root_has_no_orbit() {
        let registry = sun_earth_moon();
        let calculator = StateVectorCalculator::default();
        assert!(sample_body_orbit(&registry, &calculator, 10, Epoch::J2000, 90).is_none());
        assert!(sample_body_orbit(&registry, &calculator, 301, Epoch::J2000, 1).is_none());
    }

    #[test]
    fn test_satellite_orbit_closes() {
        let registry = earth_only();
        let settings = SimulationSettings {
            forces: ForceOptions::two_body(),
            ..Default::default()
        };
        let propagator = Propagator::from_settings(&settings);
        let r = 7000.0;
        let state = SpacecraftState::with_defaults(
            OrbitalState::new(
                Vector3::new(r, 0.0, 0.0),
                Vector3::new(0.0, (MU_EARTH / r).sqrt(), 0.0),
                Epoch::J2000,
            ),
            399,
        );

        let orbit = sample_satellite_orbit(&propagator, &registry, &state, 120).unwrap();
        assert_eq!(orbit.source, OrbitSource::Propagated);
        assert_eq!(orbit.len(), 120);
        assert!((orbit.points[0] - orbit.points[119]).norm() < 5.0);
    }

    #[test]
    fn test_cache_get_requires_two_points() {
        let cache = OrbitCache::new();
        let shared = cache.clone();
        let mut orbit = Orbit {
            center: 399,
            source: OrbitSource::Kepler,
            period: 100.0,
            times: vec![Epoch::J2000],
            points: vec![Vector3::x()],
            computed_at: Epoch::J2000,
        };

        cache.insert(OrbitKey::Body(301), orbit.clone());
        assert!(shared.get(OrbitKey::Body(301)).is_none());

        orbit.times.push(Epoch::J2000 + 50.0);
        orbit.points.push(Vector3::y());
        shared.insert(OrbitKey::Body(301), orbit.clone());
        assert_eq!(cache.get(OrbitKey::Body(301)).unwrap().len(), 2);

        cache.insert(OrbitKey::Satellite(1), orbit);
        cache.invalidate(OrbitKey::Body(301));
        assert!(shared.get(OrbitKey::Body(301)).is_none());
        assert_eq!(shared.len(), 1);

        shared.invalidate_all();
        assert!(cache.is_empty());
    }
}
