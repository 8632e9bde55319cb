//! Body state vectors from ephemeris data
//!
//! Each body is positioned by the first usable source, in priority order:
//!
//! 1. the root of the hierarchy sits at the origin
//! 2. a tabulated ephemeris covering the requested time
//! 3. Keplerian elements about a center body
//! 4. its parent barycenter, balanced against its companions
//! 5. two-body propagation from the last known state
//!
//! States are relative to the root body, J2000 ecliptic axes.

mod kepler;
mod tabulated;

pub use kepler::{
    normalize_angle, perifocal_rotation, solve_kepler, true_anomaly, ElementFrame,
    KeplerSolution, OrbitalElements, KEPLER_MAX_ITERATIONS, KEPLER_TOLERANCE,
};
pub use tabulated::TabulatedEphemeris;

use std::collections::{HashMap, HashSet};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::bodies::{BodyId, BodyRegistry, CelestialBody};
use crate::error::Diagnostic;
use crate::frames::ecliptic_to_equatorial_matrix;
use crate::propagation::integrator::{two_body, Integrator, NativeRK4};
use crate::propagation::OrbitalState;
use crate::time::Epoch;

/// How a body's state was (or would be) obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Origin,
    Tabulated,
    Kepler,
    BarycenterRelative,
    PhysicsFallback,
    /// Deliberately excluded from positioning
    Skip,
    Unavailable,
}

impl DataSource {
    pub fn name(&self) -> &'static str {
        match self {
            DataSource::Origin => "origin",
            DataSource::Tabulated => "tabulated",
            DataSource::Kepler => "kepler",
            DataSource::BarycenterRelative => "barycenter-relative",
            DataSource::PhysicsFallback => "physics fallback",
            DataSource::Skip => "skip",
            DataSource::Unavailable => "unavailable",
        }
    }
}

/// Settings for the two-body fallback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub enabled: bool,

    /// Largest integration step (seconds)
    pub step: f64,

    /// Step cap; longer gaps use proportionally larger steps
    pub max_steps: usize,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            step: 3600.0,
            max_steps: 2000,
        }
    }
}

/// A body state with the source that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedState {
    pub state: OrbitalState,
    pub source: DataSource,
}

/// Summary of a whole-registry update
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub resolved: usize,
    /// Bodies flagged as deliberately excluded
    pub skipped: Vec<BodyId>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Computes body state vectors from the registry's ephemeris sources
#[derive(Debug, Clone, Copy, Default)]
pub struct StateVectorCalculator {
    pub fallback: FallbackSettings,
}

impl StateVectorCalculator {
    pub fn new(fallback: FallbackSettings) -> Self {
        Self { fallback }
    }

    /// Which source would position `id` at `epoch`
    pub fn select_source(&self, registry: &BodyRegistry, id: BodyId, epoch: Epoch) -> DataSource {
        let Some(body) = registry.get(id) else {
            return DataSource::Unavailable;
        };
        let sources = &body.sources;
        if id == registry.root() {
            DataSource::Origin
        } else if sources.tabulated.as_ref().is_some_and(|t| t.covers(epoch)) {
            DataSource::Tabulated
        } else if sources.elements.is_some() {
            DataSource::Kepler
        } else if sources.barycenter_relative {
            DataSource::BarycenterRelative
        } else if sources.skip {
            DataSource::Skip
        } else if self.fallback.enabled && sources.physics_fallback && body.last_known.is_some() {
            DataSource::PhysicsFallback
        } else {
            DataSource::Unavailable
        }
    }

    /// State of one body at `epoch`, relative to the root
    ///
    /// Returns `None` when no source can position the body; the reason is
    /// pushed onto `diagnostics` unless the body is deliberately skipped.
    pub fn calculate_state_vector(
        &self,
        registry: &BodyRegistry,
        id: BodyId,
        epoch: Epoch,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<ResolvedState> {
        let mut resolver = Resolver::new(self, registry, epoch);
        let result = resolver.resolve(id);
        diagnostics.append(&mut resolver.diagnostics);
        result
    }

    /// Recompute every body at `epoch` and store the results
    ///
    /// All states are computed from the registry as it was before the call,
    /// then written at once.
    pub fn update_all(&self, registry: &mut BodyRegistry, epoch: Epoch) -> UpdateReport {
        let mut report = UpdateReport::default();
        let mut states = HashMap::with_capacity(registry.len());
        {
            let mut resolver = Resolver::new(self, registry, epoch);
            for &id in registry.ids() {
                match resolver.resolve(id) {
                    Some(resolved) => {
                        states.insert(id, resolved.state);
                    }
                    None => {
                        if registry.get(id).is_some_and(|b| b.sources.skip) {
                            report.skipped.push(id);
                        }
                    }
                }
            }
            report.diagnostics = resolver.diagnostics;
        }
        report.resolved = states.len();
        registry.apply_states(&states, epoch);

        log::debug!(
            "Updated {} of {} bodies at {} ({} skipped, {} diagnostics)",
            report.resolved,
            registry.len(),
            epoch,
            report.skipped.len(),
            report.diagnostics.len()
        );
        report
    }
}

/// Rotation from an element frame to the ecliptic
pub fn element_frame_to_ecliptic(
    registry: &BodyRegistry,
    frame: ElementFrame,
    center: BodyId,
    epoch: Epoch,
) -> Matrix3<f64> {
    match frame {
        ElementFrame::Ecliptic => Matrix3::identity(),
        ElementFrame::Equatorial => ecliptic_to_equatorial_matrix().transpose(),
        ElementFrame::ParentEquator => registry
            .get(center)
            .and_then(|c| c.orientation)
            .map(|o| o.ecliptic_to_equator(epoch).transpose())
            .unwrap_or_else(Matrix3::identity),
    }
}

/// Kepler state of `body` relative to its element center, ecliptic axes
pub fn element_state(
    registry: &BodyRegistry,
    body: &CelestialBody,
    elements: &OrbitalElements,
    epoch: Epoch,
) -> (OrbitalState, KeplerSolution) {
    let mu = registry.two_body_mu(body.id, elements.center);
    let (local, solution) = elements.state_at(epoch, mu);
    let rotation = element_frame_to_ecliptic(registry, elements.frame, elements.center, epoch);
    let state = OrbitalState::new(rotation * local.position, rotation * local.velocity, epoch);
    (state, solution)
}

/// Memoized recursive resolution for a single epoch
struct Resolver<'a> {
    calculator: &'a StateVectorCalculator,
    registry: &'a BodyRegistry,
    epoch: Epoch,
    memo: HashMap<BodyId, Option<ResolvedState>>,
    visiting: HashSet<BodyId>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Resolver<'a> {
    fn new(calculator: &'a StateVectorCalculator, registry: &'a BodyRegistry, epoch: Epoch) -> Self {
        Self {
            calculator,
            registry,
            epoch,
            memo: HashMap::new(),
            visiting: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    fn resolve(&mut self, id: BodyId) -> Option<ResolvedState> {
        if let Some(known) = self.memo.get(&id) {
            return *known;
        }
        if !self.visiting.insert(id) {
            log::warn!("Circular state dependency through body {}", id);
            return None;
        }
        let result = self.compute(id);
        self.visiting.remove(&id);
        self.memo.insert(id, result);

        if result.is_none() && self.registry.get(id).is_some_and(|b| !b.sources.skip) {
            self.diagnostics.push(Diagnostic::StateUnavailable {
                body: id,
                time: self.epoch,
            });
        }
        result
    }

    fn compute(&mut self, id: BodyId) -> Option<ResolvedState> {
        let registry = self.registry;
        let body = registry.get(id)?;
        let source = self.calculator.select_source(registry, id, self.epoch);

        let state = match source {
            DataSource::Origin => OrbitalState::zero(self.epoch),
            DataSource::Tabulated => {
                let table = body.sources.tabulated.as_ref()?;
                let relative = table.interpolate(self.epoch)?;
                let center = self.resolve(table.center)?;
                relative.offset_by(&center.state)
            }
            DataSource::Kepler => {
                let elements = body.sources.elements.as_ref()?;
                let relative = self.kepler_relative(body, elements);
                let center = self.resolve(elements.center)?;
                relative.offset_by(&center.state)
            }
            DataSource::BarycenterRelative => {
                let parent_id = body.parent?;
                let relative = self.barycentric_offset(body, parent_id)?;
                let parent = self.resolve(parent_id)?;
                relative.offset_by(&parent.state)
            }
            DataSource::PhysicsFallback => self.physics_fallback(body)?,
            DataSource::Skip | DataSource::Unavailable => return None,
        };

        if !state.is_finite() {
            log::warn!("Body {} produced a non-finite state from {}", id, source.name());
            return None;
        }
        Some(ResolvedState {
            state: OrbitalState::new(state.position, state.velocity, self.epoch),
            source,
        })
    }

    fn kepler_relative(&mut self, body: &CelestialBody, elements: &OrbitalElements) -> OrbitalState {
        let (state, solution) = element_state(self.registry, body, elements, self.epoch);
        if !solution.converged {
            log::warn!(
                "Kepler solve for {} stopped after {} iterations (residual {:.3e})",
                body.name,
                solution.iterations,
                solution.residual
            );
            self.diagnostics.push(Diagnostic::KeplerNotConverged {
                body: body.id,
                residual: solution.residual,
            });
        }
        state
    }

    /// State of `body` relative to `center` straight from its own data,
    /// without resolving any other body
    fn direct_relative(&mut self, body: &CelestialBody) -> Option<(BodyId, OrbitalState)> {
        if let Some(table) = &body.sources.tabulated {
            if let Some(state) = table.interpolate(self.epoch) {
                return Some((table.center, state));
            }
        }
        let elements = body.sources.elements.as_ref()?;
        Some((elements.center, self.kepler_relative(body, elements)))
    }

    /// Offset of `body` from its parent barycenter
    ///
    /// Companions positioned about the barycenter balance the body directly.
    /// Companions positioned about the body itself drag it the other way,
    /// and their mass joins the body's.
    fn barycentric_offset(&mut self, body: &CelestialBody, parent_id: BodyId) -> Option<OrbitalState> {
        let registry = self.registry;
        let mut moment_r = Vector3::zeros();
        let mut moment_v = Vector3::zeros();
        let mut mass = body.gm;

        for &sibling_id in registry.children(parent_id) {
            if sibling_id == body.id {
                continue;
            }
            let Some(sibling) = registry.get(sibling_id) else {
                continue;
            };
            if sibling.gm <= 0.0 {
                continue;
            }
            let Some((center, relative)) = self.direct_relative(sibling) else {
                continue;
            };
            if center == parent_id {
                moment_r += relative.position * sibling.gm;
                moment_v += relative.velocity * sibling.gm;
            } else if center == body.id {
                moment_r += relative.position * sibling.gm;
                moment_v += relative.velocity * sibling.gm;
                mass += sibling.gm;
            }
        }

        if mass <= 0.0 {
            return None;
        }
        Some(OrbitalState::new(-moment_r / mass, -moment_v / mass, self.epoch))
    }

    /// Two-body propagation from the last known state about the primary
    fn physics_fallback(&mut self, body: &CelestialBody) -> Option<OrbitalState> {
        let registry = self.registry;
        let last = body.last_known?;
        let center_id = registry.primary(body.id).or(body.parent)?;
        let center_last = registry.get(center_id)?.last_known?;
        let center_now = self.resolve(center_id)?;

        let settings = self.calculator.fallback;
        let dt = self.epoch - last.epoch;
        let mut relative = last.relative_to(&center_last);

        if dt != 0.0 {
            let needed = (dt.abs() / settings.step.max(1e-3)).ceil() as usize;
            let steps = needed.clamp(1, settings.max_steps.max(1));
            let h = dt / steps as f64;
            let derivatives = two_body(registry.two_body_mu(body.id, center_id));
            let integrator = NativeRK4::new();
            for _ in 0..steps {
                relative = integrator.step(&relative, h, &derivatives);
            }
            log::debug!(
                "Fallback propagated {} by {:.0} s in {} steps",
                body.name,
                dt,
                steps
            );
        }

        Some(relative.offset_by(&center_now.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::test_support::*;
    use crate::bodies::BodyKind;
    use crate::data::{SampleConfig, TabulatedConfig};

    #[test]
    fn test_root_at_origin_and_sources() {
        let mut registry = sun_earth_moon();
        let calc = StateVectorCalculator::default();
        let t = Epoch::J2000;

        assert_eq!(calc.select_source(&registry, 10, t), DataSource::Origin);
        assert_eq!(calc.select_source(&registry, 3, t), DataSource::Kepler);
        assert_eq!(calc.select_source(&registry, 399, t), DataSource::BarycenterRelative);
        assert_eq!(calc.select_source(&registry, 301, t), DataSource::Kepler);

        let report = calc.update_all(&mut registry, t);
        assert_eq!(report.resolved, 4);
        assert!(report.diagnostics.is_empty());
        assert_eq!(registry.state(10).unwrap().position, Vector3::zeros());
        assert_eq!(registry.state_epoch(), Some(t));
    }

    #[test]
    fn test_earth_moon_balance_about_barycenter() {
        let mut registry = sun_earth_moon();
        let calc = StateVectorCalculator::default();
        let t = Epoch::J2000 + 12_345.0;
        calc.update_all(&mut registry, t);

        let emb = registry.state(3).unwrap();
        let earth = registry.state(399).unwrap();
        let moon = registry.state(301).unwrap();
        let gm_e = registry.get(399).unwrap().gm;
        let gm_m = registry.get(301).unwrap().gm;

        let weighted_r = (earth.position * gm_e + moon.position * gm_m) / (gm_e + gm_m);
        let weighted_v = (earth.velocity * gm_e + moon.velocity * gm_m) / (gm_e + gm_m);
        assert!((weighted_r - emb.position).norm() < 1e-6);
        assert!((weighted_v - emb.velocity).norm() < 1e-9);

        // Moon sits at its element distance from Earth
        let d = (moon.position - earth.position).norm();
        assert!(d > 384_400.0 * (1.0 - 0.0549) - 1.0 && d < 384_400.0 * (1.0 + 0.0549) + 1.0);
    }

    #[test]
    fn test_single_body_query_matches_update() {
        let mut registry = sun_earth_moon();
        let calc = StateVectorCalculator::default();
        let t = Epoch::J2000 + 86_400.0;

        let mut diagnostics = Vec::new();
        let moon = calc
            .calculate_state_vector(&registry, 301, t, &mut diagnostics)
            .unwrap();
        assert_eq!(moon.source, DataSource::Kepler);

        calc.update_all(&mut registry, t);
        assert!((registry.state(301).unwrap().position - moon.state.position).norm() < 1e-6);
    }

    #[test]
    fn test_tabulated_preferred_inside_span_only() {
        let mut configs = sun_earth_moon_configs();
        let beacon_state = |t: f64| SampleConfig {
            epoch: (Epoch::J2000 + t).to_string(),
            position: [7000.0 + t, 0.0, 0.0],
            velocity: [1.0, 0.0, 0.0],
        };
        let mut beacon = body(-10, "Beacon", BodyKind::Moon, Some(399), 1e-9);
        beacon.source.tabulated = Some(TabulatedConfig {
            center: Some(399),
            samples: vec![beacon_state(0.0), beacon_state(100.0), beacon_state(200.0)],
        });
        beacon.source.physics_fallback = false;
        configs.push(beacon);
        let registry = BodyRegistry::from_configs(&configs, Epoch::J2000).unwrap();
        let calc = StateVectorCalculator::default();

        let mut diagnostics = Vec::new();
        let inside = calc
            .calculate_state_vector(&registry, -10, Epoch::J2000 + 50.0, &mut diagnostics)
            .unwrap();
        let earth = calc
            .calculate_state_vector(&registry, 399, Epoch::J2000 + 50.0, &mut diagnostics)
            .unwrap();
        assert_eq!(inside.source, DataSource::Tabulated);
        assert!((inside.state.position - earth.state.position - Vector3::new(7050.0, 0.0, 0.0)).norm() < 1e-6);

        // Outside the table with no other source
        let outside = calc.calculate_state_vector(&registry, -10, Epoch::J2000 + 500.0, &mut diagnostics);
        assert!(outside.is_none());
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::StateUnavailable { body: -10, .. })));
    }

    #[test]
    fn test_skipped_body_is_silent() {
        let mut configs = sun_earth_moon_configs();
        let mut ghost = body(-20, "Ghost", BodyKind::Moon, Some(399), 1.0);
        ghost.source.skip = true;
        configs.push(ghost);
        let mut registry = BodyRegistry::from_configs(&configs, Epoch::J2000).unwrap();

        let report = StateVectorCalculator::default().update_all(&mut registry, Epoch::J2000);
        assert_eq!(report.skipped, vec![-20]);
        assert!(report.diagnostics.is_empty());
        assert!(registry.state(-20).is_none());
    }

    #[test]
    fn test_physics_fallback_from_last_known_state() {
        let mut configs = vec![earth_config()];
        let mut sat = body(-30, "Relay", BodyKind::Moon, Some(399), 1e-6);
        sat.source.physics_fallback = true;
        configs.push(sat);
        let mut registry = BodyRegistry::from_configs(&configs, Epoch::J2000).unwrap();

        let r = 42_164.0;
        let v = (MU_EARTH / r).sqrt();
        registry.set_state(399, OrbitalState::zero(Epoch::J2000));
        registry.set_state(
            -30,
            OrbitalState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, v, 0.0), Epoch::J2000),
        );

        let calc = StateVectorCalculator::new(FallbackSettings {
            step: 60.0,
            ..FallbackSettings::default()
        });
        let period = std::f64::consts::TAU * (r * r * r / MU_EARTH).sqrt();
        let t = Epoch::J2000 + period / 4.0;
        assert_eq!(calc.select_source(&registry, -30, t), DataSource::PhysicsFallback);

        let report = calc.update_all(&mut registry, t);
        assert!(report.diagnostics.is_empty());
        let state = registry.state(-30).unwrap();
        assert!((state.position - Vector3::new(0.0, r, 0.0)).norm() < 1.0);
        assert!((state.radius() - r).abs() < 0.1);
    }
}
