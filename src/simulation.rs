//! Live simulation context
//!
//! A [`Simulation`] owns the body registry, the satellites, the settings and
//! the clock. Each sub-step runs in a fixed order: bring every body to the
//! current time, fire due maneuvers, integrate every active satellite
//! against that frozen snapshot, move the clock and the bodies forward, then
//! check sphere-of-influence transitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::Vector3;
use serde::Serialize;

use crate::bodies::{BodyId, BodyRegistry};
use crate::error::{Diagnostic, ManeuverError, PropagationError, SatelliteError};
use crate::maneuver::{plan_hohmann, DeltaVFrame, HohmannTransfer, ManeuverId, ManeuverPlan};
use crate::propagation::orbit_track::{sample_body_orbit, sample_satellite_orbit};
use crate::propagation::{
    check_soi, ground_track, push_unique, validate_spacecraft, GroundTrackPoint, OrbitCache, OrbitKey,
    OrbitalState, Orbit, PropagationRequest, PropagationResult, Propagator, SimulationSettings,
    SoiTransition, SpacecraftProperties, SpacecraftState,
};
use crate::time::Epoch;

pub type SatelliteId = u32;

/// Remaining intervals shorter than this (seconds) are not stepped
const TIME_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Serialize)]
pub struct Satellite {
    pub id: SatelliteId,
    pub name: String,
    pub state: SpacecraftState,
    pub maneuvers: ManeuverPlan,

    /// Set when the state went non-finite; halted satellites are kept but
    /// no longer integrated
    pub halted: bool,

    pub diagnostics: Vec<Diagnostic>,
}

/// What happened during a tick or clock jump
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub start: Option<Epoch>,
    pub end: Option<Epoch>,
    pub substeps: usize,
    pub soi_transitions: Vec<(SatelliteId, SoiTransition)>,
    pub executed_maneuvers: Vec<(SatelliteId, ManeuverId)>,
    pub halted: Vec<SatelliteId>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Simulation {
    registry: BodyRegistry,
    satellites: BTreeMap<SatelliteId, Satellite>,
    next_id: SatelliteId,
    settings: SimulationSettings,
    clock: Epoch,
    propagator: Propagator,
    orbits: OrbitCache,
    soi_events: Vec<(SatelliteId, SoiTransition)>,
}

impl Simulation {
    pub fn new(registry: BodyRegistry, settings: SimulationSettings, start: Epoch) -> Self {
        let propagator = Propagator::from_settings(&settings);
        Self::with_propagator(registry, settings, propagator, start)
    }

    /// Simulation driven by a custom propagator
    pub fn with_propagator(
        mut registry: BodyRegistry,
        settings: SimulationSettings,
        propagator: Propagator,
        start: Epoch,
    ) -> Self {
        let report = propagator.calculator().update_all(&mut registry, start);
        for diagnostic in &report.diagnostics {
            log::warn!("{}", diagnostic);
        }
        log::info!(
            "Simulation started at {} with {} bodies ({} positioned)",
            start,
            registry.len(),
            report.resolved
        );

        Self {
            registry,
            satellites: BTreeMap::new(),
            next_id: 1,
            settings,
            clock: start,
            propagator,
            orbits: OrbitCache::new(),
            soi_events: Vec::new(),
        }
    }

    pub fn time(&self) -> Epoch {
        self.clock
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    pub fn orbit_cache(&self) -> &OrbitCache {
        &self.orbits
    }

    /// Every SOI transition since the start, in order
    pub fn soi_events(&self) -> &[(SatelliteId, SoiTransition)] {
        &self.soi_events
    }

    /// Add a satellite at the current time
    ///
    /// Position and velocity are relative to `central_body`. Non-finite
    /// vectors, invalid physical properties and unknown or barycentric
    /// central bodies are rejected.
    pub fn add_satellite(
        &mut self,
        name: impl Into<String>,
        central_body: BodyId,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        properties: SpacecraftProperties,
    ) -> Result<SatelliteId, SatelliteError> {
        let state = SpacecraftState::new(
            OrbitalState::new(position, velocity, self.clock),
            central_body,
            properties,
        );
        validate_spacecraft(&state, &self.registry)?;

        let id = self.next_id;
        self.next_id += 1;
        let name = name.into();
        log::info!(
            "Added satellite {} '{}' around {}",
            id,
            name,
            self.registry.name_of(central_body)
        );
        self.satellites.insert(
            id,
            Satellite {
                id,
                name,
                state,
                maneuvers: ManeuverPlan::new(),
                halted: false,
                diagnostics: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn remove_satellite(&mut self, id: SatelliteId) -> Result<Satellite, SatelliteError> {
        self.orbits.invalidate(OrbitKey::Satellite(id));
        self.satellites.remove(&id).ok_or(SatelliteError::NotFound(id))
    }

    pub fn satellite(&self, id: SatelliteId) -> Option<&Satellite> {
        self.satellites.get(&id)
    }

    pub fn satellites(&self) -> impl Iterator<Item = &Satellite> + '_ {
        self.satellites.values()
    }

    fn satellite_mut(&mut self, id: SatelliteId) -> Result<&mut Satellite, SatelliteError> {
        self.satellites.get_mut(&id).ok_or(SatelliteError::NotFound(id))
    }

    pub fn schedule_maneuver(
        &mut self,
        id: SatelliteId,
        time: Epoch,
        delta_v: Vector3<f64>,
        frame: DeltaVFrame,
    ) -> Result<ManeuverId, ManeuverError> {
        let now = self.clock;
        let satellite = self.satellite_mut(id)?;
        let maneuver = satellite.maneuvers.schedule(time, delta_v, frame, now)?;
        self.orbits.invalidate(OrbitKey::Satellite(id));
        Ok(maneuver)
    }

    /// Schedule a Hohmann transfer from the satellite's current radius
    pub fn plan_hohmann(
        &mut self,
        id: SatelliteId,
        target_radius: f64,
        start: Epoch,
    ) -> Result<HohmannTransfer, ManeuverError> {
        let now = self.clock;
        let satellite = self.satellites.get_mut(&id).ok_or(SatelliteError::NotFound(id))?;
        let mu = self
            .registry
            .get(satellite.state.central_body)
            .map(|b| b.gm)
            .ok_or(SatelliteError::UnknownCentralBody(satellite.state.central_body))?;
        if start < now {
            return Err(ManeuverError::InPast { time: start, now });
        }

        let (transfer, _) = plan_hohmann(
            &mut satellite.maneuvers,
            &satellite.state.orbital,
            mu,
            target_radius,
            start,
        )?;
        self.orbits.invalidate(OrbitKey::Satellite(id));
        Ok(transfer)
    }

    /// Advance by `real_dt · time_warp` simulated seconds
    ///
    /// The interval is split into sub-steps no longer than the configured
    /// live step. Negative warps are rejected.
    pub fn tick(&mut self, real_dt: f64, time_warp: f64) -> Result<TickReport, PropagationError> {
        let dt = real_dt * time_warp;
        if real_dt < 0.0 || time_warp < 0.0 {
            return Err(PropagationError::BackwardPropagation { requested: dt });
        }
        if !dt.is_finite() {
            return Err(PropagationError::InvalidDuration(dt));
        }
        let max_step = self.settings.propagator.max_live_step;
        self.advance(dt, max_step)
    }

    /// Jump the clock forward to `epoch`, integrating at the bulk step size
    pub fn advance_to(&mut self, epoch: Epoch) -> Result<TickReport, PropagationError> {
        let dt = epoch - self.clock;
        if dt < 0.0 {
            return Err(PropagationError::BackwardPropagation { requested: dt });
        }
        if !dt.is_finite() {
            return Err(PropagationError::InvalidDuration(dt));
        }
        let max_step = self.settings.propagator.step_size;
        self.advance(dt, max_step)
    }

    fn advance(&mut self, dt: f64, max_step: f64) -> Result<TickReport, PropagationError> {
        if !max_step.is_finite() || max_step <= 0.0 {
            return Err(PropagationError::InvalidStepSize(max_step));
        }
        if dt > self.settings.orbit_cache.invalidation_threshold {
            self.orbits.invalidate_all();
        }

        let mut report = TickReport {
            start: Some(self.clock),
            ..Default::default()
        };
        let end = self.clock + dt;
        while end - self.clock > TIME_EPSILON {
            let h = max_step.min(end - self.clock);
            self.substep(h, &mut report);
        }
        report.end = Some(self.clock);
        Ok(report)
    }

    fn refresh_bodies(&mut self, report: &mut TickReport) {
        if self.registry.state_epoch() == Some(self.clock) {
            return;
        }
        let update = self.propagator.calculator().update_all(&mut self.registry, self.clock);
        push_unique(&mut report.diagnostics, update.diagnostics);
    }

    fn substep(&mut self, h: f64, report: &mut TickReport) {
        self.refresh_bodies(report);
        let now = self.clock;

        for satellite in self.satellites.values_mut().filter(|s| !s.halted) {
            let mut rejected = Vec::new();
            let fired = satellite.maneuvers.fire_due(&mut satellite.state.orbital, now, h, &mut rejected);
            for maneuver in fired {
                report.executed_maneuvers.push((satellite.id, maneuver));
                self.orbits.invalidate(OrbitKey::Satellite(satellite.id));
            }
            push_unique(&mut satellite.diagnostics, rejected.iter().cloned());
            push_unique(&mut report.diagnostics, rejected);

            let outcome = self.propagator.step(&satellite.state, &self.registry, h);
            push_unique(&mut satellite.diagnostics, outcome.diagnostics.iter().cloned());
            push_unique(&mut report.diagnostics, outcome.diagnostics.iter().cloned());

            if outcome.is_finite() {
                satellite.state = outcome.state;
            } else {
                let diagnostic = Diagnostic::NonFiniteState {
                    satellite: Some(satellite.id),
                    time: now + h,
                };
                log::warn!("{}; satellite halted", diagnostic);
                satellite.halted = true;
                push_unique(&mut satellite.diagnostics, [diagnostic.clone()]);
                push_unique(&mut report.diagnostics, [diagnostic]);
                report.halted.push(satellite.id);
                self.orbits.invalidate(OrbitKey::Satellite(satellite.id));
            }
        }

        self.clock = now + h;
        self.refresh_bodies(report);

        for satellite in self.satellites.values_mut().filter(|s| !s.halted) {
            // Halted satellites keep their last finite epoch
            satellite.state.orbital.epoch = self.clock;
            if let Some(transition) = check_soi(&mut satellite.state, &self.registry) {
                report.soi_transitions.push((satellite.id, transition));
                self.soi_events.push((satellite.id, transition));
                self.orbits.invalidate(OrbitKey::Satellite(satellite.id));
            }
        }
        report.substeps += 1;
    }

    /// Bulk-propagate a satellite from its current state, including its
    /// pending maneuvers, without touching the live simulation
    pub fn propagate_satellite(
        &self,
        id: SatelliteId,
        duration: f64,
        step: Option<f64>,
    ) -> Result<PropagationResult, PropagationError> {
        let satellite = self.satellites.get(&id).ok_or(SatelliteError::NotFound(id))?;
        let mut request = PropagationRequest::new(satellite.state, duration)
            .with_maneuvers(satellite.maneuvers.clone())
            .for_satellite(id);
        request.step = step;
        self.propagator.propagate(request, &self.registry)
    }

    /// Predicted ground track over the next `duration` seconds
    pub fn ground_track(
        &self,
        id: SatelliteId,
        duration: f64,
        step: Option<f64>,
    ) -> Result<Vec<GroundTrackPoint>, PropagationError> {
        let result = self.propagate_satellite(id, duration, step)?;
        Ok(ground_track(&result.samples, &self.registry))
    }

    /// One orbit of a body around its primary, from the cache when possible
    pub fn body_orbit(&self, id: BodyId) -> Option<Arc<Orbit>> {
        let key = OrbitKey::Body(id);
        if let Some(orbit) = self.orbits.get(key) {
            return Some(orbit);
        }
        let orbit = sample_body_orbit(
            &self.registry,
            self.propagator.calculator(),
            id,
            self.clock,
            self.settings.orbit_cache.samples,
        )?;
        Some(self.orbits.insert(key, orbit))
    }

    /// One orbit of a satellite forward from now, from the cache when possible
    pub fn satellite_orbit(&self, id: SatelliteId) -> Option<Arc<Orbit>> {
        let key = OrbitKey::Satellite(id);
        if let Some(orbit) = self.orbits.get(key) {
            return Some(orbit);
        }
        let satellite = self.satellites.get(&id).filter(|s| !s.halted)?;
        let orbit = sample_satellite_orbit(
            &self.propagator,
            &self.registry,
            &satellite.state,
            self.settings.orbit_cache.samples,
        )?;
        Some(self.orbits.insert(key, orbit))
    }
}
