//! Celestial body registry
//!
//! Bodies form a tree rooted at a single body (normally the solar system
//! barycenter). Barycenters are bookkeeping nodes: their GM is the sum of
//! their children's, they never act as a satellite's central body and they
//! are never gravitating sources themselves. Positions stored on bodies are
//! relative to the root, in the J2000 ecliptic frame.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::data::{BodyCatalog, BodyConfig, PoleConfig};
use crate::ephemeris::{OrbitalElements, TabulatedEphemeris};
use crate::error::CatalogError;
use crate::frames::{
    deg_per_day_to_rad_per_s, rotation_rate, BodyOrientation, PrimeMeridian, Spheroid,
};
use crate::propagation::atmosphere::{AtmosphereModel, ExponentialAtmosphere};
use crate::propagation::state::GRAVITATIONAL_CONSTANT;
use crate::propagation::OrbitalState;
use crate::time::Epoch;

/// NAIF-style integer body identifier
pub type BodyId = i32;

/// Earth's sidereal rate, used when a GMST-driven body has no period
const EARTH_ROTATION_RATE: f64 = 7.292_115_9e-5;

/// SOI exponent in the Laplace approximation r = a·(m/M)^0.4
const SOI_EXPONENT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Barycenter,
    Star,
    Planet,
    DwarfPlanet,
    Moon,
}

impl BodyKind {
    pub fn name(&self) -> &'static str {
        match self {
            BodyKind::Barycenter => "Barycenter",
            BodyKind::Star => "Star",
            BodyKind::Planet => "Planet",
            BodyKind::DwarfPlanet => "Dwarf planet",
            BodyKind::Moon => "Moon",
        }
    }
}

impl fmt::Display for BodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The state sources configured for a body, in priority order
#[derive(Debug, Clone, Default)]
pub struct EphemerisSources {
    pub tabulated: Option<TabulatedEphemeris>,
    pub elements: Option<OrbitalElements>,
    pub barycenter_relative: bool,
    pub physics_fallback: bool,
    pub skip: bool,
}

/// A gravitating body (or barycenter) in the hierarchy
#[derive(Debug, Clone)]
pub struct CelestialBody {
    pub id: BodyId,
    pub name: String,
    pub kind: BodyKind,
    pub parent: Option<BodyId>,
    pub children: Vec<BodyId>,

    /// Gravitational parameter (km³/s²)
    pub gm: f64,
    /// Mass (kg)
    pub mass: f64,

    /// Equatorial radius (km), zero for barycenters
    pub radius: f64,
    pub polar_radius: f64,
    pub j2: Option<f64>,

    /// Sidereal rotation period (s); negative for retrograde spin
    pub rotation_period: Option<f64>,
    pub orientation: Option<BodyOrientation>,
    pub atmosphere: Option<Arc<dyn AtmosphereModel>>,

    pub sources: EphemerisSources,

    /// Sphere-of-influence radius (km); `None` for barycenters and for
    /// bodies whose orbit size is unknown
    pub soi_radius: Option<f64>,

    /// State at the registry's current epoch, if one could be computed
    pub state: Option<OrbitalState>,

    /// Most recent successfully computed state
    pub last_known: Option<OrbitalState>,
}

impl CelestialBody {
    pub fn is_barycenter(&self) -> bool {
        self.kind == BodyKind::Barycenter
    }

    pub fn spheroid(&self) -> Spheroid {
        Spheroid::new(self.radius, self.polar_radius)
    }

    /// Unit spin axis in the ecliptic frame (ecliptic north without a pole)
    pub fn spin_axis(&self, epoch: Epoch) -> Vector3<f64> {
        self.orientation
            .map(|o| o.spin_axis(epoch))
            .unwrap_or_else(Vector3::z)
    }

    /// Signed spin rate about the spin axis (rad/s)
    pub fn spin_rate(&self) -> f64 {
        if let Some(period) = self.rotation_period {
            return rotation_rate(period);
        }
        match self.orientation.map(|o| o.prime_meridian) {
            Some(PrimeMeridian::Gmst) => EARTH_ROTATION_RATE,
            Some(PrimeMeridian::Linear { rate, .. }) => deg_per_day_to_rad_per_s(rate),
            Some(PrimeMeridian::Uniform { period }) => rotation_rate(period),
            None => 0.0,
        }
    }

    /// Angular velocity vector ω (rad/s) in the ecliptic frame
    pub fn angular_velocity(&self, epoch: Epoch) -> Vector3<f64> {
        self.spin_axis(epoch) * self.spin_rate()
    }

    /// Height above the reference spheroid along the radial line
    ///
    /// `relative_position` is body-centered, ecliptic axes.
    pub fn altitude(&self, relative_position: &Vector3<f64>, epoch: Epoch) -> f64 {
        let r = relative_position.norm();
        if self.radius <= 0.0 {
            return r;
        }
        let local = match &self.orientation {
            Some(o) => o.ecliptic_to_equator(epoch) * relative_position,
            None => *relative_position,
        };
        r - self.spheroid().surface_radius(&local)
    }
}

/// Validated body hierarchy plus the current body states
#[derive(Debug, Clone)]
pub struct BodyRegistry {
    bodies: BTreeMap<BodyId, CelestialBody>,
    root: BodyId,
    /// Breadth-first order from the root: parents precede children
    order: Vec<BodyId>,
    /// Reference epoch of the catalog
    catalog_epoch: Epoch,
    /// Epoch the body states were last computed for
    state_epoch: Option<Epoch>,
}

impl BodyRegistry {
    /// Validate a catalog and build the registry
    pub fn from_catalog(catalog: &BodyCatalog) -> Result<Self, CatalogError> {
        let epoch: Epoch = catalog
            .epoch
            .parse()
            .map_err(|_| CatalogError::InvalidEpoch(catalog.epoch.clone()))?;
        Self::from_configs(&catalog.bodies, epoch)
    }

    /// Validate body entries against a default element epoch
    pub fn from_configs(configs: &[BodyConfig], epoch: Epoch) -> Result<Self, CatalogError> {
        if configs.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut bodies = BTreeMap::new();
        let mut root = None;
        for config in configs {
            if bodies.contains_key(&config.id) {
                return Err(CatalogError::DuplicateId(config.id));
            }
            if config.parent.is_none() {
                if let Some(existing) = root {
                    return Err(CatalogError::MultipleRoots(existing, config.id));
                }
                root = Some(config.id);
            }
            bodies.insert(config.id, body_from_config(config, epoch)?);
        }
        let root = root.ok_or(CatalogError::NoRoot)?;

        // Link children in catalog order
        for config in configs {
            if let Some(parent) = config.parent {
                if parent == config.id {
                    return Err(CatalogError::Cycle(config.id));
                }
                match bodies.get_mut(&parent) {
                    Some(p) => p.children.push(config.id),
                    None => {
                        return Err(CatalogError::UnknownParent {
                            id: config.id,
                            parent,
                        })
                    }
                }
            }
        }

        // Every body has one parent and there is one root, so anything the
        // walk from the root misses sits on a cycle.
        let mut order = Vec::with_capacity(bodies.len());
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(body) = bodies.get(&id) {
                queue.extend(body.children.iter().copied());
            }
        }
        if order.len() != bodies.len() {
            let stray = bodies
                .keys()
                .copied()
                .find(|id| !order.contains(id))
                .unwrap_or(root);
            return Err(CatalogError::Cycle(stray));
        }

        // Element and table centers must exist
        for body in bodies.values() {
            let centers = body
                .sources
                .elements
                .as_ref()
                .map(|e| e.center)
                .into_iter()
                .chain(body.sources.tabulated.as_ref().map(|t| t.center));
            for center in centers {
                if !bodies.contains_key(&center) || center == body.id {
                    return Err(CatalogError::UnknownCenter {
                        id: body.id,
                        center,
                    });
                }
            }
        }

        let mut registry = Self {
            bodies,
            root,
            order,
            catalog_epoch: epoch,
            state_epoch: None,
        };
        registry.derive_barycenter_masses();
        registry.compute_soi_radii();

        log::info!(
            "Loaded {} bodies rooted at {}",
            registry.bodies.len(),
            registry.name_of(root)
        );
        Ok(registry)
    }

    /// Barycenters without an explicit GM carry the sum of their children's
    fn derive_barycenter_masses(&mut self) {
        for id in self.order.clone().into_iter().rev() {
            let Some(body) = self.bodies.get(&id) else {
                continue;
            };
            if !body.is_barycenter() || body.gm > 0.0 {
                continue;
            }
            let total: f64 = body
                .children
                .iter()
                .filter_map(|c| self.bodies.get(c))
                .map(|c| c.gm)
                .sum();
            if let Some(body) = self.bodies.get_mut(&id) {
                body.gm = total;
                body.mass = total / GRAVITATIONAL_CONSTANT;
            }
        }
    }

    fn compute_soi_radii(&mut self) {
        let radii: Vec<(BodyId, Option<f64>)> = self
            .order
            .iter()
            .map(|&id| (id, self.sphere_of_influence(id)))
            .collect();
        for (id, radius) in radii {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.soi_radius = radius;
            }
        }
    }

    fn sphere_of_influence(&self, id: BodyId) -> Option<f64> {
        let body = self.get(id)?;
        if body.is_barycenter() {
            return None;
        }
        let Some(primary) = self.primary(id).and_then(|p| self.get(p)) else {
            return Some(f64::INFINITY);
        };
        if primary.gm <= 0.0 || body.gm <= 0.0 {
            return None;
        }
        let a = self.orbit_size(id)?;
        Some(a * (body.gm / primary.gm).powf(SOI_EXPONENT))
    }

    /// Semi-major axis of the body's own orbit, or of the nearest
    /// barycenter ancestor that has elements
    fn orbit_size(&self, id: BodyId) -> Option<f64> {
        let body = self.get(id)?;
        if let Some(elements) = &body.sources.elements {
            return Some(elements.semi_major_axis);
        }
        let mut cursor = body.parent;
        while let Some(pid) = cursor {
            let parent = self.get(pid)?;
            if !parent.is_barycenter() {
                return None;
            }
            if let Some(elements) = &parent.sources.elements {
                return Some(elements.semi_major_axis);
            }
            cursor = parent.parent;
        }
        None
    }

    pub fn get(&self, id: BodyId) -> Option<&CelestialBody> {
        self.bodies.get(&id)
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut CelestialBody> {
        self.bodies.get_mut(&id)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn root(&self) -> BodyId {
        self.root
    }

    pub fn catalog_epoch(&self) -> Epoch {
        self.catalog_epoch
    }

    pub fn state_epoch(&self) -> Option<Epoch> {
        self.state_epoch
    }

    /// Bodies in parent-before-child order
    pub fn iter(&self) -> impl Iterator<Item = &CelestialBody> + '_ {
        self.order.iter().filter_map(move |id| self.bodies.get(id))
    }

    pub fn ids(&self) -> &[BodyId] {
        &self.order
    }

    pub fn parent(&self, id: BodyId) -> Option<BodyId> {
        self.get(id).and_then(|b| b.parent)
    }

    pub fn children(&self, id: BodyId) -> &[BodyId] {
        self.get(id).map(|b| b.children.as_slice()).unwrap_or(&[])
    }

    /// Display name, falling back to the id
    pub fn name_of(&self, id: BodyId) -> String {
        self.get(id)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Look a body up by case-insensitive name or numeric id
    pub fn find(&self, key: &str) -> Option<&CelestialBody> {
        if let Ok(id) = key.trim().parse::<BodyId>() {
            return self.get(id);
        }
        let key = key.trim().to_lowercase();
        self.iter().find(|b| b.name.to_lowercase() == key)
    }

    /// Most massive non-barycenter child of a body
    pub fn dominant_child(&self, id: BodyId) -> Option<BodyId> {
        self.children(id)
            .iter()
            .filter_map(|c| self.get(*c))
            .filter(|c| !c.is_barycenter())
            .max_by(|a, b| a.gm.total_cmp(&b.gm))
            .map(|c| c.id)
    }

    /// The body this one orbits, seen through barycenters
    ///
    /// Earth's parent is the Earth-Moon barycenter, but its primary is the
    /// Sun. The Moon's primary is Earth.
    pub fn primary(&self, id: BodyId) -> Option<BodyId> {
        let parent_id = self.get(id)?.parent?;
        let parent = self.get(parent_id)?;
        if !parent.is_barycenter() {
            return Some(parent_id);
        }
        match self.dominant_child(parent_id) {
            Some(dominant) if dominant != id => Some(dominant),
            _ => self.primary(parent_id),
        }
    }

    /// Non-barycenter bodies whose primary is `id`
    pub fn gravitational_satellites(&self, id: BodyId) -> Vec<BodyId> {
        self.iter()
            .filter(|b| !b.is_barycenter() && b.id != id)
            .filter(|b| self.primary(b.id) == Some(id))
            .map(|b| b.id)
            .collect()
    }

    /// Sphere-of-influence radius; infinite for the top-level body
    pub fn soi_radius(&self, id: BodyId) -> Option<f64> {
        self.get(id).and_then(|b| b.soi_radius)
    }

    /// Whether a body may act as a satellite's central body
    pub fn can_be_central(&self, id: BodyId) -> bool {
        self.get(id).map(|b| !b.is_barycenter()).unwrap_or(false)
    }

    /// Gravitational parameter for two-body motion of `id` about `center`
    pub fn two_body_mu(&self, id: BodyId, center: BodyId) -> f64 {
        let body_gm = self.get(id).map(|b| b.gm).unwrap_or(0.0);
        let center_gm = match self.get(center) {
            Some(c) if c.is_barycenter() => self
                .dominant_child(center)
                .filter(|d| *d != id)
                .and_then(|d| self.get(d))
                .map(|d| d.gm)
                .unwrap_or(c.gm),
            Some(c) => c.gm,
            None => 0.0,
        };
        center_gm + body_gm
    }

    pub fn state(&self, id: BodyId) -> Option<&OrbitalState> {
        self.get(id).and_then(|b| b.state.as_ref())
    }

    /// Replace every body state at once
    ///
    /// Bodies missing from `states` lose their current state but keep
    /// their last known one.
    pub fn apply_states(&mut self, states: &HashMap<BodyId, OrbitalState>, epoch: Epoch) {
        for body in self.bodies.values_mut() {
            body.state = states.get(&body.id).copied();
            if body.state.is_some() {
                body.last_known = body.state;
            }
        }
        self.state_epoch = Some(epoch);
    }

    pub fn set_state(&mut self, id: BodyId, state: OrbitalState) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.state = Some(state);
            body.last_known = Some(state);
        }
    }

    /// Snapshot of every body that has a state this tick
    pub fn bodies_with_state(&self) -> Vec<(BodyId, OrbitalState)> {
        self.iter()
            .filter_map(|b| b.state.map(|s| (b.id, s)))
            .collect()
    }

    /// Gravitating (non-barycenter, positive GM) bodies that have a state
    pub fn massive_bodies_with_state(&self) -> impl Iterator<Item = (&CelestialBody, &OrbitalState)> + '_ {
        self.iter()
            .filter(|b| !b.is_barycenter() && b.gm > 0.0)
            .filter_map(|b| b.state.as_ref().map(|s| (b, s)))
    }
}

fn body_from_config(config: &BodyConfig, epoch: Epoch) -> Result<CelestialBody, CatalogError> {
    let id = config.id;
    let positive = |field: &'static str, value: Option<f64>| -> Result<Option<f64>, CatalogError> {
        match value {
            Some(v) if !v.is_finite() || v < 0.0 => {
                Err(CatalogError::InvalidParameter { id, field, value: v })
            }
            other => Ok(other),
        }
    };

    let gm = positive("gm", config.gm)?;
    let mass = positive("mass", config.mass)?;
    let (gm, mass) = match (gm, mass) {
        (Some(gm), Some(mass)) => (gm, mass),
        (Some(gm), None) => (gm, gm / GRAVITATIONAL_CONSTANT),
        (None, Some(mass)) => (mass * GRAVITATIONAL_CONSTANT, mass),
        (None, None) => (0.0, 0.0),
    };
    // Barycenter GM is summed from the children later
    if config.kind != BodyKind::Barycenter && gm <= 0.0 {
        return Err(CatalogError::InvalidParameter { id, field: "gm", value: gm });
    }

    let radius = positive("radius", config.radius)?.unwrap_or(0.0);
    let polar_radius = positive("polar_radius", config.polar_radius)?.unwrap_or(radius);
    if polar_radius > radius {
        return Err(CatalogError::InvalidParameter {
            id,
            field: "polar_radius",
            value: polar_radius,
        });
    }

    if let Some(period) = config.rotation_period {
        if !period.is_finite() || period == 0.0 {
            return Err(CatalogError::InvalidParameter {
                id,
                field: "rotation_period",
                value: period,
            });
        }
    }
    if let Some(j2) = config.j2 {
        if !j2.is_finite() {
            return Err(CatalogError::InvalidParameter {
                id,
                field: "j2",
                value: j2,
            });
        }
    }

    let orientation = config
        .pole
        .as_ref()
        .map(|pole| orientation_from_config(pole, config.rotation_period));

    let atmosphere = match &config.atmosphere {
        Some(a) => {
            let model = ExponentialAtmosphere::new(
                a.reference_altitude,
                a.reference_density,
                a.scale_height,
                a.min_altitude,
                a.max_altitude,
            );
            model.validate().map_err(|reason| CatalogError::InvalidModel {
                id,
                what: "atmosphere",
                reason,
            })?;
            Some(Arc::new(model) as Arc<dyn AtmosphereModel>)
        }
        None => None,
    };

    let source = &config.source;
    let default_center = config.parent.unwrap_or(id);

    let elements = match &source.elements {
        Some(e) => {
            let element_epoch = match &e.epoch {
                Some(text) => text
                    .parse()
                    .map_err(|_| CatalogError::InvalidEpoch(text.clone()))?,
                None => epoch,
            };
            let elements = OrbitalElements::from_degrees(
                e.a,
                e.e,
                e.i,
                e.raan,
                e.arg_periapsis,
                e.mean_anomaly,
                element_epoch,
                e.frame,
                e.center.unwrap_or(default_center),
            );
            match elements.degeneracy() {
                None => Some(elements),
                Some(reason) if source.skip => {
                    log::debug!("Ignoring degenerate elements for skipped body {}: {}", id, reason);
                    None
                }
                Some(reason) => return Err(CatalogError::DegenerateElements { id, reason }),
            }
        }
        None => None,
    };

    let tabulated = match &source.tabulated {
        Some(table) => {
            let mut samples = Vec::with_capacity(table.samples.len());
            for sample in &table.samples {
                let sample_epoch: Epoch = sample
                    .epoch
                    .parse()
                    .map_err(|_| CatalogError::InvalidEpoch(sample.epoch.clone()))?;
                samples.push(OrbitalState::new(
                    Vector3::from(sample.position),
                    Vector3::from(sample.velocity),
                    sample_epoch,
                ));
            }
            let center = table.center.unwrap_or(default_center);
            Some(TabulatedEphemeris::new(samples, center).map_err(|reason| {
                CatalogError::InvalidModel {
                    id,
                    what: "ephemeris table",
                    reason,
                }
            })?)
        }
        None => None,
    };

    Ok(CelestialBody {
        id,
        name: config.name.clone(),
        kind: config.kind,
        parent: config.parent,
        children: Vec::new(),
        gm,
        mass,
        radius,
        polar_radius,
        j2: config.j2,
        rotation_period: config.rotation_period,
        orientation,
        atmosphere,
        sources: EphemerisSources {
            tabulated,
            elements,
            barycenter_relative: source.barycenter_relative,
            physics_fallback: source.physics_fallback,
            skip: source.skip,
        },
        soi_radius: None,
        state: None,
        last_known: None,
    })
}

fn orientation_from_config(pole: &PoleConfig, rotation_period: Option<f64>) -> BodyOrientation {
    let prime_meridian = if pole.gmst {
        PrimeMeridian::Gmst
    } else if let (Some(w0), Some(rate)) = (pole.w0, pole.w_rate) {
        PrimeMeridian::Linear { w0, rate }
    } else {
        PrimeMeridian::Uniform {
            period: rotation_period.unwrap_or(0.0),
        }
    };
    BodyOrientation {
        pole_ra: pole.ra,
        pole_ra_rate: pole.ra_rate,
        pole_dec: pole.dec,
        pole_dec_rate: pole.dec_rate,
        prime_meridian,
    }
}
