//! Body catalog data structures matching the catalog JSON schema
//!
//! These are plain serde mirrors of the file format. Validation and unit
//! conversion happen when a catalog is turned into a
//! [`BodyRegistry`](crate::bodies::BodyRegistry).

pub mod loader;

pub use loader::{builtin_catalog, load_catalog, load_registry, load_settings};

use serde::{Deserialize, Serialize};

use crate::bodies::{BodyId, BodyKind};
use crate::ephemeris::ElementFrame;

/// Root structure of a catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyCatalog {
    #[serde(default)]
    pub name: Option<String>,

    /// Default epoch for orbital elements and tabulated samples (RFC 3339)
    pub epoch: String,

    pub bodies: Vec<BodyConfig>,
}

/// A single body entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyConfig {
    /// NAIF-style integer id
    pub id: BodyId,
    pub name: String,
    pub kind: BodyKind,

    /// `None` only for the root of the hierarchy
    #[serde(default)]
    pub parent: Option<BodyId>,

    /// Gravitational parameter (km³/s²)
    #[serde(default)]
    pub gm: Option<f64>,

    /// Mass (kg), derived from `gm` when absent
    #[serde(default)]
    pub mass: Option<f64>,

    /// Equatorial (or mean) radius (km)
    #[serde(default)]
    pub radius: Option<f64>,

    /// Polar radius (km), defaults to `radius`
    #[serde(default)]
    pub polar_radius: Option<f64>,

    #[serde(default)]
    pub j2: Option<f64>,

    /// Sidereal rotation period (s); negative for retrograde spin
    #[serde(default)]
    pub rotation_period: Option<f64>,

    #[serde(default)]
    pub pole: Option<PoleConfig>,

    #[serde(default)]
    pub atmosphere: Option<AtmosphereConfig>,

    #[serde(default)]
    pub source: SourceConfig,
}

/// IAU-style pole and prime meridian (degrees, degrees/century, degrees/day)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoleConfig {
    pub ra: f64,
    #[serde(default)]
    pub ra_rate: f64,
    pub dec: f64,
    #[serde(default)]
    pub dec_rate: f64,
    #[serde(default)]
    pub w0: Option<f64>,
    #[serde(default)]
    pub w_rate: Option<f64>,

    /// Prime meridian follows Greenwich Mean Sidereal Time
    #[serde(default)]
    pub gmst: bool,
}

/// Exponential atmosphere parameters (km, kg/km³)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtmosphereConfig {
    #[serde(default)]
    pub reference_altitude: f64,
    pub reference_density: f64,
    pub scale_height: f64,
    #[serde(default)]
    pub min_altitude: f64,
    pub max_altitude: f64,
}

/// Which state sources are configured for a body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub tabulated: Option<TabulatedConfig>,

    #[serde(default)]
    pub elements: Option<ElementsConfig>,

    /// Position the body about its parent barycenter from its companions
    #[serde(default)]
    pub barycenter_relative: bool,

    /// Deliberately excluded: never positioned
    #[serde(default)]
    pub skip: bool,

    /// Allow two-body propagation from the last known state
    #[serde(default = "default_true")]
    pub physics_fallback: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            tabulated: None,
            elements: None,
            barycenter_relative: false,
            skip: false,
            physics_fallback: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Keplerian elements in catalog units (km, degrees)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementsConfig {
    pub a: f64,
    pub e: f64,
    pub i: f64,
    pub raan: f64,
    pub arg_periapsis: f64,
    pub mean_anomaly: f64,

    #[serde(default = "default_frame")]
    pub frame: ElementFrame,

    /// Body the elements are measured about, defaults to the parent
    #[serde(default)]
    pub center: Option<BodyId>,

    /// Overrides the catalog epoch
    #[serde(default)]
    pub epoch: Option<String>,
}

fn default_frame() -> ElementFrame {
    ElementFrame::Ecliptic
}

/// Tabulated states relative to `center` (defaults to the parent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabulatedConfig {
    #[serde(default)]
    pub center: Option<BodyId>,
    pub samples: Vec<SampleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleConfig {
    pub epoch: String,
    /// km
    pub position: [f64; 3],
    /// km/s
    pub velocity: [f64; 3],
}
