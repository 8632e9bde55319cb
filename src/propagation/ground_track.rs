//! Ground tracks: trajectory samples projected onto the central body's surface

use nalgebra::Vector3;
use serde::Serialize;

use super::propagator::TrajectorySample;
use crate::bodies::{BodyId, BodyRegistry, CelestialBody};
use crate::frames::{cartesian_to_geodetic, ground_track_point, rotation_z, wrap_pi, Geodetic};
use crate::time::Epoch;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundTrackPoint {
    pub time: Epoch,
    pub body: BodyId,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Geodetic coordinates of a body-relative inertial position
///
/// Bodies without a pole model spin about ecliptic north.
pub fn geodetic_position(body: &CelestialBody, position: &Vector3<f64>, epoch: Epoch) -> Geodetic {
    let spheroid = body.spheroid();
    match &body.orientation {
        Some(orientation) => ground_track_point(position, orientation, &spheroid, epoch),
        None => {
            let angle = wrap_pi(body.spin_rate() * (epoch - Epoch::J2000));
            cartesian_to_geodetic(&(rotation_z(angle) * position), &spheroid)
        }
    }
}

/// Project samples onto their central bodies
///
/// Samples whose central body is not in `bodies` are left out.
pub fn ground_track(samples: &[TrajectorySample], bodies: &BodyRegistry) -> Vec<GroundTrackPoint> {
    samples
        .iter()
        .filter_map(|sample| {
            let body = bodies.get(sample.central_body)?;
            let geodetic = geodetic_position(body, &sample.position, sample.time);
            Some(GroundTrackPoint {
                time: sample.time,
                body: body.id,
                latitude_deg: geodetic.latitude_deg(),
                longitude_deg: geodetic.longitude_deg(),
                altitude_km: geodetic.altitude,
            })
        })
        .collect()
}
