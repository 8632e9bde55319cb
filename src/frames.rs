//! Reference frame transforms
//!
//! The common inertial frame is the J2000 ecliptic (ECLIPJ2000), centered
//! wherever the caller puts the origin. Body-fixed frames are reached through
//! the body's equatorial frame, defined by its pole right ascension and
//! declination (IAU convention) and a prime-meridian rotation angle.
//!
//! All matrices here are passive: they re-express a fixed vector in a new
//! set of axes. Angles are radians internally and degrees only in the
//! `*_deg` accessors and constructors.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

use crate::time::{Epoch, SECONDS_PER_DAY};

/// Mean obliquity of the ecliptic at J2000
pub const OBLIQUITY_J2000_DEG: f64 = 23.439;

/// Passive rotation about the x axis
pub fn rotation_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

/// Passive rotation about the z axis
pub fn rotation_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Ecliptic J2000 to equatorial J2000
pub fn ecliptic_to_equatorial_matrix() -> Matrix3<f64> {
    rotation_x(-OBLIQUITY_J2000_DEG.to_radians())
}

pub fn ecliptic_to_equatorial(v: &Vector3<f64>) -> Vector3<f64> {
    ecliptic_to_equatorial_matrix() * v
}

pub fn equatorial_to_ecliptic(v: &Vector3<f64>) -> Vector3<f64> {
    ecliptic_to_equatorial_matrix().transpose() * v
}

/// Greenwich Mean Sidereal Time in radians, wrapped to [0, 2π)
pub fn gmst(epoch: Epoch) -> f64 {
    let d = epoch.days_since_j2000();
    let t = d / 36_525.0;
    let degrees =
        280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t - t * t * t / 38_710_000.0;
    degrees.rem_euclid(360.0).to_radians()
}

/// Wrap an angle to [-π, π)
pub fn wrap_pi(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// How a body's prime meridian advances with time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimeMeridian {
    /// Earth: rotation angle follows Greenwich Mean Sidereal Time
    Gmst,

    /// IAU linear model W = w0 + rate·d (degrees, degrees/day)
    Linear { w0: f64, rate: f64 },

    /// Uniform rotation from W = 0 at J2000 with the given period (s)
    Uniform { period: f64 },
}

/// Pole and spin orientation of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyOrientation {
    /// Pole right ascension at J2000 (degrees) and its rate (degrees/century)
    pub pole_ra: f64,
    pub pole_ra_rate: f64,

    /// Pole declination at J2000 (degrees) and its rate (degrees/century)
    pub pole_dec: f64,
    pub pole_dec_rate: f64,

    pub prime_meridian: PrimeMeridian,
}

impl BodyOrientation {
    /// Orientation with the body's pole along the equatorial z axis
    pub fn equatorial(prime_meridian: PrimeMeridian) -> Self {
        Self {
            pole_ra: 0.0,
            pole_ra_rate: 0.0,
            pole_dec: 90.0,
            pole_dec_rate: 0.0,
            prime_meridian,
        }
    }

    /// Pole right ascension and declination at `epoch`, radians
    pub fn pole(&self, epoch: Epoch) -> (f64, f64) {
        let t = epoch.centuries_since_j2000();
        let ra = self.pole_ra + self.pole_ra_rate * t;
        let dec = self.pole_dec + self.pole_dec_rate * t;
        (ra.to_radians(), dec.to_radians())
    }

    /// Unit spin axis expressed in the ecliptic frame
    pub fn spin_axis(&self, epoch: Epoch) -> Vector3<f64> {
        let (ra, dec) = self.pole(epoch);
        let axis_eq = Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin());
        equatorial_to_ecliptic(&axis_eq)
    }

    /// Prime-meridian angle W in radians
    pub fn rotation_angle(&self, epoch: Epoch) -> f64 {
        match self.prime_meridian {
            // The node of Earth's equator on itself is the +x axis, 90° behind W = 0
            PrimeMeridian::Gmst => gmst(epoch) - FRAC_PI_2,
            PrimeMeridian::Linear { w0, rate } => {
                (w0 + rate * epoch.days_since_j2000()).rem_euclid(360.0).to_radians()
            }
            PrimeMeridian::Uniform { period } => {
                if period == 0.0 || !period.is_finite() {
                    0.0
                } else {
                    (TAU * epoch.seconds() / period).rem_euclid(TAU)
                }
            }
        }
    }

    /// Ecliptic to the body's non-rotating equatorial frame
    pub fn ecliptic_to_equator(&self, epoch: Epoch) -> Matrix3<f64> {
        let (ra, dec) = self.pole(epoch);
        rotation_x(FRAC_PI_2 - dec) * rotation_z(FRAC_PI_2 + ra) * ecliptic_to_equatorial_matrix()
    }

    /// Ecliptic to the body-fixed rotating frame
    pub fn ecliptic_to_body_fixed(&self, epoch: Epoch) -> Matrix3<f64> {
        rotation_z(self.rotation_angle(epoch)) * self.ecliptic_to_equator(epoch)
    }
}

/// Body-centered inertial (ecliptic) vector to body-fixed coordinates
pub fn inertial_to_body_fixed(
    position: &Vector3<f64>,
    orientation: &BodyOrientation,
    epoch: Epoch,
) -> Vector3<f64> {
    orientation.ecliptic_to_body_fixed(epoch) * position
}

/// Body-fixed coordinates back to the body-centered ecliptic frame
pub fn body_fixed_to_inertial(
    position: &Vector3<f64>,
    orientation: &BodyOrientation,
    epoch: Epoch,
) -> Vector3<f64> {
    orientation.ecliptic_to_body_fixed(epoch).transpose() * position
}

/// Oblate reference surface of a body (km)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spheroid {
    pub equatorial_radius: f64,
    pub polar_radius: f64,
}

impl Spheroid {
    pub fn new(equatorial_radius: f64, polar_radius: f64) -> Self {
        Self {
            equatorial_radius,
            polar_radius,
        }
    }

    pub fn sphere(radius: f64) -> Self {
        Self::new(radius, radius)
    }

    /// First eccentricity squared
    pub fn eccentricity_squared(&self) -> f64 {
        let a2 = self.equatorial_radius * self.equatorial_radius;
        let b2 = self.polar_radius * self.polar_radius;
        (a2 - b2) / a2
    }

    pub fn flattening(&self) -> f64 {
        (self.equatorial_radius - self.polar_radius) / self.equatorial_radius
    }

    /// Distance from the center to the surface along a body-fixed direction
    pub fn surface_radius(&self, direction: &Vector3<f64>) -> f64 {
        let n = direction.norm();
        if n == 0.0 {
            return self.equatorial_radius;
        }
        let u = direction / n;
        let a2 = self.equatorial_radius * self.equatorial_radius;
        let b2 = self.polar_radius * self.polar_radius;
        1.0 / ((u.x * u.x + u.y * u.y) / a2 + u.z * u.z / b2).sqrt()
    }
}

/// Geodetic coordinates: latitude/longitude in radians, altitude in km
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geodetic {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Geodetic {
    pub fn from_degrees(latitude_deg: f64, longitude_deg: f64, altitude_km: f64) -> Self {
        Self {
            latitude: latitude_deg.to_radians(),
            longitude: longitude_deg.to_radians(),
            altitude: altitude_km,
        }
    }

    pub fn latitude_deg(&self) -> f64 {
        self.latitude.to_degrees()
    }

    pub fn longitude_deg(&self) -> f64 {
        self.longitude.to_degrees()
    }
}

/// Geodetic to body-fixed Cartesian (km)
pub fn geodetic_to_cartesian(geodetic: &Geodetic, spheroid: &Spheroid) -> Vector3<f64> {
    let a = spheroid.equatorial_radius;
    let e2 = spheroid.eccentricity_squared();
    let (sin_lat, cos_lat) = geodetic.latitude.sin_cos();
    let (sin_lon, cos_lon) = geodetic.longitude.sin_cos();

    // Prime-vertical radius of curvature
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let h = geodetic.altitude;

    Vector3::new(
        (n + h) * cos_lat * cos_lon,
        (n + h) * cos_lat * sin_lon,
        (n * (1.0 - e2) + h) * sin_lat,
    )
}

/// Body-fixed Cartesian (km) to geodetic, Heikkinen's closed form
pub fn cartesian_to_geodetic(position: &Vector3<f64>, spheroid: &Spheroid) -> Geodetic {
    let a = spheroid.equatorial_radius;
    let b = spheroid.polar_radius;
    let (x, y, z) = (position.x, position.y, position.z);
    let longitude = y.atan2(x);
    let p = x.hypot(y);
    let e2 = spheroid.eccentricity_squared();

    if e2.abs() < 1e-15 {
        return Geodetic {
            latitude: z.atan2(p),
            longitude,
            altitude: position.norm() - a,
        };
    }

    if p < 1e-9 && z.abs() < 1e-9 {
        return Geodetic {
            latitude: 0.0,
            longitude,
            altitude: -a,
        };
    }

    let a2 = a * a;
    let b2 = b * b;
    let ep2 = (a2 - b2) / b2;
    let f = 54.0 * b2 * z * z;
    let g = p * p + (1.0 - e2) * z * z - e2 * (a2 - b2);
    let c = e2 * e2 * f * p * p / (g * g * g);
    let s = (1.0 + c + (c * c + 2.0 * c).sqrt()).cbrt();
    let k = s + 1.0 / s + 1.0;
    let pp = f / (3.0 * k * k * g * g);
    let q = (1.0 + 2.0 * e2 * e2 * pp).sqrt();
    let r0 = -pp * e2 * p / (1.0 + q)
        + (0.5 * a2 * (1.0 + 1.0 / q) - pp * (1.0 - e2) * z * z / (q * (1.0 + q)) - 0.5 * pp * p * p)
            .max(0.0)
            .sqrt();
    let t = p - e2 * r0;
    let u = (t * t + z * z).sqrt();
    let v = (t * t + (1.0 - e2) * z * z).sqrt();
    let z0 = b2 * z / (a * v);

    Geodetic {
        latitude: (z + ep2 * z0).atan2(p),
        longitude,
        altitude: u * (1.0 - b2 / (a * v)),
    }
}

/// Sub-satellite point for a body-relative inertial position
pub fn ground_track_point(
    position: &Vector3<f64>,
    orientation: &BodyOrientation,
    spheroid: &Spheroid,
    epoch: Epoch,
) -> Geodetic {
    let body_fixed = inertial_to_body_fixed(position, orientation, epoch);
    cartesian_to_geodetic(&body_fixed, spheroid)
}

/// Columns are the prograde, orbit-normal and radial-out unit vectors
///
/// `None` when the velocity is zero or parallel to the position, where the
/// orbit plane is undefined.
pub fn local_orbital_frame(position: &Vector3<f64>, velocity: &Vector3<f64>) -> Option<Matrix3<f64>> {
    const EPS: f64 = 1e-12;
    let t = velocity.try_normalize(EPS)?;
    let n = position.cross(velocity).try_normalize(EPS)?;
    let b = t.cross(&n);
    Some(Matrix3::from_columns(&[t, n, b]))
}

/// Angular rate (rad/s) for a rotation period in seconds; zero for a zero
/// or non-finite period
pub fn rotation_rate(period_s: f64) -> f64 {
    if period_s == 0.0 || !period_s.is_finite() {
        0.0
    } else {
        TAU / period_s
    }
}

/// Convert a prime-meridian rate in degrees/day to rad/s
pub fn deg_per_day_to_rad_per_s(rate: f64) -> f64 {
    rate.to_radians() / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const EARTH: Spheroid = Spheroid {
        equatorial_radius: 6378.1366,
        polar_radius: 6356.7519,
    };

    #[test]
    fn test_ecliptic_pole_in_equatorial() {
        let pole = ecliptic_to_equatorial(&Vector3::z());
        let eps = OBLIQUITY_J2000_DEG.to_radians();

        // Ecliptic north pole sits at RA 18h, Dec 90° - ε
        assert!(pole.x.abs() < 1e-12);
        assert!((pole.y + eps.sin()).abs() < 1e-12);
        assert!((pole.z - eps.cos()).abs() < 1e-12);

        let back = equatorial_to_ecliptic(&pole);
        assert!((back - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_gmst_at_j2000() {
        let expected = 280.460_618_37_f64.to_radians();
        assert!((gmst(Epoch::J2000) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_pole_maps_to_body_z() {
        let mars = BodyOrientation {
            pole_ra: 317.68143,
            pole_ra_rate: -0.1061,
            pole_dec: 52.8865,
            pole_dec_rate: -0.0609,
            prime_meridian: PrimeMeridian::Linear {
                w0: 176.63,
                rate: 350.891_982_26,
            },
        };
        let epoch = Epoch::from_seconds(8.0e8);
        let axis = mars.spin_axis(epoch);
        let fixed = inertial_to_body_fixed(&axis, &mars, epoch);
        assert!((fixed - Vector3::z()).norm() < 1e-12);

        let v = Vector3::new(1.0, -2.0, 0.5);
        let round = body_fixed_to_inertial(&inertial_to_body_fixed(&v, &mars, epoch), &mars, epoch);
        assert!((round - v).norm() < 1e-12);
    }

    #[test]
    fn test_earth_greenwich_direction() {
        let earth = BodyOrientation::equatorial(PrimeMeridian::Gmst);
        let epoch = Epoch::from_seconds(123_456.0);
        let theta = gmst(epoch);

        // The equatorial direction of Greenwich is the body-fixed x axis
        let greenwich_eq = Vector3::new(theta.cos(), theta.sin(), 0.0);
        let greenwich_ecl = equatorial_to_ecliptic(&greenwich_eq);
        let fixed = inertial_to_body_fixed(&greenwich_ecl, &earth, epoch);
        assert!((fixed - Vector3::x()).norm() < 1e-12);
    }

    #[test]
    fn test_geodetic_round_trip_random() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let original = Geodetic::from_degrees(
                rng.gen_range(-90.0..=90.0),
                rng.gen_range(-180.0..180.0),
                rng.gen_range(0.0..2000.0),
            );
            let cartesian = geodetic_to_cartesian(&original, &EARTH);
            let recovered = cartesian_to_geodetic(&cartesian, &EARTH);
            let cartesian_again = geodetic_to_cartesian(&recovered, &EARTH);

            let rel = (cartesian_again - cartesian).norm() / cartesian.norm();
            assert!(rel < 1e-6, "relative error {}", rel);
            assert!((recovered.latitude - original.latitude).abs() < 1e-9);
            if original.latitude.abs() < FRAC_PI_2 - 1e-9 {
                assert!(wrap_pi(recovered.longitude - original.longitude).abs() < 1e-9);
            }
            assert!((recovered.altitude - original.altitude).abs() < 1e-6);
        }
    }

    #[test]
    fn test_geodetic_sphere_and_poles() {
        let sphere = Spheroid::sphere(6371.0);
        let north = geodetic_to_cartesian(&Geodetic::from_degrees(90.0, 0.0, 200.0), &sphere);
        let g = cartesian_to_geodetic(&north, &sphere);
        assert!((g.latitude_deg() - 90.0).abs() < 1e-9);
        assert!((g.altitude - 200.0).abs() < 1e-9);

        let pole = Vector3::new(0.0, 0.0, EARTH.polar_radius + 100.0);
        let g = cartesian_to_geodetic(&pole, &EARTH);
        assert!((g.latitude_deg() - 90.0).abs() < 1e-9);
        assert!((g.altitude - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_surface_radius() {
        assert!((EARTH.surface_radius(&Vector3::x()) - EARTH.equatorial_radius).abs() < 1e-9);
        assert!((EARTH.surface_radius(&-Vector3::z()) - EARTH.polar_radius).abs() < 1e-9);
    }

    #[test]
    fn test_local_orbital_frame() {
        let r = Vector3::new(7000.0, 0.0, 0.0);
        let v = Vector3::new(0.0, 7.5, 0.0);
        let frame = local_orbital_frame(&r, &v).unwrap();
        assert!((frame.column(0) - Vector3::y()).norm() < 1e-12);
        assert!((frame.column(1) - Vector3::z()).norm() < 1e-12);
        assert!((frame.column(2) - Vector3::x()).norm() < 1e-12);
    }

    #[test]
    fn test_local_orbital_frame_undefined_without_tangential_motion() {
        let r = Vector3::new(7000.0, 0.0, 0.0);
        assert!(local_orbital_frame(&r, &Vector3::zeros()).is_none());
        assert!(local_orbital_frame(&r, &Vector3::new(3.0, 0.0, 0.0)).is_none());
        assert!(local_orbital_frame(&r, &Vector3::new(-1.0, 1e-3, 0.0)).is_some());
    }
}
