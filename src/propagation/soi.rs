//! Sphere-of-influence transitions
//!
//! Checked only at step boundaries. A crossing is therefore detected up to
//! one step late, so the satellite can be at most |v|·h past the boundary
//! when it is re-assigned.

use serde::Serialize;

use super::state::{OrbitalState, SpacecraftState};
use crate::bodies::{BodyId, BodyRegistry};
use crate::time::Epoch;

/// A change of central body
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SoiTransition {
    pub time: Epoch,
    pub from: BodyId,
    pub to: BodyId,
}

/// Satellite state relative to the registry root
fn absolute_state(state: &SpacecraftState, registry: &BodyRegistry) -> Option<OrbitalState> {
    registry
        .state(state.central_body)
        .map(|central| state.orbital.offset_by(central))
}

fn distance_to(registry: &BodyRegistry, id: BodyId, absolute: &OrbitalState) -> Option<f64> {
    registry
        .state(id)
        .map(|body| (absolute.position - body.position).norm())
}

/// Reassign the central body if the satellite has left its SOI or entered
/// a smaller one
///
/// Climbs to the primary while outside the current SOI, then descends into
/// the closest gravitational satellite whose SOI contains the satellite.
/// Bodies without a state this tick are never chosen. Returns the
/// transition when the central body changed; the state is then expressed
/// relative to the new body.
pub fn check_soi(state: &mut SpacecraftState, registry: &BodyRegistry) -> Option<SoiTransition> {
    let absolute = absolute_state(state, registry)?;
    let original = state.central_body;
    let mut central = original;

    loop {
        let soi = registry.soi_radius(central).unwrap_or(f64::INFINITY);
        let distance = distance_to(registry, central, &absolute)?;
        if distance <= soi {
            break;
        }
        match registry.primary(central) {
            Some(primary) if registry.state(primary).is_some() && registry.can_be_central(primary) => {
                central = primary;
            }
            _ => break,
        }
    }

    loop {
        let closest = registry
            .gravitational_satellites(central)
            .into_iter()
            .filter(|id| registry.can_be_central(*id))
            .filter_map(|id| {
                let soi = registry.soi_radius(id)?;
                let distance = distance_to(registry, id, &absolute)?;
                (distance < soi).then_some((id, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match closest {
            Some((id, _)) => central = id,
            None => break,
        }
    }

    if central == original {
        return None;
    }
    let central_state = registry.state(central)?;
    state.orbital = absolute.relative_to(central_state);
    state.central_body = central;

    log::info!(
        "SOI transition at {}: {} -> {}",
        absolute.epoch,
        registry.name_of(original),
        registry.name_of(central)
    );
    Some(SoiTransition {
        time: absolute.epoch,
        from: original,
        to: central,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::test_support::*;
    use crate::ephemeris::StateVectorCalculator;
    use nalgebra::Vector3;

    fn updated() -> BodyRegistry {
        let mut registry = sun_earth_moon();
        StateVectorCalculator::default().update_all(&mut registry, Epoch::J2000);
        registry
    }

    fn satellite(central: BodyId, offset: Vector3<f64>) -> SpacecraftState {
        SpacecraftState::with_defaults(
            OrbitalState::new(offset, Vector3::new(0.0, 1.0, 0.0), Epoch::J2000),
            central,
        )
    }

    #[test]
    fn test_inside_soi_keeps_central_body() {
        let registry = updated();
        let mut state = satellite(399, Vector3::new(7000.0, 0.0, 0.0));
        let before = state;
        assert!(check_soi(&mut state, &registry).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn test_leaving_earth_soi_switches_to_sun() {
        let registry = updated();
        let earth_soi = registry.soi_radius(399).unwrap();
        let earth = *registry.state(399).unwrap();
        let sun = *registry.state(10).unwrap();

        // Outward along the Sun-Earth line, well past Earth's SOI
        let outward = (earth.position - sun.position).normalize();
        let mut state = satellite(399, outward * earth_soi * 1.5);
        let absolute_before = state.orbital.offset_by(&earth);

        let transition = check_soi(&mut state, &registry).unwrap();
        assert_eq!((transition.from, transition.to), (399, 10));
        assert_eq!(state.central_body, 10);

        // Same physical state, new origin
        let absolute_after = state.orbital.offset_by(&sun);
        assert!((absolute_after.position - absolute_before.position).norm() < 1e-3);
        assert!((absolute_after.velocity - absolute_before.velocity).norm() < 1e-9);
    }

    #[test]
    fn test_entering_moon_soi_from_earth() {
        let registry = updated();
        let earth = *registry.state(399).unwrap();
        let moon = *registry.state(301).unwrap();

        // 1000 km from the Moon, expressed relative to Earth
        let toward_earth = (earth.position - moon.position).normalize();
        let offset = moon.position + toward_earth * 1000.0 - earth.position;
        let mut state = satellite(399, offset);

        let transition = check_soi(&mut state, &registry).unwrap();
        assert_eq!(transition.to, 301);
        assert!((state.orbital.radius() - 1000.0).abs() < 1e-3);
    }

    #[test]
    fn test_heliocentric_satellite_descends_into_moon() {
        let registry = updated();
        let sun = *registry.state(10).unwrap();
        let moon = *registry.state(301).unwrap();

        // Two levels down in one check: Sun -> Earth -> Moon
        let offset = moon.position + Vector3::new(0.0, 0.0, 500.0) - sun.position;
        let mut state = satellite(10, offset);
        let transition = check_soi(&mut state, &registry).unwrap();
        assert_eq!((transition.from, transition.to), (10, 301));
    }

    #[test]
    fn test_no_transition_without_body_states() {
        let registry = sun_earth_moon();
        let mut state = satellite(399, Vector3::new(1.0e7, 0.0, 0.0));
        assert!(check_soi(&mut state, &registry).is_none());
        assert_eq!(state.central_body, 399);
    }
}
