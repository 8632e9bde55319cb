//! Impulsive maneuvers and Hohmann transfer planning
//!
//! A maneuver is an instantaneous velocity change applied exactly once, at
//! the integration step boundary nearest its scheduled time.

use std::f64::consts::PI;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, ManeuverError};
use crate::frames::local_orbital_frame;
use crate::propagation::OrbitalState;
use crate::time::Epoch;

pub type ManeuverId = u32;

/// Axes a delta-V is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaVFrame {
    /// Same axes as the satellite state
    Inertial,
    /// (prograde, orbit normal, radial out) at the moment of the burn
    Prograde,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManeuverNode {
    pub id: ManeuverId,
    pub time: Epoch,
    /// km/s
    pub delta_v: Vector3<f64>,
    pub frame: DeltaVFrame,
    pub executed: bool,
}

impl ManeuverNode {
    pub fn new(
        id: ManeuverId,
        time: Epoch,
        delta_v: Vector3<f64>,
        frame: DeltaVFrame,
    ) -> Result<Self, ManeuverError> {
        if !delta_v.iter().all(|c| c.is_finite()) {
            return Err(ManeuverError::NonFiniteDeltaV);
        }
        Ok(Self {
            id,
            time,
            delta_v,
            frame,
            executed: false,
        })
    }

    /// Whether the step starting at `boundary` with length `step` is the
    /// nearest boundary to this node (or the node is already overdue)
    pub fn is_due(&self, boundary: Epoch, step: f64) -> bool {
        !self.executed && self.time < boundary + step / 2.0
    }

    /// The velocity change in the state's own axes
    pub fn inertial_delta_v(&self, state: &OrbitalState) -> Result<Vector3<f64>, ManeuverError> {
        match self.frame {
            DeltaVFrame::Inertial => Ok(self.delta_v),
            DeltaVFrame::Prograde => local_orbital_frame(&state.position, &state.velocity)
                .map(|frame| frame * self.delta_v)
                .ok_or(ManeuverError::UndefinedFrame(self.id)),
        }
    }

    /// Add the burn to `state`; leaves it untouched on error
    pub fn apply(&self, state: &mut OrbitalState) -> Result<(), ManeuverError> {
        state.velocity += self.inertial_delta_v(state)?;
        Ok(())
    }
}

/// Time-ordered maneuver nodes for one satellite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManeuverPlan {
    nodes: Vec<ManeuverNode>,
    next_id: ManeuverId,
}

impl ManeuverPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; rejects non-finite delta-V and times before `now`
    pub fn schedule(
        &mut self,
        time: Epoch,
        delta_v: Vector3<f64>,
        frame: DeltaVFrame,
        now: Epoch,
    ) -> Result<ManeuverId, ManeuverError> {
        if time < now {
            return Err(ManeuverError::InPast { time, now });
        }
        let node = ManeuverNode::new(self.next_id, time, delta_v, frame)?;
        self.next_id += 1;

        let index = self.nodes.partition_point(|n| n.time <= time);
        self.nodes.insert(index, node);
        log::debug!("Scheduled maneuver {} at {}", node.id, time);
        Ok(node.id)
    }

    pub fn remove(&mut self, id: ManeuverId) -> Option<ManeuverNode> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(index))
    }

    pub fn nodes(&self) -> &[ManeuverNode] {
        &self.nodes
    }

    pub fn pending(&self) -> impl Iterator<Item = &ManeuverNode> + '_ {
        self.nodes.iter().filter(|n| !n.executed)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Apply every node due at this boundary, in time order, and mark them
    /// executed. Returns the ids that fired.
    ///
    /// A due node that cannot be resolved against `state` is removed from
    /// the plan and reported as [`Diagnostic::ManeuverRejected`].
    pub fn fire_due(
        &mut self,
        state: &mut OrbitalState,
        boundary: Epoch,
        step: f64,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<ManeuverId> {
        let mut fired = Vec::new();
        let mut rejected = Vec::new();
        for node in self.nodes.iter_mut().filter(|n| n.is_due(boundary, step)) {
            match node.apply(state) {
                Ok(()) => {
                    node.executed = true;
                    fired.push(node.id);
                    log::info!(
                        "Executed maneuver {} at {} (|dv| = {:.4} km/s)",
                        node.id,
                        boundary,
                        node.delta_v.norm()
                    );
                }
                Err(e) => {
                    log::warn!("{}; dropping it", e);
                    rejected.push(node.id);
                    diagnostics.push(Diagnostic::ManeuverRejected {
                        maneuver: node.id,
                        time: boundary,
                    });
                }
            }
        }
        self.nodes.retain(|n| !rejected.contains(&n.id));
        fired
    }
}

/// Two-impulse transfer between circular coplanar orbits
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HohmannTransfer {
    /// Departure burn magnitude (km/s)
    pub dv1: f64,
    /// Arrival burn magnitude (km/s)
    pub dv2: f64,
    pub total: f64,
    /// Half the transfer-orbit period (s)
    pub transfer_time: f64,
    pub transfer_semi_major_axis: f64,
}

pub fn hohmann(mu: f64, r1: f64, r2: f64) -> Result<HohmannTransfer, ManeuverError> {
    if !(mu.is_finite() && mu > 0.0) {
        return Err(ManeuverError::InvalidMu(mu));
    }
    if !(r1.is_finite() && r2.is_finite() && r1 > 0.0 && r2 > 0.0) {
        return Err(ManeuverError::InvalidRadius { r1, r2 });
    }

    let a = (r1 + r2) / 2.0;
    let v1 = (mu / r1).sqrt();
    let v2 = (mu / r2).sqrt();
    let v_depart = (mu * (2.0 / r1 - 1.0 / a)).sqrt();
    let v_arrive = (mu * (2.0 / r2 - 1.0 / a)).sqrt();

    let dv1 = (v_depart - v1).abs();
    let dv2 = (v2 - v_arrive).abs();
    Ok(HohmannTransfer {
        dv1,
        dv2,
        total: dv1 + dv2,
        transfer_time: PI * (a * a * a / mu).sqrt(),
        transfer_semi_major_axis: a,
    })
}

/// Schedule both burns of a transfer from the current (circular) radius
///
/// Burns are prograde when raising the orbit and retrograde when lowering.
pub fn plan_hohmann(
    plan: &mut ManeuverPlan,
    state: &OrbitalState,
    mu: f64,
    target_radius: f64,
    start: Epoch,
) -> Result<(HohmannTransfer, [ManeuverId; 2]), ManeuverError> {
    let r1 = state.radius();
    let transfer = hohmann(mu, r1, target_radius)?;
    let sign = if target_radius >= r1 { 1.0 } else { -1.0 };

    let first = plan.schedule(
        start,
        Vector3::new(sign * transfer.dv1, 0.0, 0.0),
        DeltaVFrame::Prograde,
        state.epoch,
    )?;
    let second = plan.schedule(
        start + transfer.transfer_time,
        Vector3::new(sign * transfer.dv2, 0.0, 0.0),
        DeltaVFrame::Prograde,
        state.epoch,
    )?;
    Ok((transfer, [first, second]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MU_EARTH: f64 = 398_600.4418;

    #[test]
    fn test_hohmann_7000_to_9000() {
        let transfer = hohmann(MU_EARTH, 7000.0, 9000.0).unwrap();
        assert!(transfer.dv1 > 0.0 && transfer.dv2 > 0.0);
        assert!((transfer.total - (transfer.dv1 + transfer.dv2)).abs() < 1e-15);
        assert!((transfer.dv1 - 0.457_745).abs() < 1e-5);
        assert!((transfer.dv2 - 0.429_817).abs() < 1e-5);
        assert!((transfer.transfer_time - 3560.54).abs() < 0.01);
        assert_eq!(transfer.transfer_semi_major_axis, 8000.0);
    }

    #[test]
    fn test_hohmann_is_symmetric() {
        let up = hohmann(MU_EARTH, 7000.0, 9000.0).unwrap();
        let down = hohmann(MU_EARTH, 9000.0, 7000.0).unwrap();
        assert!((up.total - down.total).abs() < 1e-12);
        assert!((up.dv1 - down.dv2).abs() < 1e-12);
    }

    #[test]
    fn test_hohmann_rejects_bad_input() {
        assert!(matches!(hohmann(0.0, 7000.0, 9000.0), Err(ManeuverError::InvalidMu(_))));
        assert!(matches!(
            hohmann(MU_EARTH, -1.0, 9000.0),
            Err(ManeuverError::InvalidRadius { .. })
        ));
    }

    #[test]
    fn test_schedule_keeps_time_order() {
        let mut plan = ManeuverPlan::new();
        let now = Epoch::J2000;
        let late = plan.schedule(now + 100.0, Vector3::x(), DeltaVFrame::Inertial, now).unwrap();
        let early = plan.schedule(now + 10.0, Vector3::y(), DeltaVFrame::Inertial, now).unwrap();
        let ids: Vec<_> = plan.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![early, late]);

        assert!(matches!(
            plan.schedule(now - 1.0, Vector3::x(), DeltaVFrame::Inertial, now),
            Err(ManeuverError::InPast { .. })
        ));
        assert!(matches!(
            plan.schedule(now, Vector3::new(f64::NAN, 0.0, 0.0), DeltaVFrame::Inertial, now),
            Err(ManeuverError::NonFiniteDeltaV)
        ));
    }

    #[test]
    fn test_fires_once_at_nearest_boundary() {
        let mut plan = ManeuverPlan::new();
        let t0 = Epoch::J2000;
        plan.schedule(t0 + 26.0, Vector3::new(0.1, 0.0, 0.0), DeltaVFrame::Inertial, t0)
            .unwrap();
        let mut state = OrbitalState::new(Vector3::new(7000.0, 0.0, 0.0), Vector3::zeros(), t0);

        // Boundaries every 10 s: 26 s is nearest to the 30 s boundary
        let mut diagnostics = Vec::new();
        assert!(plan.fire_due(&mut state, t0 + 10.0, 10.0, &mut diagnostics).is_empty());
        assert!(plan.fire_due(&mut state, t0 + 20.0, 10.0, &mut diagnostics).is_empty());
        assert_eq!(plan.fire_due(&mut state, t0 + 30.0, 10.0, &mut diagnostics).len(), 1);
        assert!(plan.fire_due(&mut state, t0 + 40.0, 10.0, &mut diagnostics).is_empty());
        assert_eq!(state.velocity, Vector3::new(0.1, 0.0, 0.0));
        assert_eq!(plan.pending().count(), 0);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_prograde_burn_without_orbit_plane_is_rejected() {
        let t0 = Epoch::J2000;
        let node = ManeuverNode::new(4, t0, Vector3::new(0.5, 0.0, 0.0), DeltaVFrame::Prograde).unwrap();
        let mut falling = OrbitalState::new(Vector3::new(7000.0, 0.0, 0.0), Vector3::new(-2.0, 0.0, 0.0), t0);
        assert_eq!(node.apply(&mut falling), Err(ManeuverError::UndefinedFrame(4)));
        assert_eq!(falling.velocity, Vector3::new(-2.0, 0.0, 0.0));

        let mut plan = ManeuverPlan::new();
        let bad = plan.schedule(t0, Vector3::new(0.5, 0.0, 0.0), DeltaVFrame::Prograde, t0).unwrap();
        plan.schedule(t0, Vector3::new(0.0, 0.1, 0.0), DeltaVFrame::Inertial, t0).unwrap();
        let mut at_rest = OrbitalState::new(Vector3::new(7000.0, 0.0, 0.0), Vector3::zeros(), t0);
        let mut diagnostics = Vec::new();

        let fired = plan.fire_due(&mut at_rest, t0, 10.0, &mut diagnostics);
        assert_eq!(fired.len(), 1);
        assert!(at_rest.is_finite());
        assert_eq!(at_rest.velocity, Vector3::new(0.0, 0.1, 0.0));
        assert_eq!(
            diagnostics,
            vec![Diagnostic::ManeuverRejected { maneuver: bad, time: t0 }]
        );
        assert_eq!(plan.nodes().len(), 1);
        assert!(plan.nodes().iter().all(|n| n.id != bad));
    }

    #[test]
    fn test_prograde_burn_follows_velocity() {
        let node = ManeuverNode::new(0, Epoch::J2000, Vector3::new(0.5, 0.0, 0.0), DeltaVFrame::Prograde)
            .unwrap();
        let mut state = OrbitalState::new(
            Vector3::new(7000.0, 0.0, 0.0),
            Vector3::new(0.0, 7.5, 0.0),
            Epoch::J2000,
        );
        node.apply(&mut state).unwrap();
        assert!((state.velocity - Vector3::new(0.0, 8.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_plan_hohmann_schedules_two_burns() {
        let mut plan = ManeuverPlan::new();
        let state = OrbitalState::new(
            Vector3::new(9000.0, 0.0, 0.0),
            Vector3::new(0.0, (MU_EARTH / 9000.0).sqrt(), 0.0),
            Epoch::J2000,
        );
        let (transfer, [a, b]) = plan_hohmann(&mut plan, &state, MU_EARTH, 7000.0, Epoch::J2000 + 60.0).unwrap();
        let nodes = plan.nodes();
        assert_eq!((nodes[0].id, nodes[1].id), (a, b));
        // Lowering: both burns retrograde
        assert!(nodes[0].delta_v.x < 0.0 && nodes[1].delta_v.x < 0.0);
        assert!((nodes[1].time - nodes[0].time - transfer.transfer_time).abs() < 1e-6);
    }
}
