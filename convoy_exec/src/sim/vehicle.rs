//! # Simulated vehicles
//!
//! Each vehicle is a point mass with a turn rate and acceleration limit, driven by a heading and
//! speed command.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::convoy_ctrl::{CoupledObjective, NavState, ObjectiveBuilder, ObjectiveError};
use util::maths::{ang_diff_180, rel_ang_deg, wrap_360};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Motion limits shared by every vehicle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleLimits {
    /// Units: degrees/second
    pub max_turn_rate_degs: f64,

    /// Units: meters/second^2
    pub max_accel_mss: f64,

    /// Units: meters/second
    pub max_speed_ms: f64,
}

/// A heading and speed demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HelmCmd {
    pub heading_deg: f64,
    pub speed_ms: f64,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    nav: NavState,
    cmd: HelmCmd,
    limits: VehicleLimits,
}

/// Takes the summit of each objective as the decision.
///
/// Objectives with no priority produce no decision, leaving the vehicle on its last command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummitBuilder;

/// Steers the leader around a fixed list of waypoints.
#[derive(Debug, Clone)]
pub struct LeaderRoute {
    waypoints: Vec<Vector2<f64>>,
    next: usize,
    accept_radius_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for VehicleLimits {
    fn default() -> Self {
        Self {
            max_turn_rate_degs: 30.0,
            max_accel_mss: 0.5,
            max_speed_ms: 2.5,
        }
    }
}

impl Vehicle {
    /// A stationary vehicle at the given pose.
    pub fn new(x_m: f64, y_m: f64, heading_deg: f64, limits: VehicleLimits) -> Self {
        let heading_deg = wrap_360(heading_deg);

        Self {
            nav: NavState {
                position_m: Vector2::new(x_m, y_m),
                heading_deg,
                speed_ms: 0.0,
            },
            cmd: HelmCmd {
                heading_deg,
                speed_ms: 0.0,
            },
            limits,
        }
    }

    pub fn nav(&self) -> NavState {
        self.nav
    }

    pub fn cmd(&self) -> HelmCmd {
        self.cmd
    }

    pub fn set_cmd(&mut self, cmd: HelmCmd) {
        self.cmd = cmd;
    }

    /// Move the vehicle on by `dt_s` towards its command.
    pub fn step(&mut self, dt_s: f64) {
        let max_turn_deg = self.limits.max_turn_rate_degs * dt_s;
        let turn_deg = ang_diff_180(self.cmd.heading_deg, self.nav.heading_deg)
            .clamp(-max_turn_deg, max_turn_deg);
        self.nav.heading_deg = wrap_360(self.nav.heading_deg + turn_deg);

        let max_dv = self.limits.max_accel_mss * dt_s;
        let target_ms = self.cmd.speed_ms.clamp(0.0, self.limits.max_speed_ms);
        self.nav.speed_ms += (target_ms - self.nav.speed_ms).clamp(-max_dv, max_dv);

        let heading_rad = self.nav.heading_deg.to_radians();
        self.nav.position_m += Vector2::new(heading_rad.sin(), heading_rad.cos())
            * self.nav.speed_ms
            * dt_s;
    }
}

impl ObjectiveBuilder for SummitBuilder {
    type Output = Option<HelmCmd>;

    fn build(&mut self, objective: &CoupledObjective) -> Result<Self::Output, ObjectiveError> {
        if objective.priority_wt <= 0.0 {
            return Ok(None);
        }

        Ok(Some(HelmCmd {
            heading_deg: objective.course.summit,
            speed_ms: objective.speed.summit,
        }))
    }
}

impl LeaderRoute {
    pub fn new(waypoints: &[[f64; 2]], accept_radius_m: f64) -> Self {
        Self {
            waypoints: waypoints.iter().map(|w| Vector2::new(w[0], w[1])).collect(),
            next: 0,
            accept_radius_m,
        }
    }

    /// Heading for the leader to steer, or `None` once the route is complete.
    pub fn heading_deg(&mut self, position_m: &Vector2<f64>) -> Option<f64> {
        while let Some(w) = self.waypoints.get(self.next) {
            if (w - position_m).norm() >= self.accept_radius_m {
                return Some(rel_ang_deg(position_m[0], position_m[1], w[0], w[1]));
            }
            self.next += 1;
        }

        None
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.waypoints.len()
    }
}
