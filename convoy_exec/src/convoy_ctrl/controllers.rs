//! # Convoy controllers
//!
//! The follower's speed comes from a PD law on the path distance to the agent it follows:
//!
//! ```text
//! speed = desired_speed + k_p * (dist_to_target - ideal_follow_range) + k_d * (leader_speed - speed)
//! ```
//!
//! The second term stands in for the derivative of the range error, since the range closes at the
//! difference between the leader's speed and our own. The heading reference is the bearing to the
//! next point in the queue.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::{nav::NavState, params::Gains, point_queue::ConvoyPointQueue, Params};
use util::maths::{rel_ang_deg, wrap_360};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PD controller taking the error rate explicitly.
#[derive(Debug, Serialize, Clone, Copy)]
pub struct PdController {
    /// Proportional gain
    k_p: f64,

    /// Derivative gain
    k_d: f64,
}

/// What the control law knows about the agent being followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetState {
    /// Last known position of the followed agent
    pub position_m: Option<Vector2<f64>>,

    /// Last known speed of the followed agent
    pub speed_ms: Option<f64>,
}

/// References computed for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ControlRefs {
    /// Units: degrees
    pub heading_deg: f64,

    /// Units: meters/second
    pub speed_ms: f64,

    /// Path distance to the target, if there is one
    pub dist_to_target_m: Option<f64>,

    /// Distance error fed to the speed controller
    pub range_error_m: f64,

    /// Speed error fed to the speed controller
    pub speed_error_ms: f64,

    /// True if the speed reference hit one of its bounds
    pub speed_limited: bool,

    /// True if the agent is actively following something
    pub active: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PdController {
    pub fn new(gains: &Gains) -> Self {
        Self {
            k_p: gains.k_p,
            k_d: gains.k_d,
        }
    }

    /// Controller output for the given error and error rate.
    pub fn get(&self, error: f64, error_rate: f64) -> f64 {
        self.k_p * error + self.k_d * error_rate
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Compute the heading and speed references.
///
/// The leader holds the desired speed and its current heading. A follower steers for the head of
/// its queue, or for the followed agent once the queue is empty, and runs the PD law on the path
/// distance through the queue to the target. With no target at all the range term is dropped.
pub fn compute_refs(
    nav: &NavState,
    queue: &ConvoyPointQueue,
    target: &TargetState,
    is_leader: bool,
    params: &Params,
) -> ControlRefs {
    let mut refs = ControlRefs {
        heading_deg: wrap_360(nav.heading_deg),
        speed_ms: params.desired_speed_ms,
        ..Default::default()
    };

    if is_leader {
        return refs;
    }

    refs.active = !queue.is_empty() || target.position_m.is_some();

    // The last queued point stands in for the target until its position is known
    let target_m = target
        .position_m
        .or_else(|| queue.back().map(|p| p.position_m));

    // Steer for the next point, or the target itself
    let steer_m = queue.front().map(|p| p.position_m).or(target_m);
    if let Some(s) = steer_m {
        refs.heading_deg = rel_ang_deg(nav.position_m[0], nav.position_m[1], s[0], s[1]);
    }

    if let Some(t) = target_m {
        let dist_m = queue.dist_to_target(&nav.position_m, &t);
        refs.dist_to_target_m = Some(dist_m);
        refs.range_error_m = dist_m - params.ideal_follow_range_m;
    }

    let leader_speed_ms = queue
        .front()
        .map(|p| p.leader_speed_ms)
        .or(target.speed_ms)
        .unwrap_or(nav.speed_ms);
    refs.speed_error_ms = leader_speed_ms - nav.speed_ms;

    let spd_ctrl = PdController::new(&params.spd_gains);
    let raw_ms = params.desired_speed_ms + spd_ctrl.get(refs.range_error_m, refs.speed_error_ms);

    refs.speed_ms = raw_ms.clamp(params.min_speed_ms, params.max_speed_ms);
    refs.speed_limited = refs.speed_ms != raw_ms;

    refs
}
