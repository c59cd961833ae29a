//! Ownship navigation state
//!
//! The control cycle receives the agent's position, heading and speed each tick. From these it
//! derives a smoothed heading rate, stamped on seeded points, and the leader's odometer which
//! decides when to seed the next point.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use util::maths::ang_diff_180;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Navigation solution of the agent for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NavState {
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Compass heading
    ///
    /// Units: degrees
    pub heading_deg: f64,

    /// Units: meters/second
    pub speed_ms: f64,
}

/// Exponential moving average of the heading rate.
///
/// The decay applied to the previous estimate is `exp(-alpha * dt)`, so the filter behaves the
/// same whatever the cycle period.
#[derive(Debug, Clone, Default)]
pub struct HeadingRateFilter {
    alpha: f64,
    prev: Option<(f64, f64)>,
    rate_degs: f64,
}

/// Distance travelled since the last reset.
#[derive(Debug, Clone, Default)]
pub struct Odometer {
    eps_m: f64,
    last_m: Option<Vector2<f64>>,
    accum_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingRateFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            ..Default::default()
        }
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    /// Update the filter with the heading at `time_s` and return the new rate estimate.
    ///
    /// The heading change is wrapped into (-180, 180] degrees. Samples which do not move time
    /// forward are ignored.
    pub fn update(&mut self, time_s: f64, heading_deg: f64) -> f64 {
        let (prev_t, prev_h) = match self.prev {
            Some(p) => p,
            None => {
                self.prev = Some((time_s, heading_deg));
                return self.rate_degs;
            }
        };

        let dt = time_s - prev_t;
        if dt <= 0.0 {
            return self.rate_degs;
        }

        let mut dh = ang_diff_180(heading_deg, prev_h);
        if dh <= -180.0 {
            dh = 180.0;
        }

        let instant_degs = dh / dt;
        let ff = (-self.alpha * dt).exp();
        self.rate_degs = self.rate_degs * ff + instant_degs * (1.0 - ff);
        self.prev = Some((time_s, heading_deg));

        self.rate_degs
    }

    pub fn rate_degs(&self) -> f64 {
        self.rate_degs
    }
}

impl Odometer {
    pub fn new(eps_m: f64) -> Self {
        Self {
            eps_m,
            ..Default::default()
        }
    }

    /// Add the distance from the last counted position to `position_m`, if it is more than the
    /// odometry epsilon, and return the accumulated distance.
    pub fn update(&mut self, position_m: &Vector2<f64>) -> f64 {
        match self.last_m {
            Some(last) => {
                let step_m = (position_m - last).norm();
                if step_m > self.eps_m {
                    self.accum_m += step_m;
                    self.last_m = Some(*position_m);
                }
            }
            None => self.last_m = Some(*position_m),
        }

        self.accum_m
    }

    /// Zero the accumulated distance, keeping the last counted position.
    pub fn reset(&mut self) {
        self.accum_m = 0.0;
    }

    /// Zero the accumulated distance and forget the last counted position, so the next update
    /// starts counting from wherever the agent is then.
    pub fn restart(&mut self) {
        self.accum_m = 0.0;
        self.last_m = None;
    }

    pub fn accum_m(&self) -> f64 {
        self.accum_m
    }
}
