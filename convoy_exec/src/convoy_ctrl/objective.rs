//! # Objective functions
//!
//! Convoy control does not command the vehicle directly. It describes what it wants as two scalar
//! objectives, one over course and one over speed, each peaking at a summit value, and couples
//! them into a single weighted objective. Turning that into a decision is the job of an
//! [`ObjectiveBuilder`], which in a full helm is the multi-objective solver.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::params::ObjectiveShape;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Upper end of the course domain, exclusive
pub const COURSE_DOMAIN_MAX_DEG: f64 = 360.0;

/// Largest allowed summit delta
pub const MAX_SUMMIT_DELTA: f64 = 100.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A symmetric objective over one decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScalarObjective {
    pub domain: Domain,

    /// The most preferred value
    pub summit: f64,

    /// Width either side of the summit with full utility
    pub peak_width: f64,

    /// Width beyond the peak over which utility falls away
    pub base_width: f64,

    /// Utility drop between the summit and the edge of the peak
    pub summit_delta: f64,

    /// If true the domain wraps around, as a compass does
    pub value_wrap: bool,
}

/// Two scalar objectives coupled into one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoupledObjective {
    pub course: ScalarObjective,
    pub speed: ScalarObjective,
    pub course_weight: f64,
    pub speed_weight: f64,

    /// Weight of the whole objective against the helm's other behaviours
    pub priority_wt: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The decision variable an objective is defined over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Domain {
    /// Course in degrees, `[0, 360)`
    Course,

    /// Speed in meters/second, `[0, max_ms]`
    Speed { max_ms: f64 },
}

/// Reasons an objective cannot be built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectiveError {
    #[error("The {0:?} summit is not finite")]
    NonFiniteSummit(Domain),

    #[error("The {0:?} summit {1} is outside of the domain")]
    SummitOutOfDomain(Domain, f64),

    #[error("The {0:?} objective has an invalid width (peak {1}, base {2})")]
    InvalidWidth(Domain, f64, f64),

    #[error("The {0:?} summit delta {1} is outside [0, 100]")]
    InvalidSummitDelta(Domain, f64),

    #[error("Invalid coupling weights {0} and {1}")]
    InvalidWeights(f64, f64),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Turns a coupled objective into something the vehicle can act on.
pub trait ObjectiveBuilder {
    type Output;

    fn build(&mut self, objective: &CoupledObjective) -> Result<Self::Output, ObjectiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScalarObjective {
    /// The course objective peaking at `summit_deg`.
    pub fn course(summit_deg: f64, shape: &ObjectiveShape) -> Self {
        Self {
            domain: Domain::Course,
            summit: summit_deg,
            peak_width: shape.peak_width,
            base_width: shape.base_width,
            summit_delta: shape.summit_delta,
            value_wrap: true,
        }
    }

    /// The speed objective peaking at `summit_ms`.
    pub fn speed(summit_ms: f64, max_ms: f64, shape: &ObjectiveShape) -> Self {
        Self {
            domain: Domain::Speed { max_ms },
            summit: summit_ms,
            peak_width: shape.peak_width,
            base_width: shape.base_width,
            summit_delta: shape.summit_delta,
            value_wrap: false,
        }
    }

    /// Check the objective is in a state from which a function can be built.
    pub fn validate(&self) -> Result<(), ObjectiveError> {
        if !self.summit.is_finite() {
            return Err(ObjectiveError::NonFiniteSummit(self.domain));
        }

        let in_domain = match self.domain {
            Domain::Course => (0.0..COURSE_DOMAIN_MAX_DEG).contains(&self.summit),
            Domain::Speed { max_ms } => (0.0..=max_ms).contains(&self.summit),
        };
        if !in_domain {
            return Err(ObjectiveError::SummitOutOfDomain(self.domain, self.summit));
        }

        let width_ok = |w: f64| w.is_finite() && w >= 0.0;
        if !width_ok(self.peak_width) || !width_ok(self.base_width) {
            return Err(ObjectiveError::InvalidWidth(
                self.domain,
                self.peak_width,
                self.base_width,
            ));
        }

        if !(0.0..=MAX_SUMMIT_DELTA).contains(&self.summit_delta) {
            return Err(ObjectiveError::InvalidSummitDelta(
                self.domain,
                self.summit_delta,
            ));
        }

        Ok(())
    }
}

impl CoupledObjective {
    /// Couple two validated objectives.
    pub fn couple(
        course: ScalarObjective,
        speed: ScalarObjective,
        course_weight: f64,
        speed_weight: f64,
        priority_wt: f64,
    ) -> Result<Self, ObjectiveError> {
        course.validate()?;
        speed.validate()?;

        let weight_ok = |w: f64| w.is_finite() && w >= 0.0;
        if !weight_ok(course_weight)
            || !weight_ok(speed_weight)
            || course_weight + speed_weight <= 0.0
        {
            return Err(ObjectiveError::InvalidWeights(course_weight, speed_weight));
        }

        Ok(Self {
            course,
            speed,
            course_weight,
            speed_weight,
            priority_wt,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convoy_ctrl::Params;

    #[test]
    fn test_validation() {
        let p = Params::default();

        assert!(ScalarObjective::course(359.9, &p.course_objective)
            .validate()
            .is_ok());
        assert!(matches!(
            ScalarObjective::course(360.0, &p.course_objective).validate(),
            Err(ObjectiveError::SummitOutOfDomain(..))
        ));
        assert!(matches!(
            ScalarObjective::course(f64::NAN, &p.course_objective).validate(),
            Err(ObjectiveError::NonFiniteSummit(_))
        ));

        assert!(ScalarObjective::speed(2.0, 5.0, &p.speed_objective)
            .validate()
            .is_ok());
        assert!(ScalarObjective::speed(-0.1, 5.0, &p.speed_objective)
            .validate()
            .is_err());

        let mut bad = ScalarObjective::speed(1.0, 5.0, &p.speed_objective);
        bad.base_width = -1.0;
        assert!(matches!(
            bad.validate(),
            Err(ObjectiveError::InvalidWidth(..))
        ));

        bad.base_width = 1.0;
        bad.summit_delta = 101.0;
        assert!(matches!(
            bad.validate(),
            Err(ObjectiveError::InvalidSummitDelta(..))
        ));
    }

    #[test]
    fn test_couple() {
        let p = Params::default();
        let crs = ScalarObjective::course(90.0, &p.course_objective);
        let spd = ScalarObjective::speed(1.2, 5.0, &p.speed_objective);

        let obj = CoupledObjective::couple(crs, spd, 50.0, 50.0, 100.0).unwrap();
        assert_eq!(obj.course.summit, 90.0);
        assert!(obj.course.value_wrap);
        assert!(!obj.speed.value_wrap);

        assert!(matches!(
            CoupledObjective::couple(crs, spd, 0.0, 0.0, 100.0),
            Err(ObjectiveError::InvalidWeights(..))
        ));
        assert!(CoupledObjective::couple(crs, ScalarObjective::speed(9.0, 5.0, &p.speed_objective), 50.0, 50.0, 100.0).is_err());
    }
}
