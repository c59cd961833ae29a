//! Convoy control parameters
//!
//! Parameters are loaded from `convoy_ctrl.toml` at initialisation, and a subset of them can be
//! changed at runtime through `CONVOY_UPDATES` messages. Each runtime assignment is parsed into a
//! [`ConfigOption`] and validated before it is applied, so a bad value never reaches the control
//! law.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use comms_if::text::{split_quoted, unquote};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for convoy control
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    /// If true the agent starts as the convoy leader, without waiting for a `LEADER` message.
    pub is_leader: bool,

    /// Nominal cruise speed, also the leader's speed reference
    ///
    /// Units: meters/second
    pub desired_speed_ms: f64,

    /// Path distance a follower tries to keep to the agent it follows
    ///
    /// Units: meters
    pub ideal_follow_range_m: f64,

    /// Distance the leader travels between seeding two convoy points
    ///
    /// Units: meters
    pub point_update_distance_m: f64,

    /// A queued point is captured when the agent gets closer to it than this
    ///
    /// Units: meters
    pub capture_radius_m: f64,

    /// Movements smaller than this are not counted by the leader's odometer
    ///
    /// Units: meters
    pub odometry_eps_m: f64,

    /// Decay constant of the heading rate moving average
    ///
    /// Units: 1/seconds
    pub heading_rate_alpha: f64,

    /// Minimum time between two broadcasts of the same convoy fact
    ///
    /// Units: seconds
    pub repost_interval_s: f64,

    /// Speed controller gains
    pub spd_gains: Gains,

    /// Heading controller gains
    ///
    /// Carried in the configuration and reported, the course objective is shaped only by the
    /// bearing to the next point.
    pub hdg_gains: Gains,

    /// Lower bound on a follower's speed reference
    ///
    /// Units: meters/second
    pub min_speed_ms: f64,

    /// Upper bound on a follower's speed reference
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Upper end of the speed decision domain
    ///
    /// Units: meters/second
    pub speed_domain_max_ms: f64,

    /// Shape of the speed objective
    pub speed_objective: ObjectiveShape,

    /// Shape of the course objective
    pub course_objective: ObjectiveShape,

    /// Weight of the course objective when coupled with the speed objective
    pub course_weight: f64,

    /// Weight of the speed objective when coupled with the course objective
    pub speed_weight: f64,

    /// Priority weight of the coupled objective while the agent is actively following
    pub priority_wt: f64,
}

/// Gains of a PID style controller.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    /// Proportional gain
    pub k_p: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Integral gain, unused
    pub k_i: f64,
}

/// Shape of a scalar objective around its summit.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveShape {
    pub peak_width: f64,
    pub base_width: f64,
    pub summit_delta: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A single runtime configuration change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigOption {
    IsLeader(bool),
    DesiredSpeed(f64),
    IdealFollowRange(f64),
    PointUpdateDistance(f64),
    CaptureRadius(f64),
    SpeedGain(GainTerm, f64),
    HeadingGain(GainTerm, f64),
    SpeedGains(Gains),
    HeadingGains(Gains),
    HeadingRateAlpha(f64),
    RepostInterval(f64),
}

/// One term of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainTerm {
    P,
    D,
    I,
}

/// Errors raised while validating parameters or parsing configuration updates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("Unknown configuration key \"{0}\"")]
    UnknownKey(String),

    #[error("Configuration assignment \"{0}\" has no value")]
    MissingValue(String),

    #[error("Value \"{1}\" of {0} is not a number")]
    NotANumber(String, String),

    #[error("Value \"{1}\" of {0} is not a boolean")]
    NotABool(String, String),

    #[error("Value {1} of {0} is out of range")]
    OutOfRange(String, f64),

    #[error("Value \"{1}\" of {0} is not a 'kp,kd,ki' tuple")]
    MalformedTuple(String, String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            is_leader: false,
            desired_speed_ms: 1.2,
            ideal_follow_range_m: 5.0,
            point_update_distance_m: 1.0,
            capture_radius_m: 3.0,
            odometry_eps_m: 0.01,
            heading_rate_alpha: 0.1,
            repost_interval_s: 5.0,
            spd_gains: Gains {
                k_p: 0.5,
                k_d: 0.2,
                k_i: 0.0,
            },
            hdg_gains: Gains {
                k_p: 1.0,
                k_d: 0.0,
                k_i: 0.0,
            },
            min_speed_ms: 0.0,
            max_speed_ms: 2.0,
            speed_domain_max_ms: 5.0,
            speed_objective: ObjectiveShape {
                peak_width: 0.5,
                base_width: 1.0,
                summit_delta: 0.8,
            },
            course_objective: ObjectiveShape {
                peak_width: 0.0,
                base_width: 180.0,
                summit_delta: 0.0,
            },
            course_weight: 50.0,
            speed_weight: 50.0,
            priority_wt: 100.0,
        }
    }
}

impl Params {
    /// Check that the parameters describe a usable controller.
    pub fn validate(&self) -> Result<(), ParamError> {
        non_negative("desired_speed", self.desired_speed_ms)?;
        non_negative("ideal_follow_range", self.ideal_follow_range_m)?;
        positive("point_update_distance", self.point_update_distance_m)?;
        positive("capture_radius", self.capture_radius_m)?;
        non_negative("odometry_eps", self.odometry_eps_m)?;
        non_negative("heading_rate_alpha", self.heading_rate_alpha)?;
        non_negative("repost_interval", self.repost_interval_s)?;
        self.spd_gains.validate("spd_gains")?;
        self.hdg_gains.validate("hdg_gains")?;
        non_negative("min_speed", self.min_speed_ms)?;
        positive("speed_domain_max", self.speed_domain_max_ms)?;
        non_negative("course_weight", self.course_weight)?;
        non_negative("speed_weight", self.speed_weight)?;
        non_negative("priority_wt", self.priority_wt)?;

        if self.max_speed_ms < self.min_speed_ms || self.max_speed_ms > self.speed_domain_max_ms {
            return Err(ParamError::OutOfRange(
                "max_speed".into(),
                self.max_speed_ms,
            ));
        }

        Ok(())
    }

    /// Apply a validated configuration option.
    pub fn apply(&mut self, option: ConfigOption) {
        match option {
            ConfigOption::IsLeader(b) => self.is_leader = b,
            ConfigOption::DesiredSpeed(v) => self.desired_speed_ms = v,
            ConfigOption::IdealFollowRange(v) => self.ideal_follow_range_m = v,
            ConfigOption::PointUpdateDistance(v) => self.point_update_distance_m = v,
            ConfigOption::CaptureRadius(v) => self.capture_radius_m = v,
            ConfigOption::SpeedGain(t, v) => self.spd_gains.set(t, v),
            ConfigOption::HeadingGain(t, v) => self.hdg_gains.set(t, v),
            ConfigOption::SpeedGains(g) => self.spd_gains = g,
            ConfigOption::HeadingGains(g) => self.hdg_gains = g,
            ConfigOption::HeadingRateAlpha(v) => self.heading_rate_alpha = v,
            ConfigOption::RepostInterval(v) => self.repost_interval_s = v,
        }
    }
}

impl Gains {
    fn set(&mut self, term: GainTerm, value: f64) {
        match term {
            GainTerm::P => self.k_p = value,
            GainTerm::D => self.k_d = value,
            GainTerm::I => self.k_i = value,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ParamError> {
        finite(name, self.k_p)?;
        finite(name, self.k_d)?;
        finite(name, self.k_i)?;
        Ok(())
    }
}

impl ConfigOption {
    /// Parse a single `key=value` assignment.
    ///
    /// Keys are case insensitive and values may be quoted.
    pub fn parse(assignment: &str) -> Result<Self, ParamError> {
        let (key, value) = match assignment.split_once('=') {
            Some((k, v)) => (k.trim().to_lowercase(), unquote(v)),
            None => return Err(ParamError::MissingValue(assignment.trim().to_string())),
        };

        if value.is_empty() {
            return Err(ParamError::MissingValue(key));
        }

        let option = match key.as_str() {
            "is_leader" => ConfigOption::IsLeader(parse_bool(&key, value)?),
            "desired_speed" => ConfigOption::DesiredSpeed(non_negative(&key, num(&key, value)?)?),
            "ideal_follow_range" => {
                ConfigOption::IdealFollowRange(non_negative(&key, num(&key, value)?)?)
            }
            "point_update_distance" => {
                ConfigOption::PointUpdateDistance(positive(&key, num(&key, value)?)?)
            }
            "capture_radius" => ConfigOption::CaptureRadius(positive(&key, num(&key, value)?)?),
            "kp_spd" => ConfigOption::SpeedGain(GainTerm::P, num(&key, value)?),
            "kd_spd" => ConfigOption::SpeedGain(GainTerm::D, num(&key, value)?),
            "ki_spd" => ConfigOption::SpeedGain(GainTerm::I, num(&key, value)?),
            "kp_hdg" => ConfigOption::HeadingGain(GainTerm::P, num(&key, value)?),
            "kd_hdg" => ConfigOption::HeadingGain(GainTerm::D, num(&key, value)?),
            "ki_hdg" => ConfigOption::HeadingGain(GainTerm::I, num(&key, value)?),
            "spd_gains" => ConfigOption::SpeedGains(parse_gains(&key, value)?),
            "hdg_gains" => ConfigOption::HeadingGains(parse_gains(&key, value)?),
            "heading_rate_alpha" => {
                ConfigOption::HeadingRateAlpha(non_negative(&key, num(&key, value)?)?)
            }
            "repost_interval" => ConfigOption::RepostInterval(non_negative(&key, num(&key, value)?)?),
            _ => return Err(ParamError::UnknownKey(key)),
        };

        Ok(option)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse a `CONVOY_UPDATES` message.
///
/// The message is a comma separated list of assignments, where values containing commas must be
/// quoted, for example `kp_spd=0.4,hdg_gains='1,0.1,0'`. Every assignment is parsed on its own so
/// a bad one does not stop the others from applying.
pub fn parse_updates(msg: &str) -> (Vec<ConfigOption>, Vec<ParamError>) {
    let mut options = Vec::new();
    let mut errors = Vec::new();

    for assignment in split_quoted(msg, ',') {
        match ConfigOption::parse(&assignment) {
            Ok(o) => options.push(o),
            Err(e) => errors.push(e),
        }
    }

    (options, errors)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn num(key: &str, value: &str) -> Result<f64, ParamError> {
    let v = value
        .trim()
        .parse::<f64>()
        .map_err(|_| ParamError::NotANumber(key.to_string(), value.to_string()))?;
    finite(key, v)
}

fn finite(key: &str, value: f64) -> Result<f64, ParamError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParamError::OutOfRange(key.to_string(), value))
    }
}

fn non_negative(key: &str, value: f64) -> Result<f64, ParamError> {
    if finite(key, value)? >= 0.0 {
        Ok(value)
    } else {
        Err(ParamError::OutOfRange(key.to_string(), value))
    }
}

fn positive(key: &str, value: f64) -> Result<f64, ParamError> {
    if finite(key, value)? > 0.0 {
        Ok(value)
    } else {
        Err(ParamError::OutOfRange(key.to_string(), value))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ParamError> {
    match value.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParamError::NotABool(key.to_string(), value.to_string())),
    }
}

fn parse_gains(key: &str, value: &str) -> Result<Gains, ParamError> {
    let terms = value
        .split(',')
        .map(|t| num(key, t))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ParamError::MalformedTuple(key.to_string(), value.to_string()))?;

    match terms.as_slice() {
        [k_p, k_d, k_i] => Ok(Gains {
            k_p: *k_p,
            k_d: *k_d,
            k_i: *k_i,
        }),
        _ => Err(ParamError::MalformedTuple(key.to_string(), value.to_string())),
    }
}
