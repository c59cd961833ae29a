//! # Agent info
//!
//! Every agent broadcasts its own kinematic state each cycle. Followers use the state of the agent
//! they follow when they have no convoy points left to chase.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::text::strip_braces;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Kinematic state broadcast by an agent.
///
/// The rate fields for x, y and z are carried for completeness and are not used by the convoy
/// controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub x: f64,
    pub x_dot: f64,
    pub y: f64,
    pub y_dot: f64,
    pub z: f64,
    pub z_dot: f64,
    /// Heading, degrees
    pub h: f64,
    /// Heading rate, degrees/second
    pub h_dot: f64,
    /// Speed, meters/second
    pub u: f64,
    pub v: f64,
    /// Time of the report, seconds
    pub utc: f64,
    pub color: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            x: 0.0,
            x_dot: 0.0,
            y: 0.0,
            y_dot: 0.0,
            z: 0.0,
            z_dot: 0.0,
            h: 0.0,
            h_dot: 0.0,
            u: 0.0,
            v: 0.0,
            utc: 0.0,
            color: String::from("yellow"),
        }
    }
}

impl AgentInfo {
    /// The agent's position in the XY plane.
    pub fn position_m(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Encode as `{name=..,x=..,x_dot=..,y=..,...,utc=..,color=..}`.
    pub fn encode(&self) -> String {
        format!(
            "{{name={},x={},x_dot={},y={},y_dot={},z={},z_dot={},h={},h_dot={},u={},v={},utc={},color={}}}",
            self.name,
            self.x,
            self.x_dot,
            self.y,
            self.y_dot,
            self.z,
            self.z_dot,
            self.h,
            self.h_dot,
            self.u,
            self.v,
            self.utc,
            self.color
        )
    }

    /// Decode from `key=value` pairs in any order.
    ///
    /// Missing, unknown or malformed fields are skipped, leaving the default value in place.
    pub fn decode(s: &str) -> Self {
        let mut info = Self::default();

        for chunk in strip_braces(s).split(',') {
            let (key, val) = match chunk.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => continue,
            };

            let target = match key {
                "name" => {
                    info.name = val.to_string();
                    continue;
                }
                "color" => {
                    info.color = val.to_string();
                    continue;
                }
                "x" => &mut info.x,
                "x_dot" => &mut info.x_dot,
                "y" => &mut info.y,
                "y_dot" => &mut info.y_dot,
                "z" => &mut info.z,
                "z_dot" => &mut info.z_dot,
                "h" => &mut info.h,
                "h_dot" => &mut info.h_dot,
                "u" => &mut info.u,
                "v" => &mut info.v,
                "utc" => &mut info.utc,
                _ => continue,
            };

            match val.parse::<f64>() {
                Ok(v) => *target = v,
                Err(_) => debug!("Skipping malformed agent info field {}={:?}", key, val),
            }
        }

        info
    }
}

impl fmt::Display for AgentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
