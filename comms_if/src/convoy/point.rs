//! # Convoy points
//!
//! A convoy point is a position dropped by the leader, tagged with the leader's state at the
//! moment it was dropped. Points travel down the convoy unchanged, each follower steering for the
//! head of its queue and passing the point back once it has been captured.
//!
//! The canonical encoding is
//!
//! ```text
//! {x=<x>,y=<y>}|{leader_heading:<h>,leader_heading_rate:<hr>,leader_speed:<u>,seed_time:<t>,<k>:<v>}
//! ```
//!
//! Floats are written with the shortest representation that parses back to the same value.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::text::strip_braces;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const SEED_TIME_KEY: &str = "seed_time";
const LEADER_HEADING_KEY: &str = "leader_heading";
const LEADER_HEADING_RATE_KEY: &str = "leader_heading_rate";
const LEADER_SPEED_KEY: &str = "leader_speed";

/// Metadata keys which are always written from, and decoded into, the typed fields.
pub const RESERVED_META_KEYS: [&str; 4] = [
    LEADER_HEADING_KEY,
    LEADER_HEADING_RATE_KEY,
    LEADER_SPEED_KEY,
    SEED_TIME_KEY,
];

/// Characters which may not appear in free-form metadata.
const FORBIDDEN_META_CHARS: &[char] = &[',', ':', '|', '{', '}'];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A position dropped by the convoy leader together with the leader's state at that time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConvoyPoint {
    /// Position of the point in the local frame
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Time at which the leader dropped the point
    ///
    /// Units: seconds
    pub seed_time_s: f64,

    /// Leader's heading when the point was dropped
    ///
    /// Units: degrees (compass)
    pub leader_heading_deg: f64,

    /// Leader's smoothed heading rate when the point was dropped
    ///
    /// Units: degrees/second
    pub leader_heading_rate_degs: f64,

    /// Leader's speed when the point was dropped
    ///
    /// Units: meters/second
    pub leader_speed_ms: f64,

    /// Free-form metadata, never containing a reserved key
    meta: BTreeMap<String, String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvoyPointError {
    #[error("Metadata key \"{0}\" is reserved for the typed point fields")]
    ReservedKey(String),

    #[error("Metadata entry \"{0}\":\"{1}\" is empty or contains one of , : | {{ }}")]
    InvalidMeta(String, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConvoyPoint {
    /// Create a point at the given position with zeroed leader state.
    pub fn new(x_m: f64, y_m: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            ..Default::default()
        }
    }

    /// Add a free-form metadata entry, returning the previous value for the key.
    pub fn insert_meta<K: Into<String>, V: Into<String>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<Option<String>, ConvoyPointError> {
        let key = key.into();
        let value = value.into();

        if RESERVED_META_KEYS.contains(&key.as_str()) {
            return Err(ConvoyPointError::ReservedKey(key));
        }
        if !meta_text_ok(&key) || !meta_text_ok(&value) {
            return Err(ConvoyPointError::InvalidMeta(key, value));
        }

        Ok(self.meta.insert(key, value))
    }

    /// Get a free-form metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// All free-form metadata entries.
    pub fn meta_entries(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// Straight line distance from this point to a position.
    pub fn dist_to(&self, position_m: &Vector2<f64>) -> f64 {
        (self.position_m - position_m).norm()
    }

    /// Encode the point into its canonical text form.
    pub fn encode(&self) -> String {
        let typed = [
            (LEADER_HEADING_KEY, self.leader_heading_deg),
            (LEADER_HEADING_RATE_KEY, self.leader_heading_rate_degs),
            (LEADER_SPEED_KEY, self.leader_speed_ms),
            (SEED_TIME_KEY, self.seed_time_s),
        ];

        let meta = typed
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .chain(self.meta.iter().map(|(k, v)| format!("{}:{}", k, v)))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{{x={},y={}}}|{{{}}}",
            self.position_m[0], self.position_m[1], meta
        )
    }

    /// Decode a point from its text form.
    ///
    /// Decoding never fails. Fields which are missing or malformed keep their default value, and
    /// unknown position fields (such as `label=` or `vertex_size=`) are ignored.
    pub fn decode(s: &str) -> Self {
        let mut point = Self::default();

        let (pos_part, meta_part) = match s.split_once('|') {
            Some((p, m)) => (p, Some(m)),
            None => (s, None),
        };

        for chunk in strip_braces(pos_part).split(',') {
            let (key, val) = match chunk.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            let target = match key.trim() {
                "x" => &mut point.position_m[0],
                "y" => &mut point.position_m[1],
                _ => continue,
            };
            parse_into(target, key, val);
        }

        if let Some(meta_part) = meta_part {
            for pair in strip_braces(meta_part).split(',') {
                let (key, val) = match pair.split_once(':') {
                    Some((k, v)) => (k.trim(), v.trim()),
                    None => continue,
                };
                match key {
                    SEED_TIME_KEY => parse_into(&mut point.seed_time_s, key, val),
                    LEADER_HEADING_KEY => parse_into(&mut point.leader_heading_deg, key, val),
                    LEADER_HEADING_RATE_KEY => {
                        parse_into(&mut point.leader_heading_rate_degs, key, val)
                    }
                    LEADER_SPEED_KEY => parse_into(&mut point.leader_speed_ms, key, val),
                    _ if meta_text_ok(key) && meta_text_ok(val) => {
                        point.meta.insert(key.to_string(), val.to_string());
                    }
                    _ => debug!("Skipping malformed point metadata {:?}:{:?}", key, val),
                }
            }
        } else {
            debug!("Convoy point {:?} has no metadata block", s);
        }

        point
    }
}

impl fmt::Display for ConvoyPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn meta_text_ok(s: &str) -> bool {
    !s.trim().is_empty()
        && s.trim() == s
        && !s.chars().any(|c| FORBIDDEN_META_CHARS.contains(&c))
}

fn parse_into(target: &mut f64, key: &str, val: &str) {
    match val.trim().parse::<f64>() {
        Ok(v) => *target = v,
        Err(_) => debug!("Skipping malformed point field {}={:?}", key.trim(), val),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> ConvoyPoint {
        let mut p = ConvoyPoint::new(12.25, -3.1);
        p.seed_time_s = 104.7;
        p.leader_heading_deg = 359.9;
        p.leader_heading_rate_degs = -0.012345678901;
        p.leader_speed_ms = 1.2;
        p.insert_meta("id", "7").unwrap();
        p.insert_meta("origin", "alpha").unwrap();
        p
    }

    #[test]
    fn test_round_trip() {
        let p = sample();
        assert_eq!(ConvoyPoint::decode(&p.encode()), p);

        let awkward = ConvoyPoint {
            position_m: Vector2::new(1e-300, 123456789.123456789),
            seed_time_s: 0.1 + 0.2,
            leader_heading_deg: -0.0,
            leader_heading_rate_degs: std::f64::MAX,
            leader_speed_ms: std::f64::MIN_POSITIVE,
            meta: BTreeMap::new(),
        };
        assert_eq!(ConvoyPoint::decode(&awkward.encode()), awkward);

        assert_eq!(
            ConvoyPoint::decode(&ConvoyPoint::default().encode()),
            ConvoyPoint::default()
        );
    }

    #[test]
    fn test_encoding_layout() {
        let mut p = ConvoyPoint::new(1.0, 2.5);
        p.seed_time_s = 3.0;
        assert_eq!(
            p.encode(),
            "{x=1,y=2.5}|{leader_heading:0,leader_heading_rate:0,leader_speed:0,seed_time:3}"
        );
    }

    #[test]
    fn test_meta_order_irrelevant() {
        let a = ConvoyPoint::decode("{x=1,y=2}|{seed_time:4,zz:1,aa:2}");
        let b = ConvoyPoint::decode("{y=2,x=1}|{aa:2,zz:1,seed_time:4}");
        assert_eq!(a, b);
        assert_eq!(a.seed_time_s, 4.0);
        assert_eq!(a.meta("aa"), Some("2"));
    }

    #[test]
    fn test_insert_meta_validation() {
        let mut p = ConvoyPoint::new(0.0, 0.0);
        assert!(matches!(
            p.insert_meta("seed_time", "1"),
            Err(ConvoyPointError::ReservedKey(_))
        ));
        assert!(p.insert_meta("a,b", "1").is_err());
        assert!(p.insert_meta("a", "x:y").is_err());
        assert!(p.insert_meta("", "1").is_err());
        assert!(p.insert_meta("a", " 1").is_err());
        assert_eq!(p.insert_meta("a", "1"), Ok(None));
        assert_eq!(p.insert_meta("a", "2"), Ok(Some("1".to_string())));
    }

    #[test]
    fn test_decode_tolerates_gaps() {
        // Marker fields, a garbage y and a broken meta entry
        let p = ConvoyPoint::decode(
            "{x=5,y=abc,label=3,vertex_color=red,vertex_size=10}|{seed_time:nan?,leader_speed:1.5,broken}",
        );
        assert_eq!(p.position_m, Vector2::new(5.0, 0.0));
        assert_eq!(p.seed_time_s, 0.0);
        assert_eq!(p.leader_speed_ms, 1.5);
        assert!(p.meta_entries().is_empty());

        // No metadata at all
        let p = ConvoyPoint::decode("x=1,y=2");
        assert_eq!(p.position_m, Vector2::new(1.0, 2.0));

        // Complete garbage
        assert_eq!(ConvoyPoint::decode("###"), ConvoyPoint::default());
    }

    #[test]
    fn test_dist_to() {
        let p = ConvoyPoint::new(3.0, 4.0);
        assert_eq!(p.dist_to(&Vector2::new(0.0, 0.0)), 5.0);
    }
}
