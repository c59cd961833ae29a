//! # Convoy payloads
//!
//! Agents identify each other by name and agree on the convoy order by exchanging follow facts,
//! `"<follower>_following_<leader>"`, where the leader `*` means "follows nobody". A resolved
//! order is exchanged as a comma separated list of names from head to tail.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod agent_info;
mod point;

pub use agent_info::AgentInfo;
pub use point::{ConvoyPoint, ConvoyPointError, RESERVED_META_KEYS};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// The leader name used by an agent which follows nobody.
pub const NOBODY: &str = "*";

/// Separator between the follower and the leader in a follow fact.
const FOLLOWING_SEP: &str = "_following_";

/// Characters which would break one of the text encodings if they appeared in a name.
const FORBIDDEN_NAME_CHARS: &[char] = &[',', '|', '{', '}', '=', ':', '*', '\'', '"'];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The unique name of an agent.
///
/// Names are stored in lower case, so `"Alpha"` and `"alpha"` are the same agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentName(String);

/// One "A follows B" fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowFact {
    /// The agent making the claim
    pub follower: AgentName,

    /// Who it follows
    pub leader: FollowTarget,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The agent being followed, or nobody for the convoy leader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FollowTarget {
    /// Follows nobody, encoded as `*`
    Nobody,

    /// Follows the named agent
    Agent(AgentName),
}

/// Errors raised while parsing convoy payloads.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvoyMsgError {
    #[error("\"{0}\" is not a valid agent name")]
    InvalidName(String),

    #[error("\"{0}\" is not a follow fact, expected <follower>_following_<leader>")]
    MalformedFact(String),

    #[error("Agent {0} claims to follow itself")]
    SelfFollow(AgentName),

    #[error("Malformed ordering \"{0}\": {1}")]
    MalformedOrdering(String, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AgentName {
    /// Create a new name, trimming and lower casing it.
    ///
    /// Names may not be empty, contain whitespace or any of the separator characters used by the
    /// payload encodings, or contain the follow fact separator `_following_`.
    pub fn new<S: AsRef<str>>(name: S) -> Result<Self, ConvoyMsgError> {
        let name = name.as_ref().trim().to_lowercase();

        if name.is_empty()
            || name.contains(FOLLOWING_SEP)
            || name
                .chars()
                .any(|c| c.is_whitespace() || FORBIDDEN_NAME_CHARS.contains(&c))
        {
            return Err(ConvoyMsgError::InvalidName(name));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentName {
    type Err = ConvoyMsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for AgentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FollowTarget {
    /// Return the followed agent's name, or `None` for the leader sentinel.
    pub fn agent(&self) -> Option<&AgentName> {
        match self {
            FollowTarget::Nobody => None,
            FollowTarget::Agent(a) => Some(a),
        }
    }
}

impl fmt::Display for FollowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FollowTarget::Nobody => f.write_str(NOBODY),
            FollowTarget::Agent(a) => a.fmt(f),
        }
    }
}

impl FromStr for FollowTarget {
    type Err = ConvoyMsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == NOBODY {
            Ok(FollowTarget::Nobody)
        } else {
            AgentName::new(s).map(FollowTarget::Agent)
        }
    }
}

impl From<AgentName> for FollowTarget {
    fn from(name: AgentName) -> Self {
        FollowTarget::Agent(name)
    }
}

impl FollowFact {
    /// Build a fact, rejecting an agent which claims to follow itself.
    pub fn new(follower: AgentName, leader: FollowTarget) -> Result<Self, ConvoyMsgError> {
        if leader.agent() == Some(&follower) {
            return Err(ConvoyMsgError::SelfFollow(follower));
        }

        Ok(Self { follower, leader })
    }

    /// The fact announced by a convoy leader.
    pub fn leading(leader: AgentName) -> Self {
        Self {
            follower: leader,
            leader: FollowTarget::Nobody,
        }
    }

    /// Encode as `<follower>_following_<leader>`.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.follower, FOLLOWING_SEP, self.leader)
    }

    /// Decode a fact from `<follower>_following_<leader>`, case insensitively.
    pub fn decode(s: &str) -> Result<Self, ConvoyMsgError> {
        let lower = s.trim().to_lowercase();
        let (follower, leader) = lower
            .split_once(FOLLOWING_SEP)
            .ok_or_else(|| ConvoyMsgError::MalformedFact(s.to_string()))?;

        Self::new(AgentName::new(follower)?, leader.parse()?)
    }
}

impl fmt::Display for FollowFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Encode an ordering, head first, as a comma separated list.
pub fn encode_ordering(ordering: &[AgentName]) -> String {
    ordering
        .iter()
        .map(AgentName::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a comma separated ordering.
///
/// The ordering must contain at least one name, every name must be valid, and no name may appear
/// twice.
pub fn decode_ordering(s: &str) -> Result<Vec<AgentName>, ConvoyMsgError> {
    let malformed = |why: &str| ConvoyMsgError::MalformedOrdering(s.to_string(), why.to_string());

    let mut seen = BTreeSet::new();
    let mut ordering = Vec::new();

    for raw in s.split(',') {
        let name = AgentName::new(raw).map_err(|_| malformed("invalid or missing name"))?;
        if !seen.insert(name.clone()) {
            return Err(malformed("duplicate name"));
        }
        ordering.push(name);
    }

    if ordering.is_empty() {
        return Err(malformed("empty"));
    }

    Ok(ordering)
}

/// Decode a contact roster, skipping (and warning about) any invalid names.
pub fn decode_roster(s: &str) -> BTreeSet<AgentName> {
    s.split(',')
        .filter(|raw| !raw.trim().is_empty())
        .filter_map(|raw| match AgentName::new(raw) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Ignoring roster entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(s: &str) -> AgentName {
        AgentName::new(s).unwrap()
    }

    #[test]
    fn test_agent_name() {
        assert_eq!(name(" Alpha ").as_str(), "alpha");
        assert!(AgentName::new("").is_err());
        assert!(AgentName::new("*").is_err());
        assert!(AgentName::new("a,b").is_err());
        assert!(AgentName::new("a b").is_err());
        assert!(AgentName::new("x_following_y").is_err());
        assert_eq!(name("heron_1").as_str(), "heron_1");
    }

    #[test]
    fn test_follow_fact() {
        let fact = FollowFact::decode("Bravo_following_ALPHA").unwrap();
        assert_eq!(fact.follower, name("bravo"));
        assert_eq!(fact.leader, FollowTarget::Agent(name("alpha")));
        assert_eq!(fact.encode(), "bravo_following_alpha");

        let lead = FollowFact::decode("alpha_following_*").unwrap();
        assert_eq!(lead, FollowFact::leading(name("alpha")));

        // Names with underscores survive
        let fact = FollowFact::decode("heron_2_following_heron_1").unwrap();
        assert_eq!(fact.follower, name("heron_2"));
        assert_eq!(fact.leader, FollowTarget::Agent(name("heron_1")));

        assert!(matches!(
            FollowFact::decode("alpha_follows_bravo"),
            Err(ConvoyMsgError::MalformedFact(_))
        ));
        assert!(matches!(
            FollowFact::decode("alpha_following_alpha"),
            Err(ConvoyMsgError::SelfFollow(_))
        ));
        assert!(FollowFact::decode("_following_alpha").is_err());
    }

    #[test]
    fn test_ordering() {
        let ordering = decode_ordering("a, b,C").unwrap();
        assert_eq!(ordering, vec![name("a"), name("b"), name("c")]);
        assert_eq!(encode_ordering(&ordering), "a,b,c");

        assert!(decode_ordering("").is_err());
        assert!(decode_ordering("a,,b").is_err());
        assert!(decode_ordering("a,b,a").is_err());
    }

    #[test]
    fn test_roster() {
        let roster = decode_roster("b, c,,b ,bad name");
        assert_eq!(roster.len(), 2);
        assert!(roster.contains(&name("b")));
        assert!(roster.contains(&name("c")));
    }
}
