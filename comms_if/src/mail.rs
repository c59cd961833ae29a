//! # Mail
//!
//! Everything an agent sends or receives is a [`Mail`]: a topic, a string payload and an address.
//! Local mail comes from (or goes to) the agent's own processes, such as the task allocator which
//! tells the agent it is the leader. Addressed mail travels between agents.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::convoy::AgentName;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const AGENT_INFO_PREFIX: &str = "AGENT_INFO_";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// The agent which sent the mail, `None` for local mail.
    pub source: Option<AgentName>,

    /// Where the mail is going
    pub dest: Destination,

    /// What the mail is about
    pub topic: Topic,

    /// The encoded payload
    pub payload: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The topics carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// `LEADER`: `true` if this agent leads the convoy
    Leader,

    /// `CONTACTS_LIST`: comma separated names of the other agents
    ContactsList,

    /// `TASK_STATE`: task allocator state, containing `id=follow_<name>` and `bidwon` once the
    /// agent has won the bid to follow `<name>`
    TaskState,

    /// `A_FOLLOWING_B`: a follow fact
    FollowBroadcast,

    /// `ORDERING`: a complete convoy ordering, head first
    Ordering,

    /// `NEW_LEAD_POINT`: a convoy point addressed to the next agent back
    LeadPoint,

    /// `AGENT_INFO_<NAME>`: the named agent's kinematic state
    AgentInfo(AgentName),

    /// `CONVOY_UPDATES`: runtime configuration changes
    ConvoyUpdates,

    /// `VIEW_POINT`: a point marker for visualisation
    ViewPoint,
}

/// The address of a mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    /// The agent's own processes
    Local,

    /// Every other agent
    All,

    /// One agent
    Agent(AgentName),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Mail {
    /// Mail exchanged with the agent's own processes.
    pub fn local<P: Into<String>>(topic: Topic, payload: P) -> Self {
        Self {
            source: None,
            dest: Destination::Local,
            topic,
            payload: payload.into(),
        }
    }

    /// Mail from `source` to every other agent.
    pub fn broadcast<P: Into<String>>(source: AgentName, topic: Topic, payload: P) -> Self {
        Self {
            source: Some(source),
            dest: Destination::All,
            topic,
            payload: payload.into(),
        }
    }

    /// Mail from `source` to a single agent.
    pub fn to<P: Into<String>>(source: AgentName, dest: AgentName, topic: Topic, payload: P) -> Self {
        Self {
            source: Some(source),
            dest: Destination::Agent(dest),
            topic,
            payload: payload.into(),
        }
    }

    /// Returns true if an agent called `name` should act on this mail when it receives it.
    pub fn is_for(&self, name: &AgentName) -> bool {
        match &self.dest {
            Destination::Local | Destination::All => true,
            Destination::Agent(a) => a == name,
        }
    }
}

impl Topic {
    /// The bus variable name for the topic.
    pub fn var_name(&self) -> String {
        match self {
            Topic::Leader => "LEADER".into(),
            Topic::ContactsList => "CONTACTS_LIST".into(),
            Topic::TaskState => "TASK_STATE".into(),
            Topic::FollowBroadcast => "A_FOLLOWING_B".into(),
            Topic::Ordering => "ORDERING".into(),
            Topic::LeadPoint => "NEW_LEAD_POINT".into(),
            Topic::AgentInfo(name) => {
                format!("{}{}", AGENT_INFO_PREFIX, name.as_str().to_uppercase())
            }
            Topic::ConvoyUpdates => "CONVOY_UPDATES".into(),
            Topic::ViewPoint => "VIEW_POINT".into(),
        }
    }

    /// Parse a bus variable name, case insensitively.
    pub fn from_var_name(var: &str) -> Option<Self> {
        let upper = var.trim().to_uppercase();

        match upper.as_str() {
            "LEADER" => Some(Topic::Leader),
            "CONTACTS_LIST" => Some(Topic::ContactsList),
            "TASK_STATE" => Some(Topic::TaskState),
            "A_FOLLOWING_B" => Some(Topic::FollowBroadcast),
            "ORDERING" => Some(Topic::Ordering),
            "NEW_LEAD_POINT" => Some(Topic::LeadPoint),
            "CONVOY_UPDATES" => Some(Topic::ConvoyUpdates),
            "VIEW_POINT" => Some(Topic::ViewPoint),
            other => other
                .strip_prefix(AGENT_INFO_PREFIX)
                .and_then(|name| AgentName::new(name).ok())
                .map(Topic::AgentInfo),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.var_name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(s: &str) -> AgentName {
        AgentName::new(s).unwrap()
    }

    #[test]
    fn test_topic_names() {
        let topics = vec![
            Topic::Leader,
            Topic::ContactsList,
            Topic::TaskState,
            Topic::FollowBroadcast,
            Topic::Ordering,
            Topic::LeadPoint,
            Topic::AgentInfo(name("heron_2")),
            Topic::ConvoyUpdates,
            Topic::ViewPoint,
        ];

        for t in topics {
            assert_eq!(Topic::from_var_name(&t.var_name()), Some(t));
        }

        assert_eq!(
            Topic::AgentInfo(name("bravo")).var_name(),
            "AGENT_INFO_BRAVO"
        );
        assert_eq!(Topic::from_var_name("NAV_X"), None);
        assert_eq!(Topic::from_var_name("AGENT_INFO_"), None);
    }

    #[test]
    fn test_is_for() {
        let a = name("a");
        let b = name("b");

        assert!(Mail::local(Topic::Leader, "true").is_for(&a));
        assert!(Mail::broadcast(b.clone(), Topic::Ordering, "b,a").is_for(&a));
        assert!(Mail::to(b.clone(), a.clone(), Topic::LeadPoint, "").is_for(&a));
        assert!(!Mail::to(a.clone(), b.clone(), Topic::LeadPoint, "").is_for(&a));
    }
}
