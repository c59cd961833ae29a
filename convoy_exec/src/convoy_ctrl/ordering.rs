//! # Ordering resolver
//!
//! Agents announce who they follow with facts of the form "A follows B", where the leader follows
//! nobody (`*`). Each agent keeps the latest fact from every agent in a follower to leader map.
//! Once the map holds a fact for every member of the convoy it is inverted into a leader to
//! follower map and walked from `*`, giving the convoy order from head to tail.
//!
//! Facts arrive over a lossy bus in any order, so resolution is attempted again on every new fact
//! and every fact simply overwrites the previous one from the same agent. When two agents claim to
//! follow the same leader the one later in name order wins the inversion, which keeps the result
//! the same on every agent holding the same facts.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// Internal
use comms_if::convoy::{encode_ordering, AgentName, FollowFact, FollowTarget};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Resolves the convoy order from follow facts.
#[derive(Debug, Clone)]
pub struct OrderingResolver {
    /// Name of the agent running the resolver
    own_name: AgentName,

    /// The other agents expected in the convoy
    roster: BTreeSet<AgentName>,

    /// Latest fact from each agent
    follower_to_leader: BTreeMap<AgentName, FollowTarget>,

    /// Inverse of the follower to leader map at the last successful resolution
    leader_to_follower: BTreeMap<FollowTarget, AgentName>,

    /// The last resolved ordering, head first
    ordering: Vec<AgentName>,

    /// True if this agent has been told it leads the convoy
    is_leader: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The agent's place in the convoy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    /// The ordering has not been resolved, or does not place this agent
    Unassigned,

    /// Head of the convoy
    Leader,

    /// Follows one agent and is followed by another
    Midship,

    /// Last in the convoy
    Tail,
}

impl Default for Role {
    fn default() -> Self {
        Role::Unassigned
    }
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Not every member of the convoy has announced who it follows yet.
    Deferred { known: usize, expected: usize },

    /// The ordering was resolved, `changed` is true if it differs from the previous one.
    Resolved { changed: bool },
}

/// Faults detected while resolving.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolverError {
    #[error("The follow facts contain a cycle through {0:?}")]
    CycleDetected(Vec<AgentName>),

    #[error("Malformed ordering: {0}")]
    MalformedOrdering(String),

    #[error("Ordering {ordering} is not a connected chain, the walk reached {reached} of its agents")]
    IncompleteChain { ordering: String, reached: usize },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OrderingResolver {
    pub fn new(own_name: AgentName) -> Self {
        Self {
            own_name,
            roster: BTreeSet::new(),
            follower_to_leader: BTreeMap::new(),
            leader_to_follower: BTreeMap::new(),
            ordering: Vec::new(),
            is_leader: false,
        }
    }

    pub fn own_name(&self) -> &AgentName {
        &self.own_name
    }

    /// The other agents expected in the convoy.
    pub fn roster(&self) -> &BTreeSet<AgentName> {
        &self.roster
    }

    /// Number of agents expected in the convoy, including this one.
    pub fn population(&self) -> usize {
        self.roster.len() + if self.roster.contains(&self.own_name) { 0 } else { 1 }
    }

    /// Number of agents whose follow fact is known.
    pub fn known_facts(&self) -> usize {
        self.follower_to_leader.len()
    }

    /// Replace the roster of other agents and attempt resolution.
    pub fn set_roster(
        &mut self,
        roster: BTreeSet<AgentName>,
    ) -> Result<Resolution, ResolverError> {
        self.roster = roster;
        self.resolve()
    }

    /// Set whether this agent leads the convoy.
    ///
    /// Becoming leader records the fact that this agent follows nobody. Losing leadership removes
    /// that fact, leaving the agent without a fact until it wins a bid.
    pub fn set_leader(&mut self, is_leader: bool) -> Result<Resolution, ResolverError> {
        self.is_leader = is_leader;

        if is_leader {
            self.follower_to_leader
                .insert(self.own_name.clone(), FollowTarget::Nobody);
        } else if self.follower_to_leader.get(&self.own_name) == Some(&FollowTarget::Nobody) {
            self.follower_to_leader.remove(&self.own_name);
        }

        self.resolve()
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Record a fact, overwriting any previous fact from the same follower, and attempt
    /// resolution.
    pub fn record_fact(&mut self, fact: FollowFact) -> Result<Resolution, ResolverError> {
        self.insert_fact(fact);
        self.resolve()
    }

    /// Merge a complete ordering broadcast by another agent.
    ///
    /// The ordering is turned into one fact per agent and applied to a copy of the resolver. The
    /// copy replaces this resolver only if it resolves without fault and its walk covers the whole
    /// ordering, otherwise the current state is kept and the fault returned. A fact this agent
    /// already holds about itself is never overwritten by an ordering from elsewhere.
    pub fn merge_ordering(&mut self, ordering: &[AgentName]) -> Result<Resolution, ResolverError> {
        if ordering.is_empty() {
            return Err(ResolverError::MalformedOrdering("empty ordering".into()));
        }
        let unique: BTreeSet<_> = ordering.iter().collect();
        if unique.len() != ordering.len() {
            return Err(ResolverError::MalformedOrdering(format!(
                "duplicate names in {}",
                encode_ordering(ordering)
            )));
        }

        let mut scratch = self.clone();
        let own_known = scratch.follower_to_leader.contains_key(&self.own_name);

        let mut leader = FollowTarget::Nobody;
        for name in ordering {
            if !(own_known && name == &self.own_name) {
                scratch
                    .follower_to_leader
                    .insert(name.clone(), leader.clone());
            }
            leader = FollowTarget::Agent(name.clone());
        }

        let resolution = scratch.resolve()?;

        if let Resolution::Resolved { .. } = resolution {
            let reached = ordering
                .iter()
                .filter(|n| scratch.ordering.contains(n))
                .count();
            if reached != ordering.len() {
                return Err(ResolverError::IncompleteChain {
                    ordering: encode_ordering(ordering),
                    reached,
                });
            }
        }

        *self = scratch;
        Ok(resolution)
    }

    /// Attempt to resolve the ordering from the known facts.
    ///
    /// On a fault the previous ordering is kept.
    pub fn resolve(&mut self) -> Result<Resolution, ResolverError> {
        let expected = self.population();
        let known = self.follower_to_leader.len();

        if known < expected {
            debug!(
                "Ordering deferred, {} of {} follow facts known",
                known, expected
            );
            return Ok(Resolution::Deferred { known, expected });
        }

        // Invert, later followers in name order overwriting earlier ones
        let mut leader_to_follower = BTreeMap::new();
        for (follower, leader) in self.follower_to_leader.iter() {
            leader_to_follower.insert(leader.clone(), follower.clone());
        }

        // Walk from the head, at most one step per known agent. Each follower appears once in
        // the inversion, so the walk never revisits an agent.
        let mut ordering = Vec::with_capacity(known);
        let mut cursor = FollowTarget::Nobody;
        for _ in 0..known {
            let next = match leader_to_follower.get(&cursor) {
                Some(n) => n,
                None => break,
            };
            ordering.push(next.clone());
            cursor = FollowTarget::Agent(next.clone());
        }

        if ordering.len() < known {
            if let Some(cycle) = self.find_cycle(&ordering) {
                return Err(ResolverError::CycleDetected(cycle));
            }
            warn!(
                "Ordering walk reached {} of {} agents: {}",
                ordering.len(),
                known,
                encode_ordering(&ordering)
            );
        }

        let changed = ordering != self.ordering;
        if changed {
            debug!("New ordering: {}", encode_ordering(&ordering));
        }

        self.ordering = ordering;
        self.leader_to_follower = leader_to_follower;

        Ok(Resolution::Resolved { changed })
    }

    /// The resolved ordering, head first, empty until first resolved.
    pub fn ordering(&self) -> &[AgentName] {
        &self.ordering
    }

    /// This agent's index in the ordering.
    pub fn rank(&self) -> Option<usize> {
        self.ordering.iter().position(|n| n == &self.own_name)
    }

    /// This agent's role.
    pub fn role(&self) -> Role {
        let own = FollowTarget::Agent(self.own_name.clone());

        if self.is_leader {
            Role::Leader
        } else if self.ordering.last() == Some(&self.own_name) {
            Role::Tail
        } else if self.leader_to_follower.contains_key(&own)
            && self.leader_to_follower.values().any(|f| f == &self.own_name)
        {
            Role::Midship
        } else {
            Role::Unassigned
        }
    }

    /// The agent following this one, known once the ordering has been resolved.
    pub fn follower(&self) -> Option<&AgentName> {
        self.leader_to_follower
            .get(&FollowTarget::Agent(self.own_name.clone()))
    }

    /// The agent this one follows, from its own follow fact.
    pub fn followed(&self) -> Option<&AgentName> {
        self.follower_to_leader
            .get(&self.own_name)
            .and_then(FollowTarget::agent)
    }

    /// This agent's own follow fact, if it has one.
    pub fn own_fact(&self) -> Option<FollowFact> {
        self.follower_to_leader
            .get(&self.own_name)
            .map(|leader| FollowFact {
                follower: self.own_name.clone(),
                leader: leader.clone(),
            })
    }

    /// All known facts, in follower name order.
    pub fn facts(&self) -> impl Iterator<Item = (&AgentName, &FollowTarget)> {
        self.follower_to_leader.iter()
    }

    fn insert_fact(&mut self, fact: FollowFact) {
        if fact.follower == self.own_name && self.is_leader && fact.leader != FollowTarget::Nobody {
            debug!("Ignoring fact {} while leading", fact);
            return;
        }
        self.follower_to_leader.insert(fact.follower, fact.leader);
    }

    /// Look for a cycle among the agents the walk did not reach.
    fn find_cycle(&self, reached: &[AgentName]) -> Option<Vec<AgentName>> {
        let reached: BTreeSet<_> = reached.iter().collect();
        let bound = self.follower_to_leader.len();

        for start in self.follower_to_leader.keys().filter(|n| !reached.contains(n)) {
            let mut path: Vec<&AgentName> = vec![start];
            let mut cursor = start;

            while let Some(FollowTarget::Agent(next)) = self.follower_to_leader.get(cursor) {
                if let Some(i) = path.iter().position(|n| *n == next) {
                    return Some(path[i..].iter().map(|n| (*n).clone()).collect());
                }
                if path.len() > bound {
                    break;
                }
                path.push(next);
                cursor = next;
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::convoy::decode_ordering;

    fn name(s: &str) -> AgentName {
        AgentName::new(s).unwrap()
    }

    fn fact(s: &str) -> FollowFact {
        FollowFact::decode(s).unwrap()
    }

    fn roster(names: &[&str]) -> BTreeSet<AgentName> {
        names.iter().map(|n| name(n)).collect()
    }

    fn resolver(own: &str, others: &[&str]) -> OrderingResolver {
        let mut r = OrderingResolver::new(name(own));
        r.set_roster(roster(others)).unwrap();
        r
    }

    #[test]
    fn test_deferred_until_complete() {
        let mut r = resolver("b", &["a", "c"]);
        assert_eq!(r.population(), 3);

        assert_eq!(
            r.record_fact(fact("a_following_*")).unwrap(),
            Resolution::Deferred {
                known: 1,
                expected: 3
            }
        );
        r.record_fact(fact("b_following_a")).unwrap();
        assert!(r.ordering().is_empty());
        assert_eq!(r.role(), Role::Unassigned);

        assert_eq!(
            r.record_fact(fact("c_following_b")).unwrap(),
            Resolution::Resolved { changed: true }
        );
        assert_eq!(r.ordering(), &[name("a"), name("b"), name("c")]);
        assert_eq!(r.role(), Role::Midship);
        assert_eq!(r.follower(), Some(&name("c")));
        assert_eq!(r.followed(), Some(&name("a")));
        assert_eq!(r.rank(), Some(1));
    }

    #[test]
    fn test_convergence_any_order() {
        let facts = [
            "d_following_c",
            "b_following_a",
            "a_following_*",
            "c_following_b",
        ];

        // Every rotation of the arrival order gives the same result
        for shift in 0..facts.len() {
            let mut r = resolver("c", &["a", "b", "d"]);
            for i in 0..facts.len() {
                r.record_fact(fact(facts[(i + shift) % facts.len()])).unwrap();
            }
            assert_eq!(r.ordering(), &[name("a"), name("b"), name("c"), name("d")]);

            // Stable under re-resolution and duplicate delivery
            assert_eq!(r.resolve().unwrap(), Resolution::Resolved { changed: false });
            assert_eq!(
                r.record_fact(fact("b_following_a")).unwrap(),
                Resolution::Resolved { changed: false }
            );
        }
    }

    #[test]
    fn test_roles_exclusive() {
        let names = ["a", "b", "c"];
        let facts = ["a_following_*", "b_following_a", "c_following_b"];

        let roles: Vec<Role> = names
            .iter()
            .map(|own| {
                let others: Vec<&str> = names.iter().filter(|n| *n != own).copied().collect();
                let mut r = resolver(own, &others);
                if *own == "a" {
                    r.set_leader(true).unwrap();
                }
                for f in facts.iter() {
                    r.record_fact(fact(f)).unwrap();
                }
                r.role()
            })
            .collect();

        assert_eq!(roles, vec![Role::Leader, Role::Midship, Role::Tail]);
    }

    #[test]
    fn test_leader_flag() {
        let mut r = resolver("a", &["b"]);
        r.set_leader(true).unwrap();
        assert_eq!(r.own_fact(), Some(FollowFact::leading(name("a"))));

        r.record_fact(fact("b_following_a")).unwrap();
        assert_eq!(r.ordering(), &[name("a"), name("b")]);
        assert_eq!(r.role(), Role::Leader);
        assert_eq!(r.follower(), Some(&name("b")));
        assert_eq!(r.followed(), None);

        // A stale claim about ourselves cannot demote the leader
        r.record_fact(fact("a_following_b")).unwrap();
        assert_eq!(r.own_fact(), Some(FollowFact::leading(name("a"))));

        r.set_leader(false).unwrap();
        assert_eq!(r.own_fact(), None);
    }

    #[test]
    fn test_last_writer_wins() {
        let mut r = resolver("a", &["b", "c"]);
        r.set_leader(true).unwrap();
        r.record_fact(fact("b_following_a")).unwrap();
        r.record_fact(fact("c_following_a")).unwrap();

        // c sorts after b so c takes the slot behind a, b is left out
        assert_eq!(r.ordering(), &[name("a"), name("c")]);

        // b re-bids behind c
        r.record_fact(fact("b_following_c")).unwrap();
        assert_eq!(r.ordering(), &[name("a"), name("c"), name("b")]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut r = resolver("a", &["b", "c"]);
        r.record_fact(fact("a_following_c")).unwrap();
        r.record_fact(fact("b_following_a")).unwrap();

        match r.record_fact(fact("c_following_b")) {
            Err(ResolverError::CycleDetected(cycle)) => assert_eq!(cycle.len(), 3),
            other => panic!("Expected a cycle, got {:?}", other),
        }
        assert!(r.ordering().is_empty());

        // A cycle hanging off a valid head is also caught, and the old ordering kept
        let mut r = resolver("a", &["b", "c", "d"]);
        r.set_leader(true).unwrap();
        r.record_fact(fact("b_following_a")).unwrap();
        r.record_fact(fact("c_following_b")).unwrap();
        r.record_fact(fact("d_following_c")).unwrap();
        assert_eq!(r.ordering().len(), 4);

        assert!(matches!(
            r.record_fact(fact("c_following_d")),
            Err(ResolverError::CycleDetected(_))
        ));
        assert_eq!(r.ordering().len(), 4);
    }

    #[test]
    fn test_merge_ordering() {
        let mut r = resolver("c", &["a", "b"]);
        r.record_fact(fact("c_following_b")).unwrap();

        let res = r.merge_ordering(&decode_ordering("a,b,c").unwrap()).unwrap();
        assert_eq!(res, Resolution::Resolved { changed: true });
        assert_eq!(r.ordering(), &[name("a"), name("b"), name("c")]);
        assert_eq!(r.role(), Role::Tail);
        assert_eq!(r.follower(), None);
    }

    #[test]
    fn test_merge_malformed_keeps_state() {
        let mut r = resolver("c", &["a", "b"]);
        r.record_fact(fact("a_following_*")).unwrap();
        r.record_fact(fact("b_following_a")).unwrap();
        r.record_fact(fact("c_following_b")).unwrap();
        let before = r.ordering().to_vec();

        assert!(matches!(
            r.merge_ordering(&[]),
            Err(ResolverError::MalformedOrdering(_))
        ));
        assert!(matches!(
            r.merge_ordering(&[name("a"), name("b"), name("a")]),
            Err(ResolverError::MalformedOrdering(_))
        ));

        // Our own fact says we follow b, so an ordering putting us behind a breaks the chain
        assert!(matches!(
            r.merge_ordering(&[name("b"), name("a"), name("c")]),
            Err(ResolverError::IncompleteChain { .. })
        ));

        assert_eq!(r.ordering(), before.as_slice());
        assert_eq!(
            r.facts().map(|(f, l)| format!("{}>{}", f, l)).collect::<Vec<_>>(),
            vec!["a>*", "b>a", "c>b"]
        );
    }
}
