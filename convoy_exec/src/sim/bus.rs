//! # Simulated mail bus
//!
//! Mail posted during one tick is routed at the end of the tick and delivered at the start of the
//! next. Local mail never leaves the agent which posted it, so the bus only counts it.
//!
//! Loss and duplication are deterministic: every `drop_every`th delivery is dropped and every
//! `duplicate_every`th delivery is made twice. A value of 0 turns the fault off.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use comms_if::{
    convoy::AgentName,
    mail::{Destination, Mail},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Fault injection settings for the bus.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusParams {
    pub drop_every: u64,
    pub duplicate_every: u64,
}

/// Counters kept by the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BusStats {
    pub posted: u64,
    pub local: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
}

pub struct SimBus {
    params: BusParams,

    /// Mail posted this tick, waiting to be routed
    posted: Vec<Mail>,

    /// Mail waiting to be taken by each agent
    inboxes: BTreeMap<AgentName, Vec<Mail>>,

    /// Number of deliveries attempted, used to pick the faulty ones
    attempts: u64,

    stats: BusStats,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimBus {
    pub fn new(params: BusParams) -> Self {
        Self {
            params,
            posted: Vec::new(),
            inboxes: BTreeMap::new(),
            attempts: 0,
            stats: BusStats::default(),
        }
    }

    /// Add an agent to the bus.
    pub fn register(&mut self, name: AgentName) {
        self.inboxes.entry(name).or_default();
    }

    /// Post mail from an agent, to be routed at the end of the tick.
    pub fn post(&mut self, mail: Mail) {
        self.stats.posted += 1;

        if mail.dest == Destination::Local {
            trace!("Local {}: {}", mail.topic, mail.payload);
            self.stats.local += 1;
        } else {
            self.posted.push(mail);
        }
    }

    /// Put mail straight into an agent's inbox, bypassing fault injection.
    ///
    /// Used for the mail an agent's own processes would send it.
    pub fn inject(&mut self, to: &AgentName, mail: Mail) {
        self.inboxes.entry(to.clone()).or_default().push(mail);
    }

    /// Route everything posted this tick into the inboxes.
    pub fn route(&mut self) {
        let posted = std::mem::take(&mut self.posted);

        for mail in posted {
            let recipients: Vec<AgentName> = self
                .inboxes
                .keys()
                .filter(|n| mail.source.as_ref() != Some(*n) && mail.is_for(n))
                .cloned()
                .collect();

            for to in recipients {
                self.attempts += 1;

                if is_nth(self.attempts, self.params.drop_every) {
                    trace!("Dropped {} to {}", mail.topic, to);
                    self.stats.dropped += 1;
                    continue;
                }

                let copies = if is_nth(self.attempts, self.params.duplicate_every) {
                    self.stats.duplicated += 1;
                    2
                } else {
                    1
                };

                if let Some(inbox) = self.inboxes.get_mut(&to) {
                    for _ in 0..copies {
                        inbox.push(mail.clone());
                        self.stats.delivered += 1;
                    }
                }
            }
        }
    }

    /// Take all mail waiting for an agent.
    pub fn take(&mut self, name: &AgentName) -> Vec<Mail> {
        self.inboxes
            .get_mut(name)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn is_nth(count: u64, every: u64) -> bool {
    every > 0 && count % every == 0
}
