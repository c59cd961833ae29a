//! Repost timer
//!
//! Convoy facts are broadcast again at a fixed interval whether or not they changed, so that an
//! agent which missed a message eventually hears it. The timer tracks the next time each kind of
//! fact may be posted so that a fact is never sent more often than once per interval.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Next-fire times for each kind of repost.
#[derive(Debug, Clone, Default)]
pub struct RepostTimer {
    next_fire_s: BTreeMap<RepostKind, f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The facts which are periodically reposted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RepostKind {
    /// The leader's `<self>_following_*` fact
    Leadership,

    /// A follower's own `<self>_following_<leader>` fact
    OwnFollow,

    /// The resolved ordering
    Ordering,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RepostTimer {
    /// Returns true if `kind` may be posted at `now_s`.
    ///
    /// A kind which has never been posted may always be posted.
    pub fn should_fire(&self, kind: RepostKind, now_s: f64) -> bool {
        match self.next_fire_s.get(&kind) {
            Some(t) => now_s >= *t,
            None => true,
        }
    }

    /// Record that `kind` was posted at `now_s`.
    pub fn schedule(&mut self, kind: RepostKind, now_s: f64, interval_s: f64) {
        self.next_fire_s.insert(kind, now_s + interval_s);
    }

    /// If `kind` may be posted now, schedule the next post and return true.
    pub fn fire(&mut self, kind: RepostKind, now_s: f64, interval_s: f64) -> bool {
        if self.should_fire(kind, now_s) {
            self.schedule(kind, now_s, interval_s);
            true
        } else {
            false
        }
    }

    /// Forget the schedule of `kind`, so that it may be posted straight away.
    pub fn reset(&mut self, kind: RepostKind) {
        self.next_fire_s.remove(&kind);
    }

    /// The next time at which `kind` may be posted, if it has been posted before.
    pub fn next_fire_s(&self, kind: RepostKind) -> Option<f64> {
        self.next_fire_s.get(&kind).copied()
    }
}
