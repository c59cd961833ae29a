//! # Convoy control module
//!
//! Convoy control keeps an agent in its place in a single file convoy. One agent leads and every
//! other agent follows exactly one agent ahead of it. The module:
//!
//!  - Works out the convoy order from the "A follows B" facts agents broadcast, and from it this
//!    agent's role and the agent following it.
//!  - On the leader, drops a convoy point every few meters and sends it to the follower.
//!  - On a follower, queues the points it receives, steers for the head of the queue, and passes
//!    each point it captures on to its own follower.
//!  - Computes a speed reference with a PD law on the path distance to the agent it follows, and
//!    hands the heading and speed references on as a coupled objective.
//!
//! All communication is over a lossy bus, so facts are idempotent, and each agent periodically
//! reposts what it knows.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod controllers;
pub mod nav;
pub mod objective;
pub mod ordering;
pub mod params;
pub mod point_queue;
pub mod relay;
pub mod state;
pub mod timer;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::{compute_refs, ControlRefs, TargetState};
pub use nav::NavState;
pub use objective::{CoupledObjective, ObjectiveBuilder, ObjectiveError, ScalarObjective};
pub use ordering::{OrderingResolver, Resolution, ResolverError, Role};
pub use params::{ConfigOption, ParamError, Params};
pub use point_queue::ConvoyPointQueue;
pub use state::*;
pub use timer::{RepostKind, RepostTimer};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while setting up or running convoy control.
#[derive(Debug, thiserror::Error)]
pub enum ConvoyCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] ParamError),

    #[error("Could not open the status archive: {0}")]
    ArchiveError(#[from] util::archive::ArchiveError),

    #[error("Navigation input is not finite: {0:?}")]
    InvalidNav(NavState),
}
