//! # Convoy library.
//!
//! This library allows other crates in the workspace, and the benches, to access items defined
//! inside the convoy crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Convoy control module - keeps the agent in its place in the convoy
pub mod convoy_ctrl;

/// Simulation - runs a whole convoy in one process
pub mod sim;
