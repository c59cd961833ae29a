//! # Communications interface crate.
//!
//! Provides the messages exchanged between convoy agents and their canonical text encodings.
//! The transport itself is not part of this crate, anything able to carry a topic name and a
//! string payload between agents can carry these messages.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Convoy payloads: agent names, follow facts, orderings, convoy points and agent info
pub mod convoy;

/// Mail envelopes and topic names
pub mod mail;

/// Text splitting helpers shared by the payload parsers
pub mod text;
