//! Domain Layer - Market records, decoded messages, and session knowledge.
//!
//! This layer contains the canonical record types extracted from observed
//! traffic, the decoded protocol message model, and the per-session location
//! state machine. Nothing here performs I/O.

/// Market orders, upload batches, and identifiers.
pub mod market;

/// Decoded protocol messages and parameter values.
pub mod protocol;

/// Session location state machine.
pub mod session;
