//! Application Layer - Dispatch, services, and port definitions.
//!
//! This layer routes decoded messages to handlers, turns handler output into
//! upload batches, and defines the ports the infrastructure implements.

/// Operation dispatcher and handler set.
pub mod dispatch;

/// Port interfaces for publishers, stores, executors, and stream input.
pub mod ports;

/// Stream processing, normalization, and upload fan-out.
pub mod services;
