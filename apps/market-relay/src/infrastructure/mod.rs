//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the wire decoder and the concrete implementations of
//! the port interfaces defined in the application layer.

/// Binary RPC protocol decoding: framing, fragments, parameter tables.
pub mod protocol;

/// Byte-stream sources feeding the stream processors.
pub mod source;

/// Ingestion publishers (HTTP, in-memory).
pub mod ingest;

/// Local order persistence.
pub mod persistence;

/// Task executors for handler side effects.
pub mod executor;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
