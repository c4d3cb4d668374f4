//! Domain entities for keybridge.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Nothing here reads a clock on its own: every time-dependent
//! operation takes `now` as a parameter so that tests can drive it with
//! synthetic instants.

/// Action model, configuration syntax, and the immutable action table.
pub mod action;

/// Global plus per-key cooldown filter.
pub mod debounce;

/// Key identifiers and key-down events.
pub mod event;

/// Serializable counters and status reported on the telemetry bus.
pub mod stats;
