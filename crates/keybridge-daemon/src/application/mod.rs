//! Application layer use cases for the daemon.
//!
//! Use cases here orchestrate the domain objects from `keybridge_core`
//! (key events, the action table, the debounce gate) and depend on
//! abstractions for everything that touches the outside world: the
//! [`audio::AudioSpawner`] for player processes, the
//! [`outbound::CommandTransport`] for IRCC delivery, the
//! [`telemetry::TelemetrySink`] for the bus, and the device traits in
//! `infrastructure::input_capture`.
//!
//! # Sub-modules
//!
//! - **`dispatch`**   – The per-event pipeline: resolve, debounce, execute,
//!   report.  Runs on every key press.
//! - **`executor`**   – Performs an action against the configured effectors.
//! - **`audio`**      – At-most-one playback arbitration and the sound pool.
//! - **`outbound`**   – Bounded-retry command delivery.
//! - **`telemetry`**  – Topics, records, stats registry, and the publisher.
//! - **`supervisor`** – Device lifecycle state machine and shutdown signal.
//! - **`bridge`**     – Assembles the supervisor with the status and control
//!   tasks and runs the stop sequence.

pub mod audio;
pub mod bridge;
pub mod dispatch;
pub mod executor;
pub mod outbound;
pub mod supervisor;
pub mod telemetry;
