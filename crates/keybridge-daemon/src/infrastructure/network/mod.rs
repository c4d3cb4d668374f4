//! Network infrastructure.
//!
//! - **`ircc_client`** – reqwest-based transport that POSTs IRCC envelopes to
//!   the TV.
//! - **`mqtt`** – rumqttc-backed telemetry sink and the bus event loop task.

pub mod ircc_client;
pub mod mqtt;
