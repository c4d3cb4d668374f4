//! Infrastructure layer for the daemon.
//!
//! Contains OS-facing adapters: the evdev input source, the external audio
//! player process, the IRCC HTTP client, the MQTT bus, and configuration
//! file loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keybridge_core`.  The application layer only sees it through the traits
//! it declares (`EventSource`, `DeviceProvider`) and the traits declared in
//! `application` itself.

pub mod audio;
pub mod input_capture;
pub mod network;
pub mod storage;
