//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file, fills in
//! defaults, validates it, and builds the runtime objects (action table,
//! IRCC catalog, debounce settings) the application layer consumes.

pub mod config;
