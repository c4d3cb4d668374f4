//! Audio infrastructure: spawning the external player process.

pub mod process;
