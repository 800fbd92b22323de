//! I/O helpers for engine configuration and scenario replay.

pub mod config;
pub mod scenario;
