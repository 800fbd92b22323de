//! Deterministic, pure logic shared by the behavior engine.
//!
//! Core modules are free of scheduling and I/O side effects. They operate on
//! in-memory records and values and return deterministic outputs suitable for
//! tests.

pub mod locator;
pub mod outcome;
pub mod print;
pub mod record;
pub mod value;
