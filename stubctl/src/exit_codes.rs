//! Stable exit codes for `stubctl`.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid scenario, invalid config, or any other error.
pub const INVALID: i32 = 1;
/// `stubctl run` replayed the scenario but deferred work raised unhandled errors.
pub const UNHANDLED: i32 = 2;
