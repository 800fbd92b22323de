//! Configurable behavior engine for stub test doubles.
//!
//! A stub's behavior decides, per invocation, whether to throw, what to
//! return, and whether and how to invoke a callback found among the
//! arguments. A before-callback hook can run first, overwrite the callback's
//! arguments, and delay the callback by a timeout or until a promise settles.
//!
//! - **[`core`]**: Pure, deterministic logic (values, records, callback
//!   location, outcomes). No scheduling, no I/O.
//! - **[`scheduler`]** and **[`promise`]**: a single-threaded virtual-time
//!   event loop for deferred dispatch.
//! - **[`behavior`]**, **`dispatch`** and **[`double`]**: the fluent
//!   configuration API, the dispatch pipeline and the stub that sequences
//!   behaviors across calls.
//! - **[`io`]**: TOML configuration and JSON scenario replay for `stubctl`.

pub mod behavior;
pub mod core;
mod dispatch;
pub mod double;
pub mod error;
pub mod io;
pub mod logging;
pub mod promise;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use behavior::{Behavior, CALLBACK_BUILDERS, Sequencer};
pub use crate::core::record::{
    BehaviorRecord, CallbackTarget, HookMode, HookOptions, Injector, MAX_INJECTOR_POS,
};
pub use crate::core::value::{Array, ErrorObject, Function, Object, PropertyKey, Symbol, Value};
pub use double::Stub;
pub use error::{BehaviorError, BehaviorResult};
pub use promise::{Promise, PromiseState};
pub use scheduler::Scheduler;
