//! A minimal test double that sequences behaviors across calls.
//!
//! A [`Stub`] owns a default behavior record and lazily allocated per-call
//! records. Each invocation counts as one call; the per-call record for that
//! call index is used when configured, otherwise the default one.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::behavior::{Behavior, Sequencer};
use crate::core::print::DEFAULT_DOUBLE_NAME;
use crate::core::record::{BehaviorRecord, HookOptions};
use crate::core::value::{Function, Value};
use crate::error::BehaviorResult;
use crate::io::config::EngineConfig;
use crate::scheduler::Scheduler;

type SharedRecord = Rc<RefCell<BehaviorRecord>>;

/// Behavior storage shared by a stub and every handle it hands out.
struct CallTable {
    name: String,
    scheduler: Scheduler,
    hook_defaults: HookOptions,
    default: RefCell<SharedRecord>,
    per_call: RefCell<BTreeMap<usize, SharedRecord>>,
    call_count: Cell<usize>,
}

impl CallTable {
    /// Record applicable to the call with this index.
    fn select(&self, index: usize) -> SharedRecord {
        let scoped = self
            .per_call
            .borrow()
            .get(&index)
            .filter(|record| record.borrow().is_present())
            .map(Rc::clone);
        scoped.unwrap_or_else(|| Rc::clone(&self.default.borrow()))
    }
}

impl Sequencer for CallTable {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    fn call_slot(&self, index: usize) -> SharedRecord {
        Rc::clone(self.per_call.borrow_mut().entry(index).or_default())
    }

    fn hook_defaults(&self) -> HookOptions {
        self.hook_defaults
    }
}

/// A callable test double.
#[derive(Clone)]
pub struct Stub {
    table: Rc<CallTable>,
}

impl Stub {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self::named(DEFAULT_DOUBLE_NAME, scheduler)
    }

    pub fn named(name: impl Into<String>, scheduler: &Scheduler) -> Self {
        Self::build(name.into(), HookOptions::default(), scheduler)
    }

    /// A stub named and hook-configured from `config`.
    pub fn with_config(config: &EngineConfig, scheduler: &Scheduler) -> Self {
        Self::build(config.double_name.clone(), config.hook_options(), scheduler)
    }

    fn build(name: String, hook_defaults: HookOptions, scheduler: &Scheduler) -> Self {
        Self {
            table: Rc::new(CallTable {
                name,
                scheduler: scheduler.clone(),
                hook_defaults,
                default: RefCell::default(),
                per_call: RefCell::default(),
                call_count: Cell::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn scheduler(&self) -> Scheduler {
        self.table.scheduler.clone()
    }

    fn owner(&self) -> Rc<dyn Sequencer> {
        self.table.clone()
    }

    /// Handle to the default behavior.
    pub fn behavior(&self) -> Behavior {
        Behavior::attach(self.owner(), Rc::clone(&self.table.default.borrow()))
    }

    pub fn on_call(&self, index: usize) -> Behavior {
        self.behavior().on_call(index)
    }

    pub fn on_first_call(&self) -> Behavior {
        self.on_call(0)
    }

    pub fn on_second_call(&self) -> Behavior {
        self.on_call(1)
    }

    pub fn on_third_call(&self) -> Behavior {
        self.on_call(2)
    }

    pub fn call_count(&self) -> usize {
        self.table.call_count.get()
    }

    /// Invoke the stub with an explicit `this`.
    pub fn invoke(&self, this: &Value, args: &[Value]) -> BehaviorResult<Value> {
        let index = self.table.call_count.get();
        self.table.call_count.set(index.saturating_add(1));
        let record = self.table.select(index);
        debug!(double = %self.table.name, call = index, args = args.len(), "stub invoked");
        Behavior::attach(self.owner(), record).invoke(this, args)
    }

    /// Invoke the stub with an undefined `this`.
    pub fn call(&self, args: &[Value]) -> BehaviorResult<Value> {
        self.invoke(&Value::Undefined, args)
    }

    /// Drop every configured behavior and forget past calls.
    ///
    /// Handles obtained before the reset keep pointing at the old records and
    /// no longer affect the stub.
    pub fn reset(&self) {
        *self.table.default.borrow_mut() = SharedRecord::default();
        self.table.per_call.borrow_mut().clear();
        self.table.call_count.set(0);
    }

    /// The stub as a function value, so it can be passed as a callback.
    pub fn as_function(&self) -> Value {
        let stub = self.clone();
        Function::named(&self.table.name, move |this, args| stub.invoke(this, args)).into()
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("name", &self.table.name)
            .field("call_count", &self.call_count())
            .field("scoped_calls", &self.table.per_call.borrow().len())
            .finish()
    }
}
