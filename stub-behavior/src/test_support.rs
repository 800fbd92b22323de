//! Test-only helpers: recording callbacks and on-disk fixtures.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use crate::core::value::{ErrorObject, Function, Value};
use crate::error::BehaviorError;
use crate::scheduler::Scheduler;

/// One observed invocation of a recording callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub this: Value,
    pub args: Vec<Value>,
    /// Virtual time of the call, when the recorder tracks a scheduler.
    pub at: Option<std::time::Duration>,
}

/// A callback value that records every invocation.
#[derive(Debug, Clone)]
pub struct Recorder {
    function: Function,
    calls: Rc<RefCell<Vec<RecordedCall>>>,
}

impl Recorder {
    pub fn new(name: &str) -> Self {
        Self::build(name, None)
    }

    /// Records the scheduler's virtual time with every call.
    pub fn timed(name: &str, scheduler: &Scheduler) -> Self {
        Self::build(name, Some(scheduler.clone()))
    }

    fn build(name: &str, scheduler: Option<Scheduler>) -> Self {
        let calls: Rc<RefCell<Vec<RecordedCall>>> = Rc::default();
        let sink = Rc::clone(&calls);
        let function = Function::named(name, move |this, args| {
            sink.borrow_mut().push(RecordedCall {
                this: this.clone(),
                args: args.to_vec(),
                at: scheduler.as_ref().map(Scheduler::now),
            });
            Ok(Value::Undefined)
        });
        Self { function, calls }
    }

    pub fn value(&self) -> Value {
        self.function.clone().into()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn last_args(&self) -> Option<Vec<Value>> {
        self.calls.borrow().last().map(|call| call.args.clone())
    }
}

/// A callback that always throws an error named `name`.
pub fn failing_callback(name: &str, message: &str) -> Value {
    let error = ErrorObject::new(name, message);
    Function::new(move |_, _| Err(BehaviorError::Thrown(error.clone().into()))).into()
}

/// Write `contents` to `file_name` inside a fresh temp dir.
///
/// Keep the returned guard alive for as long as the file is needed.
pub fn temp_file(file_name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(file_name);
    fs::write(&path, contents).expect("write fixture");
    (dir, path)
}
