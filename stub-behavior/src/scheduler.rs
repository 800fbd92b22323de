//! `Scheduler` — single-threaded, virtual-time cooperative event loop.
//!
//! Deferred callback dispatch needs two kinds of suspension: "after the
//! current turn" (next tick) and "after a fixed delay" (timer). Both are
//! queued here instead of on a real clock, so tests decide exactly when
//! deferred work runs by draining microtasks or advancing virtual time.
//!
//! Timers live in a `BTreeMap` keyed by `(deadline, sequence)`: the earliest
//! deadline fires first and ties fire in scheduling order. Every timer is
//! followed by a full microtask drain, matching the usual event-loop rule that
//! continuations queued by a task run before the next timer.
//!
//! A task that fails stops the run. The error is returned to whoever drove the
//! loop, which is how an "unhandled error in a later turn" becomes observable.
//! Tasks still queued stay queued. Nothing is ever cancelled.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::BehaviorResult;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() -> BehaviorResult<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    due: Duration,
    seq: u64,
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    microtasks: VecDeque<Task>,
    timers: BTreeMap<TimerKey, Task>,
    next_seq: u64,
}

/// Cheap-to-clone handle to a shared event loop.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time, measured from scheduler creation.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Queue `task` to run after the current turn.
    pub fn next_tick(&self, task: impl FnOnce() -> BehaviorResult<()> + 'static) {
        let mut state = self.state.borrow_mut();
        state.microtasks.push_back(Box::new(task));
        trace!(queued = state.microtasks.len(), "next tick scheduled");
    }

    /// Queue `task` to run once virtual time has advanced by `delay`.
    pub fn set_timeout(
        &self,
        delay: Duration,
        task: impl FnOnce() -> BehaviorResult<()> + 'static,
    ) {
        let mut state = self.state.borrow_mut();
        let key = TimerKey {
            due: state.now + delay,
            seq: state.next_seq,
        };
        state.next_seq += 1;
        state.timers.insert(key, Box::new(task));
        debug!(
            delay_ms = delay.as_millis() as u64,
            due_ms = key.due.as_millis() as u64,
            "timer scheduled"
        );
    }

    /// Number of queued microtasks and timers.
    pub fn pending(&self) -> usize {
        let state = self.state.borrow();
        state.microtasks.len() + state.timers.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Deadline of the earliest queued timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.borrow().timers.keys().next().map(|key| key.due)
    }

    /// Run queued microtasks, including any queued while draining.
    ///
    /// Returns how many tasks ran.
    pub fn run_microtasks(&self) -> BehaviorResult<usize> {
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().microtasks.pop_front();
            let Some(task) = next else {
                return Ok(ran);
            };
            ran += 1;
            if let Err(err) = task() {
                warn!(error = %err, "unhandled error in next-tick task");
                return Err(err);
            }
        }
    }

    /// Advance virtual time by `by`, firing every timer that falls due.
    pub fn advance(&self, by: Duration) -> BehaviorResult<()> {
        self.run_microtasks()?;
        let target = self.now() + by;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state.timers.first_key_value().map(|(key, _)| key.due);
                match due {
                    Some(due) if due <= target => {
                        state.now = due;
                        state.timers.pop_first()
                    }
                    _ => None,
                }
            };
            let Some((key, task)) = next else {
                break;
            };
            trace!(due_ms = key.due.as_millis() as u64, "timer fired");
            if let Err(err) = task() {
                warn!(
                    error = %err,
                    due_ms = key.due.as_millis() as u64,
                    "unhandled error in timer task"
                );
                return Err(err);
            }
            self.run_microtasks()?;
        }
        self.state.borrow_mut().now = target;
        Ok(())
    }

    /// Run until both queues are empty, jumping virtual time to each deadline.
    pub fn run_until_idle(&self) -> BehaviorResult<()> {
        loop {
            self.run_microtasks()?;
            let Some(due) = self.next_deadline() else {
                return Ok(());
            };
            let by = due.saturating_sub(self.now());
            self.advance(by)?;
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Scheduler")
                .field("now", &state.now)
                .field("microtasks", &state.microtasks.len())
                .field("timers", &state.timers.len())
                .finish(),
            Err(_) => f.debug_struct("Scheduler").finish_non_exhaustive(),
        }
    }
}
