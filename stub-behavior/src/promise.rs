//! Single-assignment future value driven by a [`Scheduler`].
//!
//! A promise settles at most once. Continuations registered with
//! [`Promise::then`] always run as scheduler microtasks, never inline, whether
//! they were registered before or after settlement.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::core::value::Value;
use crate::error::BehaviorResult;
use crate::scheduler::Scheduler;

/// Outcome delivered to a continuation: the fulfillment value or the rejection reason.
pub type Settled = Result<Value, Value>;

type Reaction = Box<dyn FnOnce(Settled) -> BehaviorResult<()>>;

/// Observable state of a promise.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
        }
    }
}

struct PromiseInner {
    state: PromiseState,
    reactions: Vec<Reaction>,
}

#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<PromiseInner>>,
    scheduler: Scheduler,
}

impl Promise {
    /// A pending promise whose continuations run on `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PromiseInner {
                state: PromiseState::Pending,
                reactions: Vec::new(),
            })),
            scheduler: scheduler.clone(),
        }
    }

    pub fn resolved(scheduler: &Scheduler, value: impl Into<Value>) -> Self {
        let promise = Self::new(scheduler);
        promise.resolve(value);
        promise
    }

    pub fn rejected(scheduler: &Scheduler, reason: impl Into<Value>) -> Self {
        let promise = Self::new(scheduler);
        promise.reject(reason);
        promise
    }

    pub fn state(&self) -> PromiseState {
        self.inner.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Pending)
    }

    /// Fulfill with `value`. Resolving with another promise adopts its outcome.
    pub fn resolve(&self, value: impl Into<Value>) {
        match value.into() {
            Value::Promise(other) if !other.ptr_eq(self) => {
                let this = self.clone();
                other.then(move |settled| {
                    match settled {
                        Ok(value) => this.resolve(value),
                        Err(reason) => this.reject(reason),
                    }
                    Ok(())
                });
            }
            value => self.settle(PromiseState::Fulfilled(value)),
        }
    }

    pub fn reject(&self, reason: impl Into<Value>) {
        self.settle(PromiseState::Rejected(reason.into()));
    }

    /// Register a continuation. It runs as a microtask once the promise settles.
    pub fn then(&self, reaction: impl FnOnce(Settled) -> BehaviorResult<()> + 'static) {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            let settled = match &inner.state {
                PromiseState::Pending => None,
                PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
                PromiseState::Rejected(reason) => Some(Err(reason.clone())),
            };
            match settled {
                Some(settled) => settled,
                None => {
                    inner.reactions.push(Box::new(reaction));
                    return;
                }
            }
        };
        self.scheduler.next_tick(move || reaction(settled));
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn settle(&self, state: PromiseState) {
        let (settled, reactions) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, PromiseState::Pending) {
                return;
            }
            let settled = match &state {
                PromiseState::Fulfilled(value) => Ok(value.clone()),
                PromiseState::Rejected(reason) => Err(reason.clone()),
                PromiseState::Pending => return,
            };
            debug!(state = state.label(), reactions = inner.reactions.len(), "promise settled");
            inner.state = state;
            (settled, std::mem::take(&mut inner.reactions))
        };
        for reaction in reactions {
            let settled = settled.clone();
            self.scheduler.next_tick(move || reaction(settled));
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => write!(f, "Promise({})", inner.state.label()),
            Err(_) => write!(f, "Promise(..)"),
        }
    }
}
