//! Callback dispatch: locate the callback, run the before-callback hook, fire.
//!
//! Deferred work goes through the owner's [`Scheduler`]. Firing reads the
//! callback's `this` and arguments from the record at fire time, so argument
//! overwrites made by a hook are visible to the callback.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::behavior::Behavior;
use crate::core::locator::{callback_error_message, locate_callback};
use crate::core::print::{function_name, value_to_string};
use crate::core::record::{BehaviorRecord, HookInvocation, HookMode, InterceptionHook};
use crate::core::value::{Function, Value};
use crate::error::{BehaviorError, BehaviorResult};
use crate::scheduler::Scheduler;

type SharedRecord = Rc<RefCell<BehaviorRecord>>;

/// Run the configured callback for one invocation, if any.
///
/// Errors raised synchronously (missing callback, hook failure, callback
/// failure) are returned. Errors from deferred work surface through the
/// scheduler when it runs.
pub(crate) fn dispatch_callback(behavior: &Behavior, args: &[Value]) -> BehaviorResult<()> {
    let (target, property, deferred, hook) = {
        let record = behavior.record.borrow();
        let Some(target) = record.call_arg_at else {
            return Ok(());
        };
        (
            target,
            record.call_arg_prop.clone(),
            record.callback_async,
            record.hook.clone(),
        )
    };

    let found = locate_callback(target, property.as_ref(), args);
    let Some(callback) = found.as_ref().and_then(Value::as_function).cloned() else {
        let message = callback_error_message(
            &behavior.display_name(),
            target,
            property.as_ref(),
            found.as_ref(),
            args,
        );
        warn!(%message, "no callable callback");
        return Err(BehaviorError::Dispatch(message));
    };

    let record = Rc::clone(&behavior.record);
    if deferred {
        debug!(
            callback = %function_name(&callback, "anonymous"),
            "callback deferred to next tick"
        );
        behavior
            .owner
            .scheduler()
            .next_tick(move || fire(&record, &callback));
        return Ok(());
    }

    match hook {
        Some(hook) => intercept(behavior, hook, callback),
        None => fire(&record, &callback),
    }
}

fn intercept(
    behavior: &Behavior,
    hook: InterceptionHook,
    callback: Function,
) -> BehaviorResult<()> {
    let (context, arguments) = match hook.armed {
        Some(HookInvocation { context, arguments }) => (
            context.unwrap_or_else(|| behavior.as_host_value()),
            arguments,
        ),
        None => (Value::Undefined, Vec::new()),
    };
    let scheduler = behavior.owner.scheduler();
    let delay = hook.options.delay();
    debug!(
        hook = %function_name(&hook.function, "anonymous"),
        mode = ?hook.options.mode(),
        ?delay,
        "running before-callback hook"
    );

    let result = hook.function.call(&context, &arguments)?;
    let record = Rc::clone(&behavior.record);
    match hook.options.mode() {
        HookMode::Synchronous => {
            inject(&record, &result);
            schedule_or_fire(&scheduler, delay, record, callback)
        }
        HookMode::Promised => {
            let Value::Promise(promise) = result else {
                return Err(BehaviorError::Dispatch(
                    "result of callback hooked is not a promise".to_string(),
                ));
            };
            let timers = scheduler.clone();
            promise.then(move |settled| match settled {
                Ok(value) => {
                    inject(&record, &value);
                    schedule_or_fire(&timers, delay, record, callback)
                }
                Err(reason) => {
                    warn!(reason = %value_to_string(&reason), "before-callback hook rejected");
                    Err(BehaviorError::Thrown(reason))
                }
            });
            Ok(())
        }
    }
}

fn inject(record: &RefCell<BehaviorRecord>, result: &Value) {
    let applied = record.borrow_mut().apply_injectors(result);
    if applied > 0 {
        debug!(applied, "hook overwrote callback arguments");
    }
}

fn schedule_or_fire(
    scheduler: &Scheduler,
    delay: Option<Duration>,
    record: SharedRecord,
    callback: Function,
) -> BehaviorResult<()> {
    match delay {
        Some(delay) => {
            scheduler.set_timeout(delay, move || fire(&record, &callback));
            Ok(())
        }
        None => fire(&record, &callback),
    }
}

fn fire(record: &RefCell<BehaviorRecord>, callback: &Function) -> BehaviorResult<()> {
    let (context, arguments) = {
        let record = record.borrow();
        (
            record.callback_context.clone().unwrap_or_default(),
            record.callback_arguments.clone(),
        )
    };
    callback.call(&context, &arguments).map(drop)
}
