//! Fluent behavior handle: the builder API and the invocation entry point.
//!
//! A [`Behavior`] is a cheap handle to one [`BehaviorRecord`] plus the
//! [`Sequencer`] that owns it. Builders mutate the record in place and return
//! the handle, so configuration chains read left to right:
//!
//! ```ignore
//! stub.behavior()
//!     .yields(vec![Value::Null, "test file".into()])
//!     .set_before_callback_hook(hook, None)?
//!     .yields_before_callback_hook(Value::Null, vec!["hook invoked".into()])?;
//! ```
//!
//! No borrow of the record is held while user code (callbacks, hooks) runs,
//! so a callback may invoke or reconfigure the same double.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::instrument;

use crate::core::outcome::resolve_outcome;
use crate::core::record::{
    BehaviorRecord, CallbackConfig, CallbackTarget, HookInvocation, HookOptions,
    InterceptionHook, IntoArgIndex,
};
use crate::core::value::{PropertyKey, Value};
use crate::dispatch::dispatch_callback;
use crate::error::{BehaviorError, BehaviorResult};
use crate::scheduler::Scheduler;

const WITH_ARGS_AFTER_ON_CALL: &str = "Defining a stub by invoking \
     \"stub.on_call(...).with_args(...)\" is not supported. \
     Use \"stub.with_args(...).on_call(...)\" to define sequential behavior \
     for calls with certain arguments.";

/// The owning double, seen from one of its behaviors.
pub trait Sequencer {
    /// Name used in failure messages.
    fn display_name(&self) -> String;

    /// Event loop that deferred dispatches are queued on.
    fn scheduler(&self) -> Scheduler;

    /// Record scoped to the call with this zero-based index, allocated on first use.
    fn call_slot(&self, index: usize) -> Rc<RefCell<BehaviorRecord>>;

    /// Options a hook registration falls back to for fields it leaves unset.
    fn hook_defaults(&self) -> HookOptions {
        HookOptions::default()
    }
}

/// Handle to a behavior record bound to its owning double.
#[derive(Clone)]
pub struct Behavior {
    pub(crate) record: Rc<RefCell<BehaviorRecord>>,
    pub(crate) owner: Rc<dyn Sequencer>,
}

/// Generates each callback builder together with its `_async` twin.
///
/// Both methods share one body producing a [`CallbackConfig`]; the twin only
/// differs in marking the dispatch as deferred. The table of generated names
/// is exported as [`CALLBACK_BUILDERS`].
macro_rules! callback_builders {
    (
        $(
            $(#[$meta:meta])*
            fn $name:ident / $async_name:ident ($($arg:ident: $ty:ty),*) -> $kind:ident $body:block
        )*
        $(paired $sync:ident / $deferred:ident;)*
    ) => {
        impl Behavior {
            $(
                callback_builders!(
                    @builder $kind,
                    [$(#[$meta])*],
                    $name, false, ($($arg: $ty),*), $body
                );
                callback_builders!(
                    @builder $kind,
                    [#[doc = concat!(
                        "Same as [`Behavior::", stringify!($name),
                        "`], but the callback runs on the next scheduler tick."
                    )]],
                    $async_name, true, ($($arg: $ty),*), $body
                );
            )*
        }

        /// Every callback builder paired with its deferred form, as `(sync, async)`.
        pub const CALLBACK_BUILDERS: &[(&str, &str)] = &[
            $((stringify!($name), stringify!($async_name)),)*
            $((stringify!($sync), stringify!($deferred)),)*
        ];
    };
    (
        @builder fallible, [$(#[$attr:meta])*], $name:ident, $deferred:expr,
        ($($arg:ident: $ty:ty),*), $body:block
    ) => {
        $(#[$attr])*
        pub fn $name(&self, $($arg: $ty),*) -> BehaviorResult<Self> {
            let config: CallbackConfig = $body;
            Ok(self.configure_callback(config, $deferred))
        }
    };
    (
        @builder infallible, [$(#[$attr:meta])*], $name:ident, $deferred:expr,
        ($($arg:ident: $ty:ty),*), $body:block
    ) => {
        $(#[$attr])*
        pub fn $name(&self, $($arg: $ty),*) -> Self {
            let config: CallbackConfig = $body;
            self.configure_callback(config, $deferred)
        }
    };
}

callback_builders! {
    /// Call the argument at `index` with no arguments.
    fn calls_arg / calls_arg_async (index: impl IntoArgIndex) -> fallible {
        CallbackConfig::new(CallbackTarget::Index(index.into_arg_index()?))
    }

    /// Call the argument at `index` with `context` as `this`.
    fn calls_arg_on / calls_arg_on_async (
        index: impl IntoArgIndex,
        context: impl Into<Value>
    ) -> fallible {
        CallbackConfig::new(CallbackTarget::Index(index.into_arg_index()?)).on(context)
    }

    /// Call the argument at `index` with `args`.
    fn calls_arg_with / calls_arg_with_async (
        index: impl IntoArgIndex,
        args: Vec<Value>
    ) -> fallible {
        CallbackConfig::new(CallbackTarget::Index(index.into_arg_index()?)).with_arguments(args)
    }

    fn calls_arg_on_with / calls_arg_on_with_async (
        index: impl IntoArgIndex,
        context: impl Into<Value>,
        args: Vec<Value>
    ) -> fallible {
        CallbackConfig::new(CallbackTarget::Index(index.into_arg_index()?))
            .on(context)
            .with_arguments(args)
    }

    /// Call the leftmost callable argument with `args`.
    fn yields / yields_async (args: Vec<Value>) -> infallible {
        CallbackConfig::new(CallbackTarget::Leftmost).with_arguments(args)
    }

    /// Call the rightmost callable argument with `args`.
    fn yields_right / yields_right_async (args: Vec<Value>) -> infallible {
        CallbackConfig::new(CallbackTarget::Rightmost).with_arguments(args)
    }

    fn yields_on / yields_on_async (context: impl Into<Value>, args: Vec<Value>) -> infallible {
        CallbackConfig::new(CallbackTarget::Leftmost).on(context).with_arguments(args)
    }

    /// Call the `property` member of the first argument that has a callable one.
    fn yields_to / yields_to_async (
        property: impl Into<PropertyKey>,
        args: Vec<Value>
    ) -> infallible {
        CallbackConfig::new(CallbackTarget::Leftmost)
            .to_property(property)
            .with_arguments(args)
    }

    fn yields_to_on / yields_to_on_async (
        property: impl Into<PropertyKey>,
        context: impl Into<Value>,
        args: Vec<Value>
    ) -> infallible {
        CallbackConfig::new(CallbackTarget::Leftmost)
            .to_property(property)
            .on(context)
            .with_arguments(args)
    }

    paired yields_before_callback_hook / yields_before_callback_hook_async;
}

impl Behavior {
    /// A fresh, empty behavior bound to `owner`.
    pub fn create(owner: Rc<dyn Sequencer>) -> Self {
        Self::attach(owner, Rc::new(RefCell::new(BehaviorRecord::default())))
    }

    pub(crate) fn attach(owner: Rc<dyn Sequencer>, record: Rc<RefCell<BehaviorRecord>>) -> Self {
        Self { record, owner }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> BehaviorRecord {
        self.record.borrow().clone()
    }

    pub fn is_present(&self) -> bool {
        self.record.borrow().is_present()
    }

    /// True when both handles point at the same record.
    pub fn same_record(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.record, &other.record)
    }

    fn update(&self, apply: impl FnOnce(&mut BehaviorRecord)) -> Self {
        apply(&mut self.record.borrow_mut());
        self.clone()
    }

    fn configure_callback(&self, config: CallbackConfig, deferred: bool) -> Self {
        self.update(|record| record.set_callback(config, deferred))
    }

    /// Throw `error` on invocation.
    ///
    /// A string names a new error with an empty message; a falsy value throws
    /// a generic error; anything else is thrown as given.
    pub fn throws(&self, error: impl Into<Value>) -> Self {
        let error = error.into();
        self.update(|record| record.set_exception(error, None))
    }

    /// Throw a new error named `name` carrying `message`.
    pub fn throws_with_message(&self, name: &str, message: &str) -> Self {
        self.update(|record| record.set_exception(Value::from(name), Some(message)))
    }

    pub fn throws_exception(&self, error: impl Into<Value>) -> Self {
        self.throws(error)
    }

    /// Return `value`, clearing any configured exception.
    pub fn returns(&self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.update(|record| record.set_return_value(value))
    }

    /// Return the argument at `index` (undefined when the call has fewer arguments).
    pub fn returns_arg(&self, index: impl IntoArgIndex) -> BehaviorResult<Self> {
        let index = index.into_arg_index()?;
        Ok(self.update(|record| record.return_arg_at = Some(index)))
    }

    /// Return the invocation's `this`.
    pub fn returns_this(&self) -> Self {
        self.update(|record| record.return_this = true)
    }

    /// Register a hook that runs before the callback is dispatched.
    ///
    /// Fields left unset in `options` take the owner's defaults. Registering
    /// replaces any earlier hook and disarms it until
    /// [`Behavior::yields_before_callback_hook`].
    pub fn set_before_callback_hook(
        &self,
        hook: impl Into<Value>,
        options: Option<HookOptions>,
    ) -> BehaviorResult<Self> {
        let Value::Function(function) = hook.into() else {
            return Err(BehaviorError::invalid_argument("hook must be a function"));
        };
        let defaults = self.owner.hook_defaults();
        let options = options.map_or(defaults, |options| options.merged_over(defaults));
        Ok(self.update(|record| {
            record.hook = Some(InterceptionHook {
                function,
                options,
                armed: None,
            });
        }))
    }

    /// Arm the registered hook with its own `this` and arguments.
    ///
    /// A falsy `context` makes the hook run with this behavior as `this`. The
    /// hook fires on the next invocation that dispatches a callback.
    pub fn yields_before_callback_hook(
        &self,
        context: impl Into<Value>,
        args: Vec<Value>,
    ) -> BehaviorResult<Self> {
        let context = context.into();
        let mut record = self.record.borrow_mut();
        let Some(hook) = record.hook.as_mut() else {
            return Err(BehaviorError::invalid_argument(
                "cannot arm a before-callback hook that was never registered",
            ));
        };
        hook.armed = Some(HookInvocation {
            context: context.is_truthy().then_some(context),
            arguments: args,
        });
        drop(record);
        Ok(self.clone())
    }

    /// Same as [`Behavior::yields_before_callback_hook`], but the callback
    /// runs on the next scheduler tick, which skips the hook.
    pub fn yields_before_callback_hook_async(
        &self,
        context: impl Into<Value>,
        args: Vec<Value>,
    ) -> BehaviorResult<Self> {
        let behavior = self.yields_before_callback_hook(context, args)?;
        Ok(behavior.update(|record| record.callback_async = true))
    }

    /// Behavior for the call with this zero-based index.
    pub fn on_call(&self, index: usize) -> Self {
        Self::attach(Rc::clone(&self.owner), self.owner.call_slot(index))
    }

    pub fn on_first_call(&self) -> Self {
        self.on_call(0)
    }

    pub fn on_second_call(&self) -> Self {
        self.on_call(1)
    }

    pub fn on_third_call(&self) -> Self {
        self.on_call(2)
    }

    /// Argument filters must be declared before call indexes, never after.
    pub fn with_args(&self, _args: &[Value]) -> BehaviorResult<Self> {
        Err(BehaviorError::Configuration(WITH_ARGS_AFTER_ON_CALL.to_string()))
    }

    /// Run this behavior for one invocation: dispatch the callback, then
    /// return or throw.
    #[instrument(skip_all, fields(double = %self.owner.display_name(), args = args.len()))]
    pub fn invoke(&self, this: &Value, args: &[Value]) -> BehaviorResult<Value> {
        dispatch_callback(self, args)?;
        let record = self.record.borrow();
        resolve_outcome(&record, this, args)
    }

    pub(crate) fn display_name(&self) -> String {
        self.owner.display_name()
    }

    /// This behavior as an opaque `this` value for hooks.
    pub(crate) fn as_host_value(&self) -> Value {
        Value::host(self.clone())
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Behavior");
        debug.field("owner", &self.owner.display_name());
        match self.record.try_borrow() {
            Ok(record) => debug.field("record", &*record).finish(),
            Err(_) => debug.finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::core::record::HookMode;
    use crate::core::value::Function;

    /// Owner with lazily allocated call slots and no default fallback.
    #[derive(Default)]
    struct SlotOwner {
        slots: RefCell<BTreeMap<usize, Rc<RefCell<BehaviorRecord>>>>,
        scheduler: Scheduler,
    }

    impl Sequencer for SlotOwner {
        fn display_name(&self) -> String {
            "owner".to_string()
        }

        fn scheduler(&self) -> Scheduler {
            self.scheduler.clone()
        }

        fn call_slot(&self, index: usize) -> Rc<RefCell<BehaviorRecord>> {
            Rc::clone(self.slots.borrow_mut().entry(index).or_default())
        }

        fn hook_defaults(&self) -> HookOptions {
            HookOptions::default().with_timeout(Duration::from_millis(5))
        }
    }

    fn behavior() -> Behavior {
        Behavior::create(Rc::new(SlotOwner::default()))
    }

    fn noop() -> Value {
        Function::new(|_, _| Ok(Value::Undefined)).into()
    }

    #[test]
    fn every_callback_builder_has_a_deferred_twin() {
        let sync: Vec<_> = CALLBACK_BUILDERS.iter().map(|(name, _)| *name).collect();
        let deferred: Vec<_> = CALLBACK_BUILDERS.iter().map(|(_, name)| *name).collect();

        assert_eq!(sync.len(), deferred.len());
        assert_eq!(sync.len(), 10);
        for (name, twin) in CALLBACK_BUILDERS {
            assert!(name.starts_with("calls_arg") || name.starts_with("yields"), "{name}");
            assert_eq!(*twin, format!("{name}_async"));
        }
    }

    #[test]
    fn async_variant_sets_flag_and_sync_variant_clears_it() {
        let behavior = behavior();
        behavior.calls_arg_async(1).expect("index");
        assert!(behavior.snapshot().callback_async);
        behavior.calls_arg(1).expect("index");
        assert!(!behavior.snapshot().callback_async);
    }

    #[test]
    fn callback_builders_reset_property_and_context() {
        let behavior = behavior();
        behavior.yields_to_on("success", "ctx", vec![Value::from(1)]);
        behavior.calls_arg_with(0, vec![Value::from(2)]).expect("index");

        let record = behavior.snapshot();
        assert_eq!(record.call_arg_at, Some(CallbackTarget::Index(0)));
        assert!(record.call_arg_prop.is_none());
        assert!(record.callback_context.is_none());
        assert_eq!(record.callback_arguments, vec![Value::from(2)]);
    }

    #[test]
    fn non_integer_index_is_rejected() {
        let behavior = behavior();
        let err = behavior.calls_arg(0.5).unwrap_err();
        assert!(matches!(err, BehaviorError::InvalidArgument(_)));
        assert!(behavior.returns_arg(&Value::from("0")).is_err());
        assert!(!behavior.is_present());
    }

    #[test]
    fn hook_registration_requires_a_function_and_uses_owner_defaults() {
        let behavior = behavior();
        let err = behavior.set_before_callback_hook(Value::from(1), None).unwrap_err();
        assert_eq!(err.to_string(), "hook must be a function");

        behavior.set_before_callback_hook(noop(), None).expect("register");
        let hook = behavior.snapshot().hook.expect("hook");
        assert_eq!(hook.options.timeout, Some(Duration::from_millis(5)));
        assert!(hook.armed.is_none());
    }

    #[test]
    fn arming_requires_registration_and_defaults_context() {
        let behavior = behavior();
        let err = behavior
            .yields_before_callback_hook(Value::Null, Vec::new())
            .unwrap_err();
        assert!(matches!(err, BehaviorError::InvalidArgument(_)));

        behavior
            .set_before_callback_hook(noop(), None)
            .and_then(|b| b.yields_before_callback_hook(Value::Null, vec!["x".into()]))
            .expect("arm");
        let armed = behavior.snapshot().hook.and_then(|hook| hook.armed).expect("armed");
        assert!(armed.context.is_none());
        assert_eq!(armed.arguments, vec![Value::from("x")]);
    }

    #[test]
    fn deferred_hook_arming_marks_the_callback_async() {
        let behavior = behavior();
        let err = behavior
            .yields_before_callback_hook_async(Value::Null, Vec::new())
            .unwrap_err();
        assert!(matches!(err, BehaviorError::InvalidArgument(_)));

        behavior
            .yields(Vec::new())
            .set_before_callback_hook(noop(), None)
            .and_then(|b| b.yields_before_callback_hook_async(Value::Null, vec!["x".into()]))
            .expect("arm");
        let record = behavior.snapshot();
        assert!(record.callback_async);
        let armed = record.hook.and_then(|hook| hook.armed).expect("armed");
        assert_eq!(armed.arguments, vec![Value::from("x")]);
    }

    #[test]
    fn caller_hook_options_are_layered_over_owner_defaults() {
        let behavior = behavior();
        behavior
            .set_before_callback_hook(noop(), Some(HookOptions::default().promisified()))
            .expect("register");
        let options = behavior.snapshot().hook.expect("hook").options;
        assert_eq!(options.mode(), HookMode::Promised);
        assert_eq!(options.timeout, Some(Duration::from_millis(5)));

        let immediate = HookOptions::default().with_timeout(Duration::ZERO);
        behavior
            .set_before_callback_hook(noop(), Some(immediate))
            .expect("register");
        let options = behavior.snapshot().hook.expect("hook").options;
        assert_eq!(options.mode(), HookMode::Synchronous);
        assert_eq!(options.delay(), None);
    }

    #[test]
    fn on_call_returns_independent_slots() {
        let behavior = behavior();
        let first = behavior.on_first_call().returns(1);
        let again = behavior.on_call(0);
        let second = behavior.on_second_call();

        assert!(first.same_record(&again));
        assert!(!first.same_record(&second));
        assert!(!behavior.same_record(&first));
        assert!(first.is_present());
        assert!(!second.is_present());
    }

    #[test]
    fn with_args_after_on_call_is_a_configuration_error() {
        let err = behavior().on_call(1).with_args(&[Value::from(1)]).unwrap_err();
        assert!(matches!(err, BehaviorError::Configuration(_)));
        assert!(err.to_string().contains("with_args(...).on_call(...)"));
    }
}
