//! The behavior record: a plain data aggregate describing one configured behavior.
//!
//! Records hold no references to their owner. Every mutation here is a pure
//! operation on the data; the fluent handle in [`crate::behavior`] wraps these
//! operations and adds owner delegation.

use std::time::Duration;

use crate::core::value::{ErrorObject, Function, Object, PropertyKey, Value};
use crate::error::{BehaviorError, BehaviorResult};

/// Which argument is "the callback".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackTarget {
    /// Exactly the argument at this index, callable or not.
    Index(usize),
    /// The first callable argument, scanning left to right.
    Leftmost,
    /// The first callable argument, scanning right to left.
    Rightmost,
}

/// Callback half of a record, produced by the `calls_arg*` and `yields*` builders.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    pub target: CallbackTarget,
    pub property: Option<PropertyKey>,
    pub context: Option<Value>,
    pub arguments: Vec<Value>,
}

impl CallbackConfig {
    pub fn new(target: CallbackTarget) -> Self {
        Self {
            target,
            property: None,
            context: None,
            arguments: Vec::new(),
        }
    }

    pub fn on(mut self, context: impl Into<Value>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn to_property(mut self, property: impl Into<PropertyKey>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Whether a hook returns its injectors directly or through a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookMode {
    #[default]
    Synchronous,
    Promised,
}

/// Options declared when registering a before-callback hook.
///
/// Unset fields are filled from the owner's defaults at registration, see
/// [`HookOptions::merged_over`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookOptions {
    pub mode: Option<HookMode>,
    /// Delay between the hook finishing and the callback firing.
    pub timeout: Option<Duration>,
}

impl HookOptions {
    pub fn promisified(mut self) -> Self {
        self.mode = Some(HookMode::Promised);
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.mode = Some(HookMode::Synchronous);
        self
    }

    /// A zero timeout overrides a default timeout and dispatches immediately.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn mode(&self) -> HookMode {
        self.mode.unwrap_or_default()
    }

    /// Layer these options over `defaults`: every field set here wins.
    pub fn merged_over(self, defaults: HookOptions) -> Self {
        Self {
            mode: self.mode.or(defaults.mode),
            timeout: self.timeout.or(defaults.timeout),
        }
    }

    /// Non-zero timeout, if any. A zero timeout dispatches immediately.
    pub fn delay(&self) -> Option<Duration> {
        self.timeout.filter(|timeout| !timeout.is_zero())
    }
}

/// Arguments the hook is called with once armed.
#[derive(Debug, Clone)]
pub struct HookInvocation {
    /// `None` means the hook runs with the behavior itself as `this`.
    pub context: Option<Value>,
    pub arguments: Vec<Value>,
}

/// A registered before-callback hook.
#[derive(Debug, Clone)]
pub struct InterceptionHook {
    pub function: Function,
    pub options: HookOptions,
    pub armed: Option<HookInvocation>,
}

/// Highest argument position an injector may target.
pub const MAX_INJECTOR_POS: usize = u16::MAX as usize;

/// One positional overwrite produced by a hook: `callback_arguments[pos] = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Injector {
    pub pos: usize,
    pub value: Value,
}

impl Injector {
    pub fn new(pos: usize, value: impl Into<Value>) -> Self {
        Self {
            pos,
            value: value.into(),
        }
    }

    /// Read an injector out of a `{pos, value}` object.
    ///
    /// Anything that is not an object with a numeric `pos` is rejected. A
    /// `pos` that is not a non-negative integer up to [`MAX_INJECTOR_POS`]
    /// names no argument slot and is rejected too. A missing `value` injects
    /// undefined.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Object(object) = value else {
            return None;
        };
        let pos = object.get(&"pos".into())?.as_number()?;
        let in_range = (0.0..=MAX_INJECTOR_POS as f64).contains(&pos);
        if !in_range || pos.fract() != 0.0 {
            return None;
        }
        Some(Self {
            pos: pos as usize,
            value: object.get(&"value".into()).unwrap_or_default(),
        })
    }

    pub fn to_value(&self) -> Value {
        Object::new()
            .with("pos", self.pos)
            .with("value", self.value.clone())
            .into()
    }

    /// The array-of-injectors value a hook returns.
    pub fn list(injectors: impl IntoIterator<Item = Injector>) -> Value {
        Value::array(injectors.into_iter().map(|injector| injector.to_value()))
    }
}

/// Convert a caller-supplied index into a validated argument position.
pub trait IntoArgIndex {
    fn into_arg_index(self) -> BehaviorResult<usize>;
}

impl IntoArgIndex for usize {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        Ok(self)
    }
}

impl IntoArgIndex for u32 {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        Ok(self as usize)
    }
}

impl IntoArgIndex for i32 {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        i64::from(self).into_arg_index()
    }
}

impl IntoArgIndex for i64 {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        usize::try_from(self).map_err(|_| not_an_index(&self.to_string()))
    }
}

impl IntoArgIndex for f64 {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        if self.is_finite() && self >= 0.0 && self.fract() == 0.0 {
            return Ok(self as usize);
        }
        Err(not_an_index(&self.to_string()))
    }
}

impl IntoArgIndex for &Value {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        match self {
            Value::Number(n) => n.into_arg_index(),
            _ => Err(BehaviorError::invalid_argument("argument index is not number")),
        }
    }
}

impl IntoArgIndex for Value {
    fn into_arg_index(self) -> BehaviorResult<usize> {
        (&self).into_arg_index()
    }
}

fn not_an_index(shown: &str) -> BehaviorError {
    BehaviorError::invalid_argument(format!(
        "argument index must be a non-negative integer, got {shown}"
    ))
}

/// Configured outcome for a double or for one of its call slots.
#[derive(Debug, Clone, Default)]
pub struct BehaviorRecord {
    pub exception: Option<Value>,
    pub return_value: Value,
    pub return_value_defined: bool,
    pub return_arg_at: Option<usize>,
    pub return_this: bool,
    pub call_arg_at: Option<CallbackTarget>,
    pub call_arg_prop: Option<PropertyKey>,
    pub callback_arguments: Vec<Value>,
    pub callback_context: Option<Value>,
    pub callback_async: bool,
    pub hook: Option<InterceptionHook>,
}

impl BehaviorRecord {
    /// True once anything that changes an invocation's effect has been configured.
    pub fn is_present(&self) -> bool {
        self.call_arg_at.is_some()
            || self.exception.is_some()
            || self.return_arg_at.is_some()
            || self.return_this
            || self.return_value_defined
    }

    /// Store an exception. Strings name a new error; falsy values mean a generic error.
    pub fn set_exception(&mut self, error: Value, message: Option<&str>) {
        let exception = match error {
            Value::Str(name) => ErrorObject::new(name, message.unwrap_or_default()).into(),
            other if !other.is_truthy() => ErrorObject::generic().into(),
            other => other,
        };
        self.exception = Some(exception);
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = value;
        self.return_value_defined = true;
        self.exception = None;
    }

    /// Replace the callback configuration. Always resets the property and async flag first.
    pub fn set_callback(&mut self, config: CallbackConfig, callback_async: bool) {
        self.call_arg_at = Some(config.target);
        self.call_arg_prop = config.property;
        self.callback_context = config.context;
        self.callback_arguments = config.arguments;
        self.callback_async = callback_async;
    }

    /// Overwrite callback arguments from a hook result.
    ///
    /// Only an array result is considered; malformed entries and positions
    /// past [`MAX_INJECTOR_POS`] are skipped.
    /// Returns how many injectors were applied.
    pub fn apply_injectors(&mut self, result: &Value) -> usize {
        let Value::Array(entries) = result else {
            return 0;
        };
        let mut applied = 0;
        for entry in entries.to_vec() {
            let Some(Injector { pos, value }) = Injector::from_value(&entry) else {
                continue;
            };
            let Some(len) = pos.checked_add(1).filter(|_| pos <= MAX_INJECTOR_POS) else {
                continue;
            };
            if len > self.callback_arguments.len() {
                self.callback_arguments.resize(len, Value::Undefined);
            }
            self.callback_arguments[pos] = value;
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_is_not_present() {
        let mut record = BehaviorRecord::default();
        assert!(!record.is_present());
        record.set_return_value(Value::Undefined);
        assert!(record.is_present());
    }

    #[test]
    fn string_exception_becomes_named_error() {
        let mut record = BehaviorRecord::default();
        record.set_exception(Value::from("TypeError"), None);
        let Some(Value::Error(error)) = record.exception else {
            panic!("expected error value");
        };
        assert_eq!(error.name(), "TypeError");
        assert_eq!(error.message(), "");
    }

    #[test]
    fn falsy_exception_becomes_generic_error() {
        let mut record = BehaviorRecord::default();
        record.set_exception(Value::from(0), None);
        let error = record.exception.as_ref().and_then(Value::as_error).expect("error");
        assert_eq!((error.name(), error.message()), ("Error", "Error"));

        let custom = Value::from(ErrorObject::new("RangeError", "too far"));
        record.set_exception(custom.clone(), Some("ignored"));
        assert_eq!(record.exception, Some(custom));
    }

    #[test]
    fn returning_clears_exception() {
        let mut record = BehaviorRecord::default();
        record.set_exception(Value::Undefined, None);
        record.set_return_value(Value::from(1));
        assert!(record.exception.is_none());
    }

    #[test]
    fn injectors_skip_malformed_entries_and_extend() {
        let mut record = BehaviorRecord {
            callback_arguments: vec![Value::Null, Value::from("test file")],
            ..BehaviorRecord::default()
        };
        let result = Value::array([
            Injector::new(1, "hook invoked").to_value(),
            Value::Null,
            Object::new().with("pos", "1").with("value", "bad").into(),
            Object::new().with("pos", 1.5).into(),
            Injector::new(3, true).to_value(),
        ]);

        assert_eq!(record.apply_injectors(&result), 2);
        assert_eq!(
            record.callback_arguments,
            vec![
                Value::Null,
                Value::from("hook invoked"),
                Value::Undefined,
                Value::Bool(true)
            ]
        );
    }

    #[test]
    fn injectors_beyond_max_position_are_skipped() {
        let mut record = BehaviorRecord {
            callback_arguments: vec![Value::Null],
            ..BehaviorRecord::default()
        };
        let result = Value::array([
            Object::new().with("pos", 1e20).with("value", "x").into(),
            Object::new().with("pos", 1e9).with("value", "x").into(),
            Injector::new(usize::MAX, "x").to_value(),
            Injector::new(MAX_INJECTOR_POS + 1, "x").to_value(),
            Injector::new(2, "kept").to_value(),
        ]);

        assert_eq!(record.apply_injectors(&result), 1);
        assert_eq!(
            record.callback_arguments,
            vec![Value::Null, Value::Undefined, Value::from("kept")]
        );

        let edge = Value::array([Injector::new(MAX_INJECTOR_POS, 1).to_value()]);
        assert_eq!(record.apply_injectors(&edge), 1);
        assert_eq!(record.callback_arguments.len(), MAX_INJECTOR_POS + 1);
    }

    #[test]
    fn caller_hook_options_overlay_defaults() {
        let defaults = HookOptions::default().with_timeout(Duration::from_millis(250));
        let merged = HookOptions::default().promisified().merged_over(defaults);
        assert_eq!(merged.mode(), HookMode::Promised);
        assert_eq!(merged.delay(), Some(Duration::from_millis(250)));

        let promised = HookOptions::default().promisified();
        let forced = HookOptions::default()
            .synchronous()
            .with_timeout(Duration::ZERO)
            .merged_over(promised.with_timeout(Duration::from_millis(5)));
        assert_eq!(forced.mode(), HookMode::Synchronous);
        assert_eq!(forced.delay(), None);
        assert_eq!(HookOptions::default().mode(), HookMode::Synchronous);
    }

    #[test]
    fn non_array_hook_result_is_ignored() {
        let mut record = BehaviorRecord::default();
        let single = Injector::new(0, 1).to_value();
        assert_eq!(record.apply_injectors(&single), 0);
        assert!(record.callback_arguments.is_empty());
    }

    #[test]
    fn arg_index_validation() {
        assert_eq!(2usize.into_arg_index().expect("usize"), 2);
        assert_eq!(3.0f64.into_arg_index().expect("integral float"), 3);
        assert!(1.5f64.into_arg_index().is_err());
        assert!((-1i32).into_arg_index().is_err());
        let err = (&Value::Object(Object::new())).into_arg_index().unwrap_err();
        assert!(matches!(err, BehaviorError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "argument index is not number");
    }
}
