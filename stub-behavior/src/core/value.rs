//! Dynamic values passed to, and returned from, test doubles.
//!
//! A double can be called with anything, so the engine works over a small
//! dynamic value model. Primitive values compare by content; arrays, objects,
//! functions, errors, promises and host handles compare by identity, which is
//! what `returns_arg` and `returns` promise to callers.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value as JsonValue;

use crate::error::BehaviorResult;
use crate::promise::Promise;

/// Signature of a native callable: `(this, arguments) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> BehaviorResult<Value>;

/// Maximum nesting rendered by [`Value::to_json`]; deeper levels become `null`.
const JSON_DEPTH_LIMIT: usize = 32;

// ---------------------------------------------------------------------------
// Symbols and property keys
// ---------------------------------------------------------------------------

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// A unique property key, distinct from every other symbol even with the same description.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    id: u64,
    description: Option<Rc<str>>,
}

impl Symbol {
    pub fn new(description: Option<&str>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.map(Rc::from),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or_default())
    }
}

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKey {
    String(String),
    Symbol(Symbol),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(symbol) => write!(f, "{symbol}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

// ---------------------------------------------------------------------------
// Reference types
// ---------------------------------------------------------------------------

/// Shared, mutable, ordered list of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Snapshot of the current items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Shared, mutable property bag keyed by strings or symbols.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<PropertyKey, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for constructing literals in one expression.
    pub fn with(self, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<PropertyKey> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A callable value with an optional inferred name.
#[derive(Clone)]
pub struct Function {
    name: Option<Rc<str>>,
    call: Rc<NativeFn>,
}

impl Function {
    pub fn new(call: impl Fn(&Value, &[Value]) -> BehaviorResult<Value> + 'static) -> Self {
        Self {
            name: None,
            call: Rc::new(call),
        }
    }

    pub fn named(
        name: &str,
        call: impl Fn(&Value, &[Value]) -> BehaviorResult<Value> + 'static,
    ) -> Self {
        Self {
            name: Some(Rc::from(name)),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Invoke with an explicit `this` and argument list.
    pub fn call(&self, this: &Value, args: &[Value]) -> BehaviorResult<Value> {
        (self.call)(this, args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

#[derive(Debug)]
struct ErrorData {
    name: String,
    message: String,
}

/// An error object: a name plus a message, compared by identity.
#[derive(Clone)]
pub struct ErrorObject(Rc<ErrorData>);

impl ErrorObject {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self(Rc::new(ErrorData {
            name: name.into(),
            message: message.into(),
        }))
    }

    /// The error produced when nothing more specific was requested.
    pub fn generic() -> Self {
        Self::new("Error", "Error")
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Opaque handle to a host-side Rust value.
#[derive(Clone)]
pub struct HostRef(Rc<dyn Any>);

impl HostRef {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Runtime value flowing through a test double.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Symbol(Symbol),
    Array(Array),
    Object(Object),
    Function(Function),
    Error(ErrorObject),
    Promise(Promise),
    Host(HostRef),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Array::new(items.into_iter().collect()))
    }

    pub fn host<T: Any>(value: T) -> Self {
        Self::Host(HostRef::new(value))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorObject> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Truthiness: undefined, null, false, 0, NaN and "" are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Function(_) => "function",
            Self::Array(_)
            | Self::Object(_)
            | Self::Error(_)
            | Self::Promise(_)
            | Self::Host(_) => "object",
        }
    }

    /// Own property lookup. Only plain objects carry properties.
    pub fn get_property(&self, key: &PropertyKey) -> Option<Value> {
        match self {
            Self::Object(object) => object.get(key),
            _ => None,
        }
    }

    /// Strict equality: content for primitives, identity for references.
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Error(a), Self::Error(b)) => a.ptr_eq(b),
            (Self::Promise(a), Self::Promise(b)) => a.ptr_eq(b),
            (Self::Host(a), Self::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Convert JSON data into a value; JSON has no functions, so none are produced.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map_or(Self::Undefined, Self::Number),
            JsonValue::String(s) => Self::Str(s.clone()),
            JsonValue::Array(items) => Self::array(items.iter().map(Self::from_json)),
            JsonValue::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.set(key.as_str(), Self::from_json(value));
                }
                Self::Object(object)
            }
        }
    }

    /// Render as JSON for reports. Non-data values use `$`-prefixed tags.
    pub fn to_json(&self) -> JsonValue {
        self.to_json_inner(0)
    }

    fn to_json_inner(&self, depth: usize) -> JsonValue {
        if depth > JSON_DEPTH_LIMIT {
            return JsonValue::Null;
        }
        match self {
            Self::Undefined => serde_json::json!({ "$undefined": true }),
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Str(s) => JsonValue::String(s.clone()),
            Self::Symbol(symbol) => serde_json::json!({ "$symbol": symbol.description() }),
            Self::Array(array) => JsonValue::Array(
                array
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(depth + 1))
                    .collect(),
            ),
            Self::Object(object) => {
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    let value = object.get(&key).unwrap_or_default();
                    map.insert(key.to_string(), value.to_json_inner(depth + 1));
                }
                JsonValue::Object(map)
            }
            Self::Function(function) => serde_json::json!({ "$function": function.name() }),
            Self::Error(error) => serde_json::json!({
                "$error": { "name": error.name(), "message": error.message() }
            }),
            Self::Promise(promise) => {
                serde_json::json!({ "$promise": promise.state().label() })
            }
            Self::Host(_) => serde_json::json!({ "$host": true }),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return JsonValue::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DebugValue { value: self, depth: 0 }.fmt(f)
    }
}

/// Debug view of a value that stops descending past `JSON_DEPTH_LIMIT`,
/// so self-referencing containers still format.
struct DebugValue<'a> {
    value: &'a Value,
    depth: usize,
}

impl DebugValue<'_> {
    fn nested(value: &Value, depth: usize) -> DebugValue<'_> {
        DebugValue { value, depth: depth + 1 }
    }
}

impl fmt::Debug for DebugValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self.depth;
        match self.value {
            Value::Array(_) | Value::Object(_) if depth > JSON_DEPTH_LIMIT => write!(f, ".."),
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Symbol(symbol) => write!(f, "{symbol}"),
            Value::Array(array) => {
                let items = array.to_vec();
                f.debug_list()
                    .entries(items.iter().map(|item| DebugValue::nested(item, depth)))
                    .finish()
            }
            Value::Object(object) => {
                let mut map = f.debug_map();
                for key in object.keys() {
                    let item = object.get(&key).unwrap_or_default();
                    map.entry(&key.to_string(), &DebugValue::nested(&item, depth));
                }
                map.finish()
            }
            Value::Function(function) => {
                write!(f, "Function({})", function.name().unwrap_or("anonymous"))
            }
            Value::Error(error) => write!(f, "Error({}: {:?})", error.name(), error.message()),
            Value::Promise(promise) => write!(f, "{promise:?}"),
            Value::Host(_) => write!(f, "Host"),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name().unwrap_or("anonymous"))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<ErrorObject> for Value {
    fn from(error: ErrorObject) -> Self {
        Self::Error(error)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Self::Promise(promise)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}
