//! Deterministic callback selection among an invocation's arguments.

use crate::core::print::{join_values, value_to_string};
use crate::core::record::CallbackTarget;
use crate::core::value::{PropertyKey, Value};

/// Find the value to treat as the callback.
///
/// An exact index returns whatever sits there (callability is checked by the
/// dispatcher). A scan returns the first callable argument, or with `property`
/// set, the first argument whose named property is callable.
pub fn locate_callback(
    target: CallbackTarget,
    property: Option<&PropertyKey>,
    args: &[Value],
) -> Option<Value> {
    let pick = |arg: &Value| match property {
        None => arg.is_callable().then(|| arg.clone()),
        Some(key) => arg.get_property(key).filter(Value::is_callable),
    };
    match target {
        CallbackTarget::Index(index) => args.get(index).cloned(),
        CallbackTarget::Leftmost => args.iter().find_map(pick),
        CallbackTarget::Rightmost => args.iter().rev().find_map(pick),
    }
}

/// Failure message for a missing or non-callable callback.
pub fn callback_error_message(
    double_name: &str,
    target: CallbackTarget,
    property: Option<&PropertyKey>,
    found: Option<&Value>,
    args: &[Value],
) -> String {
    let CallbackTarget::Index(index) = target else {
        let mut message = match property {
            Some(key) => format!(
                "{double_name} expected to yield to '{key}', \
                 but no object with such a property was passed."
            ),
            None => format!("{double_name} expected to yield, but no callback was passed."),
        };
        if !args.is_empty() {
            message.push_str(&format!(" Received [{}]", join_values(args, ", ")));
        }
        return message;
    };
    let shown = found.map_or_else(|| "undefined".to_string(), value_to_string);
    format!("argument at index {index} is not a function: {shown}")
}
