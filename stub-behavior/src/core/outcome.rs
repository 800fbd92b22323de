//! Terminal outcome of an invocation, computed after callback dispatch.

use crate::core::record::BehaviorRecord;
use crate::core::value::Value;
use crate::error::{BehaviorError, BehaviorResult};

/// Resolve what the invocation returns or throws.
///
/// Precedence: configured exception, then returned argument, then `this`,
/// then the configured return value (undefined when none was set).
pub fn resolve_outcome(
    record: &BehaviorRecord,
    this: &Value,
    args: &[Value],
) -> BehaviorResult<Value> {
    if let Some(exception) = &record.exception {
        return Err(BehaviorError::Thrown(exception.clone()));
    }
    if let Some(index) = record.return_arg_at {
        return Ok(args.get(index).cloned().unwrap_or_default());
    }
    if record.return_this {
        return Ok(this.clone());
    }
    Ok(record.return_value.clone())
}
