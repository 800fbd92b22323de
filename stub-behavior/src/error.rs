use thiserror::Error;

use crate::core::print::value_to_string;
use crate::core::value::{ErrorObject, Value};

/// Everything a behavior can fail with.
///
/// Configuration errors surface while a double is being set up. Dispatch
/// errors surface when an invocation cannot find or use its callback. A
/// `Thrown` value is a user error passing through untouched: a configured
/// exception, an error raised by a callback or hook, or a rejected hook promise.
#[derive(Debug, Clone, Error)]
pub enum BehaviorError {
    /// A builder received a malformed argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// Builder operations were combined in an unsupported order.
    #[error("{0}")]
    Configuration(String),

    /// The selected callback is not callable, or a hook broke its contract.
    #[error("{0}")]
    Dispatch(String),

    #[error("{}", value_to_string(.0))]
    Thrown(Value),
}

impl BehaviorError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The value a caller observes as "the error", as a dynamic value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Thrown(value) => value.clone(),
            Self::InvalidArgument(message) | Self::Dispatch(message) => {
                ErrorObject::new("TypeError", message.as_str()).into()
            }
            Self::Configuration(message) => {
                ErrorObject::new("Error", message.as_str()).into()
            }
        }
    }
}

pub type BehaviorResult<T> = Result<T, BehaviorError>;
