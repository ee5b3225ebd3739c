pub mod errors;

pub use errors::{
    AmqpErrorCondition, AmqpException, ConfigError, DispatchError, ErrorContext, HandlerError,
    HandlerResult,
};
