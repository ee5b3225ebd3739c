use crate::engine::ErrorCondition;
use crate::utils::env::EnvVarError;
use std::fmt;
use thiserror::Error;

/// Well-known AMQP and Service Bus/Event Hubs error condition symbols.
///
/// Conditions arrive on the wire as plain symbols. Mapping them onto this enum
/// lets callers decide whether a failure is worth retrying without string
/// matching on every call site; anything unrecognised maps to [`Unknown`].
///
/// [`Unknown`]: AmqpErrorCondition::Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmqpErrorCondition {
    InternalError,
    NotFound,
    UnauthorizedAccess,
    DecodeError,
    ResourceLimitExceeded,
    NotAllowed,
    InvalidField,
    NotImplemented,
    ResourceLocked,
    PreconditionFailed,
    ResourceDeleted,
    IllegalState,
    FrameSizeTooSmall,
    ConnectionForced,
    ConnectionFramingError,
    ConnectionRedirect,
    SessionWindowViolation,
    SessionErrantLink,
    SessionHandleInUse,
    SessionUnattachedHandle,
    LinkDetachForced,
    LinkTransferLimitExceeded,
    LinkMessageSizeExceeded,
    LinkRedirect,
    LinkStolen,
    ServerBusy,
    Timeout,
    ArgumentError,
    ArgumentOutOfRange,
    EntityDisabled,
    PartitionNotOwned,
    StoreLockLost,
    PublisherRevoked,
    OperationCancelled,
    ProtonIo,
    Unknown,
}

const CONDITION_SYMBOLS: &[(AmqpErrorCondition, &str)] = &[
    (AmqpErrorCondition::InternalError, "amqp:internal-error"),
    (AmqpErrorCondition::NotFound, "amqp:not-found"),
    (AmqpErrorCondition::UnauthorizedAccess, "amqp:unauthorized-access"),
    (AmqpErrorCondition::DecodeError, "amqp:decode-error"),
    (AmqpErrorCondition::ResourceLimitExceeded, "amqp:resource-limit-exceeded"),
    (AmqpErrorCondition::NotAllowed, "amqp:not-allowed"),
    (AmqpErrorCondition::InvalidField, "amqp:invalid-field"),
    (AmqpErrorCondition::NotImplemented, "amqp:not-implemented"),
    (AmqpErrorCondition::ResourceLocked, "amqp:resource-locked"),
    (AmqpErrorCondition::PreconditionFailed, "amqp:precondition-failed"),
    (AmqpErrorCondition::ResourceDeleted, "amqp:resource-deleted"),
    (AmqpErrorCondition::IllegalState, "amqp:illegal-state"),
    (AmqpErrorCondition::FrameSizeTooSmall, "amqp:frame-size-too-small"),
    (AmqpErrorCondition::ConnectionForced, "amqp:connection:forced"),
    (AmqpErrorCondition::ConnectionFramingError, "amqp:connection:framing-error"),
    (AmqpErrorCondition::ConnectionRedirect, "amqp:connection:redirect"),
    (AmqpErrorCondition::SessionWindowViolation, "amqp:session:window-violation"),
    (AmqpErrorCondition::SessionErrantLink, "amqp:session:errant-link"),
    (AmqpErrorCondition::SessionHandleInUse, "amqp:session:handle-in-use"),
    (AmqpErrorCondition::SessionUnattachedHandle, "amqp:session:unattached-handle"),
    (AmqpErrorCondition::LinkDetachForced, "amqp:link:detach-forced"),
    (AmqpErrorCondition::LinkTransferLimitExceeded, "amqp:link:transfer-limit-exceeded"),
    (AmqpErrorCondition::LinkMessageSizeExceeded, "amqp:link:message-size-exceeded"),
    (AmqpErrorCondition::LinkRedirect, "amqp:link:redirect"),
    (AmqpErrorCondition::LinkStolen, "amqp:link:stolen"),
    (AmqpErrorCondition::ServerBusy, "com.microsoft:server-busy"),
    (AmqpErrorCondition::Timeout, "com.microsoft:timeout"),
    (AmqpErrorCondition::ArgumentError, "com.microsoft:argument-error"),
    (AmqpErrorCondition::ArgumentOutOfRange, "com.microsoft:argument-out-of-range"),
    (AmqpErrorCondition::EntityDisabled, "com.microsoft:entity-disabled"),
    (AmqpErrorCondition::PartitionNotOwned, "com.microsoft:partition-not-owned"),
    (AmqpErrorCondition::StoreLockLost, "com.microsoft:store-lock-lost"),
    (AmqpErrorCondition::PublisherRevoked, "com.microsoft:publisher-revoked"),
    (AmqpErrorCondition::OperationCancelled, "com.microsoft:operation-cancelled"),
    (AmqpErrorCondition::ProtonIo, "proton:io"),
];

impl AmqpErrorCondition {
    /// Maps a wire symbol onto a known condition.
    pub fn from_symbol(symbol: &str) -> Self {
        CONDITION_SYMBOLS
            .iter()
            .find(|(_, known)| *known == symbol)
            .map(|(condition, _)| *condition)
            .unwrap_or(AmqpErrorCondition::Unknown)
    }

    /// The wire symbol, or `None` for [`AmqpErrorCondition::Unknown`].
    pub fn symbol(self) -> Option<&'static str> {
        CONDITION_SYMBOLS
            .iter()
            .find(|(condition, _)| *condition == self)
            .map(|(_, symbol)| *symbol)
    }

    /// Whether an operation failing with this condition may succeed on retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            AmqpErrorCondition::ServerBusy
                | AmqpErrorCondition::Timeout
                | AmqpErrorCondition::InternalError
                | AmqpErrorCondition::ConnectionForced
                | AmqpErrorCondition::LinkDetachForced
                | AmqpErrorCondition::ProtonIo
        )
    }
}

/// Exception derived from a protocol error condition.
///
/// Keeps the original symbol alongside the parsed [`AmqpErrorCondition`] so
/// vendor-specific conditions unknown to this crate are not lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description}, condition[{symbol}]")]
pub struct AmqpException {
    pub condition: AmqpErrorCondition,
    pub symbol: String,
    pub description: String,
    pub transient: bool,
}

impl AmqpException {
    pub fn new(condition: AmqpErrorCondition, description: impl Into<String>) -> Self {
        Self {
            condition,
            symbol: condition.symbol().unwrap_or("unknown").to_string(),
            description: description.into(),
            transient: condition.is_transient(),
        }
    }

    /// Builds the exception from a condition's code and description.
    pub fn from_condition(condition: &ErrorCondition) -> Self {
        let parsed = AmqpErrorCondition::from_symbol(&condition.condition);
        let description = condition.description.clone().unwrap_or_else(|| {
            format!("Remote peer closed with condition '{}'", condition.condition)
        });

        Self {
            condition: parsed,
            symbol: condition.condition.clone(),
            description,
            transient: parsed.is_transient(),
        }
    }

    /// The condition to stamp on a local endpoint when closing because of this exception.
    pub fn to_condition(&self) -> ErrorCondition {
        ErrorCondition::new(self.symbol.clone(), self.description.clone())
    }
}

/// A failure observed on an endpoint, published on the handler's error stream.
///
/// Carries the exception, the namespace (remote host) and, for session and
/// link scoped failures, the entity path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub exception: AmqpException,
    pub namespace: String,
    pub entity_path: Option<String>,
}

impl ErrorContext {
    pub fn new(exception: AmqpException, namespace: impl Into<String>) -> Self {
        Self {
            exception,
            namespace: namespace.into(),
            entity_path: None,
        }
    }

    pub fn for_entity(
        exception: AmqpException,
        namespace: impl Into<String>,
        entity_path: impl Into<String>,
    ) -> Self {
        Self {
            exception,
            namespace: namespace.into(),
            entity_path: Some(entity_path.into()),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.exception.transient
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, namespace[{}]", self.exception, self.namespace)?;
        if let Some(entity_path) = &self.entity_path {
            write!(f, ", entityPath[{entity_path}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorContext {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.exception)
    }
}

/// Errors a handler surfaces to its caller instead of the error stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The connection was still open on the remote side but the event that
    /// reported its failure carried no error condition to describe it.
    #[error(
        "{event} on connectionId[{connection_id}] has no error condition while the remote endpoint is still open"
    )]
    MissingErrorCondition {
        connection_id: String,
        event: &'static str,
    },
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Failures scheduling work onto the reactor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The reactor's work queue is gone; its I/O has faulted or it shut down.
    #[error("reactor dispatcher I/O faulted, cannot dispatch '{task}'")]
    IoFaulted { task: String },

    /// Timers need a tokio runtime on the calling thread.
    #[error("no tokio runtime available to arm timer for '{task}'")]
    NoRuntime { task: String },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Env(#[from] EnvVarError),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
