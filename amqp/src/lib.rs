//! # Event Hubs AMQP Handler Library
//!
//! Endpoint state machines that sit between a callback-driven AMQP protocol
//! engine and the asynchronous Event Hubs client. The engine delivers
//! connection, session and link lifecycle events on its reactor thread; the
//! handlers in this crate translate them into protocol actions (open, close,
//! unbind) and publish the resulting endpoint states and error contexts as
//! streams for the client's retry and reconnect logic.
//!
//! ## Modules
//!
//! - [`common`] - Error conditions, exceptions and error contexts
//! - [`config`] - Connection and session options
//! - [`dispatch`] - Work scheduling onto the reactor thread
//! - [`engine`] - Traits describing the protocol engine's endpoints
//! - [`handlers`] - Connection, session and link handlers and the state publisher
//! - [`utils`] - Utility functions and helpers

pub mod common;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod handlers;
pub mod utils;

pub use common::{AmqpErrorCondition, AmqpException, ErrorContext, HandlerError, HandlerResult};
pub use config::{ConnectionOptions, SessionOptions, SessionTimeoutPolicy};
pub use dispatch::{DispatchTask, Dispatcher, ReactorDispatcher, ReactorQueue, TimerHandle};
pub use engine::{EndpointState, ErrorCondition};
pub use handlers::{
    ConnectionEvent, ConnectionHandler, EndpointStatePublisher, LinkEvent, LinkHandler,
    SessionEvent, SessionHandler,
};
