//! # Endpoint Handlers
//!
//! One handler per protocol endpoint. The reactor feeds each handler the
//! engine callbacks for its endpoint, in connection, session, link order.
//! Handlers act on the engine objects and publish what happened through an
//! [`EndpointStatePublisher`]; the async client consumes the resulting state
//! and error streams to decide on retries and reconnects.
//!
//! - [`ConnectionHandler`] - connection open/close, transport binding and TLS
//! - [`SessionHandler`] - session handshake and open timeout
//! - [`LinkHandler`] - link closure, cascading to the owning session

use crate::engine::ErrorCondition;

pub mod connection;
pub mod link;
pub mod publisher;
pub mod session;

pub use connection::{ConnectionEvent, ConnectionHandler};
pub use link::{LinkEvent, LinkHandler};
pub use publisher::{EndpointObserver, EndpointStatePublisher};
pub use session::{SessionEvent, SessionHandler};

pub(crate) fn describe_condition(condition: Option<&ErrorCondition>) -> String {
    condition.map_or_else(|| "n/a".to_string(), ToString::to_string)
}
