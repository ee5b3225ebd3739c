//! # Protocol Engine Seam
//!
//! Traits describing the objects an AMQP 1.0 protocol engine hands to the
//! handlers on every lifecycle callback. The engine itself (framing, the
//! reactor loop, TLS) lives outside this crate; anything that can expose a
//! connection, session, link and transport through these traits can drive the
//! handlers, including the in-memory doubles used by the tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle phase of a protocol endpoint (connection, session or link).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EndpointState {
    /// The endpoint exists but has not been opened.
    #[default]
    Uninitialized,
    /// The endpoint has been opened.
    Active,
    /// The endpoint has been closed. Terminal.
    Closed,
}

impl EndpointState {
    pub fn is_closed(self) -> bool {
        matches!(self, EndpointState::Closed)
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointState::Uninitialized => write!(f, "UNINITIALIZED"),
            EndpointState::Active => write!(f, "ACTIVE"),
            EndpointState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A protocol error condition: the symbolic code and optional description
/// carried on close, end and detach frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCondition {
    /// Condition symbol, e.g. `amqp:connection:forced`
    pub condition: String,
    /// Human-readable description supplied by the peer or the engine
    pub description: Option<String>,
}

impl ErrorCondition {
    pub fn new(condition: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            description: Some(description.into()),
        }
    }

    pub fn without_description(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            description: None,
        }
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.condition, description),
            None => write!(f, "{}", self.condition),
        }
    }
}

/// State and condition accessors shared by connections, sessions and links.
pub trait Endpoint {
    fn local_state(&self) -> EndpointState;
    fn remote_state(&self) -> EndpointState;
    /// Condition set locally, sent with our close/end/detach frame.
    fn condition(&self) -> Option<ErrorCondition>;
    /// Condition received from the peer.
    fn remote_condition(&self) -> Option<ErrorCondition>;
    fn set_condition(&mut self, condition: Option<ErrorCondition>);
    fn open(&mut self);
    fn close(&mut self);
}

/// TLS role of the transport's security layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    Client,
    Server,
}

/// How the TLS layer verifies the peer certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerVerification {
    /// No certificate or peer name verification.
    #[default]
    Anonymous,
    /// Verify the certificate chain only.
    VerifyPeer,
    /// Verify the certificate chain and that it matches the hostname.
    VerifyPeerName,
}

/// Security layer settings installed on the transport once it is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub mode: TlsMode,
    pub peer_verification: PeerVerification,
    /// Name to verify when `peer_verification` is `VerifyPeerName`.
    pub peer_hostname: Option<String>,
}

/// The byte transport a connection is bound to.
pub trait Transport {
    fn condition(&self) -> Option<ErrorCondition>;
    fn unbind(&mut self);
    fn configure_tls(&mut self, settings: TlsSettings);
}

pub trait Connection: Endpoint {
    fn set_hostname(&mut self, hostname: &str);
    fn set_container(&mut self, container_id: &str);
    fn set_properties(&mut self, properties: HashMap<String, String>);
    /// Release engine resources held by the connection.
    fn free(&mut self);
    fn transport_mut(&mut self) -> Option<&mut dyn Transport>;
}

pub trait Session: Endpoint {}

pub trait Link: Endpoint {
    fn name(&self) -> &str;
    /// The session that owns this link.
    fn session_mut(&mut self) -> &mut dyn Session;
}

#[cfg(test)]
pub(crate) mod testing;
