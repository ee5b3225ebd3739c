use super::describe_condition;
use super::publisher::{EndpointObserver, EndpointStatePublisher};
use crate::common::{AmqpException, ErrorContext, HandlerError, HandlerResult};
use crate::config::ConnectionOptions;
use crate::engine::{
    Connection, EndpointState, ErrorCondition, PeerVerification, TlsMode, TlsSettings, Transport,
};
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Connection-level callbacks delivered by the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Init,
    Bound,
    Unbound,
    LocalOpen,
    RemoteOpen,
    LocalClose,
    RemoteClose,
    TransportError,
    TransportClosed,
    Final,
}

/// Drives a single connection attempt.
///
/// On init the handler stamps the engine connection with the virtual host,
/// container id and negotiated properties and requests an open. From then on
/// the connection's remote state is authoritative: every callback that can
/// change it republishes it through the handler's [`EndpointStatePublisher`].
/// Failures become [`ErrorContext`]s on the error stream.
///
/// A handler is never reused; a reconnect builds a new one.
///
/// # Examples
///
/// ```no_run
/// use amqp::{ConnectionEvent, ConnectionHandler, ConnectionOptions};
///
/// let handler = ConnectionHandler::new(
///     ConnectionOptions::new("ns.servicebus.windows.net").with_connection_id("conn-1"),
/// );
/// let states = handler.observe_states();
/// let errors = handler.observe_errors();
///
/// // On the reactor thread, for every connection callback:
/// handler.handle(ConnectionEvent::Init, &mut engine_connection)?;
/// ```
pub struct ConnectionHandler {
    options: ConnectionOptions,
    publisher: EndpointStatePublisher,
}

impl ConnectionHandler {
    pub fn new(options: ConnectionOptions) -> Self {
        let publisher =
            EndpointStatePublisher::new(format!("connectionId[{}]", options.connection_id));
        Self { options, publisher }
    }

    pub fn connection_id(&self) -> &str {
        &self.options.connection_id
    }

    pub fn hostname(&self) -> &str {
        &self.options.hostname
    }

    pub fn port(&self) -> u16 {
        self.options.port
    }

    pub fn max_frame_size(&self) -> u32 {
        self.options.max_frame_size
    }

    pub fn connection_properties(&self) -> HashMap<String, String> {
        self.options.connection_properties()
    }

    pub fn observer(&self) -> EndpointObserver {
        self.publisher.observer()
    }

    pub fn observe_states(&self) -> BoxStream<'static, EndpointState> {
        self.publisher.observe_states()
    }

    pub fn observe_errors(&self) -> BoxStream<'static, ErrorContext> {
        self.publisher.observe_errors()
    }

    /// Publishes CLOSED and completes both streams. Safe to call repeatedly.
    pub fn close(&self) {
        self.publisher.close();
    }

    /// Routes an engine callback to its handler method. Transport events
    /// reach the transport through [`Connection::transport_mut`].
    pub fn handle(
        &self,
        event: ConnectionEvent,
        connection: &mut dyn Connection,
    ) -> HandlerResult<()> {
        match event {
            ConnectionEvent::Init => self.on_init(connection),
            ConnectionEvent::Bound => self.on_bound(connection),
            ConnectionEvent::Unbound => self.on_unbound(connection),
            ConnectionEvent::LocalOpen => self.on_local_open(connection),
            ConnectionEvent::RemoteOpen => self.on_remote_open(connection),
            ConnectionEvent::LocalClose => self.on_local_close(connection),
            ConnectionEvent::RemoteClose => self.on_remote_close(connection),
            ConnectionEvent::Final => self.on_final(connection),
            ConnectionEvent::TransportError => {
                let condition = connection.transport_mut().and_then(|t| t.condition());
                let result = self.report_transport_failure(
                    "onTransportError",
                    Some(&*connection),
                    condition.as_ref(),
                );
                match connection.transport_mut() {
                    Some(transport) => transport.unbind(),
                    None => log::warn!(
                        "onTransportError connectionId[{}]: no transport to unbind",
                        self.connection_id()
                    ),
                }
                return result;
            }
            ConnectionEvent::TransportClosed => {
                let condition = connection.transport_mut().and_then(|t| t.condition());
                return self.report_transport_failure(
                    "onTransportClosed",
                    Some(&*connection),
                    condition.as_ref(),
                );
            }
        }
        Ok(())
    }

    pub fn on_init(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionInit connectionId[{}] hostname[{}] port[{}]",
            self.connection_id(),
            self.hostname(),
            self.port()
        );

        connection.set_hostname(&self.options.virtual_host());
        connection.set_container(self.connection_id());
        connection.set_properties(self.connection_properties());
        connection.open();
    }

    pub fn on_bound(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionBound connectionId[{}] hostname[{}]",
            self.connection_id(),
            self.hostname()
        );

        let settings = self.tls_settings();
        if settings.peer_verification == PeerVerification::Anonymous {
            log::debug!(
                "connectionId[{}]: TLS peer verification disabled",
                self.connection_id()
            );
        }
        match connection.transport_mut() {
            Some(transport) => transport.configure_tls(settings),
            None => log::warn!(
                "onConnectionBound connectionId[{}]: connection has no transport",
                self.connection_id()
            ),
        }

        self.publisher.publish_state(connection.remote_state());
    }

    pub fn on_unbound(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionUnbound connectionId[{}] hostname[{}] state[{}] remoteState[{}]",
            self.connection_id(),
            self.hostname(),
            connection.local_state(),
            connection.remote_state()
        );

        if connection.local_state() != EndpointState::Uninitialized {
            connection.free();
        }

        self.publisher.publish_state(connection.remote_state());
    }

    /// Handles a transport error. Records an [`ErrorContext`] when a
    /// connection is present, republishes its remote state and always
    /// unbinds the transport.
    ///
    /// # Errors
    ///
    /// [`HandlerError::MissingErrorCondition`] if the connection is still open
    /// remotely but the transport reported no condition. The transport is
    /// unbound regardless.
    pub fn on_transport_error(
        &self,
        connection: Option<&mut dyn Connection>,
        transport: &mut dyn Transport,
    ) -> HandlerResult<()> {
        let condition = transport.condition();
        let result = self.report_transport_failure(
            "onTransportError",
            connection.as_deref(),
            condition.as_ref(),
        );
        transport.unbind();
        result
    }

    /// Same as [`on_transport_error`](Self::on_transport_error) without the
    /// unbind; the engine tears the transport down itself after a close.
    pub fn on_transport_closed(
        &self,
        connection: Option<&mut dyn Connection>,
        transport: &dyn Transport,
    ) -> HandlerResult<()> {
        let condition = transport.condition();
        self.report_transport_failure(
            "onTransportClosed",
            connection.as_deref(),
            condition.as_ref(),
        )
    }

    pub fn on_local_open(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionLocalOpen connectionId[{}] hostname[{}] errorCondition[{}]",
            self.connection_id(),
            self.hostname(),
            describe_condition(connection.condition().as_ref())
        );
    }

    pub fn on_remote_open(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionRemoteOpen connectionId[{}] hostname[{}] remoteState[{}]",
            self.connection_id(),
            self.hostname(),
            connection.remote_state()
        );

        self.publisher.publish_state(connection.remote_state());
    }

    pub fn on_local_close(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionLocalClose connectionId[{}] hostname[{}] errorCondition[{}]",
            self.connection_id(),
            self.hostname(),
            describe_condition(connection.condition().as_ref())
        );

        // The peer already closed; no close frame is coming back to finish the handshake.
        if connection.remote_state() == EndpointState::Closed {
            if let Some(transport) = connection.transport_mut() {
                transport.unbind();
            }
        }
    }

    pub fn on_remote_close(&self, connection: &mut dyn Connection) {
        let condition = connection.remote_condition();
        log::info!(
            "onConnectionRemoteClose connectionId[{}] hostname[{}] errorCondition[{}]",
            self.connection_id(),
            self.hostname(),
            describe_condition(condition.as_ref())
        );

        self.publisher.publish_state(connection.remote_state());
        if let Some(condition) = condition {
            self.publisher.publish_error(self.error_context(&condition));
        }
    }

    pub fn on_final(&self, connection: &mut dyn Connection) {
        log::info!(
            "onConnectionFinal connectionId[{}] hostname[{}] errorCondition[{}]",
            self.connection_id(),
            self.hostname(),
            describe_condition(connection.condition().as_ref())
        );

        self.publisher.publish_state(connection.remote_state());
        self.close();
    }

    fn report_transport_failure(
        &self,
        event: &'static str,
        connection: Option<&dyn Connection>,
        condition: Option<&ErrorCondition>,
    ) -> HandlerResult<()> {
        match condition {
            Some(condition) => log::warn!(
                "{event} connectionId[{}] hostname[{}] condition[{}] description[{}]",
                self.connection_id(),
                self.hostname(),
                condition.condition,
                condition.description.as_deref().unwrap_or("n/a")
            ),
            None => log::info!(
                "{event} connectionId[{}] hostname[{}]: no error condition",
                self.connection_id(),
                self.hostname()
            ),
        }

        let result = self.notify_error_context(event, connection, condition);
        if let Some(connection) = connection {
            self.publisher.publish_state(connection.remote_state());
        }
        result
    }

    /// Publishes an error for a connection that failed while the peer still
    /// considered it open. Nothing is published when there is no connection
    /// or the peer already closed it (its close carried the condition).
    fn notify_error_context(
        &self,
        event: &'static str,
        connection: Option<&dyn Connection>,
        condition: Option<&ErrorCondition>,
    ) -> HandlerResult<()> {
        let Some(connection) = connection else {
            return Ok(());
        };
        if connection.remote_state() == EndpointState::Closed {
            return Ok(());
        }

        let Some(condition) = condition else {
            log::error!(
                "{event} connectionId[{}]: remote endpoint still open but no error condition supplied",
                self.connection_id()
            );
            return Err(HandlerError::MissingErrorCondition {
                connection_id: self.connection_id().to_string(),
                event,
            });
        };

        self.publisher.publish_error(self.error_context(condition));
        Ok(())
    }

    fn error_context(&self, condition: &ErrorCondition) -> ErrorContext {
        ErrorContext::new(AmqpException::from_condition(condition), self.hostname())
    }

    fn tls_settings(&self) -> TlsSettings {
        let peer_hostname = match self.options.peer_verification {
            PeerVerification::VerifyPeerName => Some(self.options.hostname.clone()),
            _ => None,
        };

        TlsSettings {
            mode: TlsMode::Client,
            peer_verification: self.options.peer_verification,
            peer_hostname,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AMQPS_PORT, property_keys};
    use crate::engine::testing::{MockConnection, MockEndpoint, MockTransport};
    use crate::handlers::publisher::test_support::drain;
    use claims::*;

    fn handler() -> ConnectionHandler {
        ConnectionHandler::new(
            ConnectionOptions::new("ns.example.com").with_connection_id("conn-1"),
        )
    }

    fn active_connection() -> MockConnection {
        MockConnection {
            endpoint: MockEndpoint::with_states(EndpointState::Active, EndpointState::Active),
            ..MockConnection::with_transport()
        }
    }

    #[test]
    fn test_init_stamps_connection_and_opens() {
        let handler = handler();
        let mut connection = MockConnection::with_transport();
        let mut states = handler.observe_states();

        assert_ok!(handler.handle(ConnectionEvent::Init, &mut connection));

        assert_eq!(
            connection.hostname.as_deref(),
            Some(format!("ns.example.com:{AMQPS_PORT}").as_str())
        );
        assert_eq!(connection.container.as_deref(), Some("conn-1"));
        assert_eq!(connection.properties.len(), 5);
        assert!(connection.properties.contains_key(property_keys::USER_AGENT));
        assert_eq!(connection.endpoint.open_calls, 1);

        // Only the replayed initial state; init publishes nothing
        let (items, _) = drain(&mut states);
        assert_eq!(items, vec![EndpointState::Uninitialized]);
    }

    #[test]
    fn test_init_bound_remote_open_emits_active_once() {
        let handler = handler();
        let mut connection = MockConnection::with_transport();
        let mut states = handler.observe_states();

        assert_ok!(handler.handle(ConnectionEvent::Init, &mut connection));
        assert_ok!(handler.handle(ConnectionEvent::Bound, &mut connection));
        connection.endpoint.remote = EndpointState::Active;
        assert_ok!(handler.handle(ConnectionEvent::RemoteOpen, &mut connection));
        assert_ok!(handler.handle(ConnectionEvent::RemoteOpen, &mut connection));

        let (items, completed) = drain(&mut states);
        assert_eq!(
            items,
            vec![EndpointState::Uninitialized, EndpointState::Active]
        );
        assert!(!completed);

        let tls = assert_some!(connection.transport().tls.clone());
        assert_eq!(tls.mode, TlsMode::Client);
        assert_eq!(tls.peer_verification, PeerVerification::Anonymous);
        assert_none!(tls.peer_hostname);
    }

    #[test]
    fn test_bound_with_peer_name_verification_passes_hostname() {
        let handler = ConnectionHandler::new(
            ConnectionOptions::new("ns.example.com")
                .with_peer_verification(PeerVerification::VerifyPeerName),
        );
        let mut connection = MockConnection::with_transport();

        handler.on_bound(&mut connection);

        let tls = assert_some!(connection.transport().tls.clone());
        assert_eq!(tls.peer_hostname.as_deref(), Some("ns.example.com"));
    }

    #[test]
    fn test_transport_error_publishes_error_and_unbinds() {
        let handler = handler();
        let mut connection = active_connection();
        connection.transport = Some(MockTransport {
            condition: Some(ErrorCondition::new("amqp:connection:forced", "boom")),
            ..MockTransport::default()
        });
        let mut errors = handler.observe_errors();

        assert_ok!(handler.handle(ConnectionEvent::TransportError, &mut connection));

        let (items, _) = drain(&mut errors);
        assert_eq!(items.len(), 1);
        assert!(items[0].to_string().contains("boom"));
        assert_eq!(items[0].namespace, "ns.example.com");
        assert_none!(items[0].entity_path.as_ref());
        assert_eq!(connection.transport().unbind_calls, 1);
    }

    #[test]
    fn test_transport_error_without_condition_fails_loudly_but_unbinds() {
        let handler = handler();
        let mut connection = active_connection();
        let mut errors = handler.observe_errors();

        let result = handler.handle(ConnectionEvent::TransportError, &mut connection);

        assert_matches!(
            result,
            Err(HandlerError::MissingErrorCondition {
                ref connection_id,
                event: "onTransportError"
            })
                if connection_id == "conn-1"
        );
        assert_eq!(connection.transport().unbind_calls, 1);
        assert!(drain(&mut errors).0.is_empty());
    }

    #[test]
    fn test_transport_error_after_remote_close_is_silent() {
        let handler = handler();
        let mut connection = MockConnection {
            endpoint: MockEndpoint::with_states(EndpointState::Active, EndpointState::Closed),
            ..MockConnection::with_transport()
        };
        let mut errors = handler.observe_errors();

        assert_ok!(handler.handle(ConnectionEvent::TransportError, &mut connection));

        assert!(drain(&mut errors).0.is_empty());
        assert_eq!(connection.transport().unbind_calls, 1);
    }

    #[test]
    fn test_transport_error_without_connection_only_unbinds() {
        let handler = handler();
        let mut transport = MockTransport::default();
        let mut errors = handler.observe_errors();

        assert_ok!(handler.on_transport_error(None, &mut transport));

        assert_eq!(transport.unbind_calls, 1);
        assert!(drain(&mut errors).0.is_empty());
    }

    #[test]
    fn test_transport_closed_reports_without_unbinding() {
        let handler = handler();
        let mut connection = active_connection();
        connection.transport = Some(MockTransport {
            condition: Some(ErrorCondition::new("proton:io", "socket closed")),
            ..MockTransport::default()
        });
        let mut errors = handler.observe_errors();

        assert_ok!(handler.handle(ConnectionEvent::TransportClosed, &mut connection));

        let (items, _) = drain(&mut errors);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_transient());
        assert_eq!(connection.transport().unbind_calls, 0);
    }

    #[test]
    fn test_local_close_unbinds_only_when_peer_already_closed() {
        let handler = handler();

        let mut open_remotely = active_connection();
        handler.on_local_close(&mut open_remotely);
        assert_eq!(open_remotely.transport().unbind_calls, 0);

        let mut closed_remotely = MockConnection {
            endpoint: MockEndpoint::with_states(EndpointState::Closed, EndpointState::Closed),
            ..MockConnection::with_transport()
        };
        handler.on_local_close(&mut closed_remotely);
        assert_eq!(closed_remotely.transport().unbind_calls, 1);
    }

    #[test]
    fn test_remote_close_publishes_closed_and_error() {
        let handler = handler();
        let mut connection = active_connection();
        let mut states = handler.observe_states();
        let mut errors = handler.observe_errors();

        handler.on_remote_open(&mut connection);
        connection.endpoint.remote = EndpointState::Closed;
        connection.endpoint.remote_condition = Some(ErrorCondition::new(
            "amqp:unauthorized-access",
            "token expired",
        ));
        handler.on_remote_close(&mut connection);

        let (state_items, _) = drain(&mut states);
        assert_eq!(
            state_items,
            vec![
                EndpointState::Uninitialized,
                EndpointState::Active,
                EndpointState::Closed
            ]
        );
        let (error_items, _) = drain(&mut errors);
        assert_eq!(error_items.len(), 1);
        assert_eq!(error_items[0].exception.description, "token expired");
        assert!(!error_items[0].is_transient());
    }

    #[test]
    fn test_unbound_frees_only_started_connections() {
        let handler = handler();

        let mut untouched = MockConnection::with_transport();
        handler.on_unbound(&mut untouched);
        assert_eq!(untouched.free_calls, 0);

        let mut started = active_connection();
        handler.on_unbound(&mut started);
        assert_eq!(started.free_calls, 1);
    }

    #[test]
    fn test_final_completes_streams_once() {
        let handler = handler();
        let mut connection = active_connection();
        let mut states = handler.observe_states();
        let mut errors = handler.observe_errors();

        assert_ok!(handler.handle(ConnectionEvent::Final, &mut connection));
        assert_ok!(handler.handle(ConnectionEvent::Final, &mut connection));

        let (state_items, states_completed) = drain(&mut states);
        assert_eq!(
            state_items,
            vec![
                EndpointState::Uninitialized,
                EndpointState::Active,
                EndpointState::Closed
            ]
        );
        assert!(states_completed);
        assert_eq!(drain(&mut errors), (vec![], true));
    }

    #[test]
    fn test_accessors_expose_configuration() {
        let handler = handler();

        assert_eq!(handler.connection_id(), "conn-1");
        assert_eq!(handler.hostname(), "ns.example.com");
        assert_eq!(handler.port(), AMQPS_PORT);
        assert_eq!(handler.max_frame_size(), crate::config::MAX_FRAME_SIZE);
        assert_eq!(handler.connection_properties().len(), 5);
    }
}
