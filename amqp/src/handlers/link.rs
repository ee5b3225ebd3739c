use super::describe_condition;
use super::publisher::{EndpointObserver, EndpointStatePublisher};
use crate::common::{AmqpException, ErrorContext};
use crate::engine::{EndpointState, ErrorCondition, Link, Session};
use futures::stream::BoxStream;

/// Link-level callbacks delivered by the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    RemoteOpen,
    LocalClose,
    RemoteClose,
    RemoteDetach,
    Final,
}

/// Drives a single sender or receiver link.
///
/// Whenever the link goes away, locally or remotely, the owning session is
/// closed too if it is still open, carrying the link's condition. A session
/// without its link would otherwise hold engine resources until the
/// connection dies. Remote close and remote detach are handled identically.
pub struct LinkHandler {
    connection_id: String,
    hostname: String,
    entity_path: String,
    publisher: EndpointStatePublisher,
}

impl LinkHandler {
    pub fn new(
        connection_id: impl Into<String>,
        hostname: impl Into<String>,
        entity_path: impl Into<String>,
    ) -> Self {
        let connection_id = connection_id.into();
        let entity_path = entity_path.into();
        let publisher = EndpointStatePublisher::new(format!(
            "connectionId[{connection_id}] linkEntityPath[{entity_path}]"
        ));

        Self {
            connection_id,
            hostname: hostname.into(),
            entity_path,
            publisher,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn entity_path(&self) -> &str {
        &self.entity_path
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

    pub fn close(&self) {
        self.publisher.close();
    }

    pub fn handle(&self, event: LinkEvent, link: &mut dyn Link) {
        match event {
            LinkEvent::RemoteOpen => self.on_link_remote_open(link),
            LinkEvent::LocalClose => self.on_link_local_close(link),
            LinkEvent::RemoteClose => self.on_link_remote_close(link),
            LinkEvent::RemoteDetach => self.on_link_remote_detach(link),
            LinkEvent::Final => self.on_link_final(link),
        }
    }

    pub fn on_link_remote_open(&self, link: &mut dyn Link) {
        log::info!(
            "onLinkRemoteOpen connectionId[{}] linkName[{}] entityPath[{}] remoteState[{}]",
            self.connection_id,
            link.name(),
            self.entity_path,
            link.remote_state()
        );

        if link.remote_state() == EndpointState::Active {
            self.publisher.publish_state(EndpointState::Active);
        }
    }

    pub fn on_link_local_close(&self, link: &mut dyn Link) {
        let condition = link.condition();
        log::info!(
            "onLinkLocalClose connectionId[{}] linkName[{}] errorCondition[{}]",
            self.connection_id,
            link.name(),
            describe_condition(condition.as_ref())
        );

        self.close_session(link.session_mut(), condition);
    }

    pub fn on_link_remote_close(&self, link: &mut dyn Link) {
        self.handle_remote_link_closed("onLinkRemoteClose", link);
    }

    pub fn on_link_remote_detach(&self, link: &mut dyn Link) {
        self.handle_remote_link_closed("onLinkRemoteDetach", link);
    }

    pub fn on_link_final(&self, link: &mut dyn Link) {
        log::info!(
            "onLinkFinal connectionId[{}] linkName[{}] entityPath[{}]",
            self.connection_id,
            link.name(),
            self.entity_path
        );

        self.close();
    }

    fn handle_remote_link_closed(&self, event: &'static str, link: &mut dyn Link) {
        let condition = link.remote_condition();
        log::info!(
            "{event} connectionId[{}] linkName[{}] errorCondition[{}]",
            self.connection_id,
            link.name(),
            describe_condition(condition.as_ref())
        );

        if link.local_state() != EndpointState::Closed {
            log::info!(
                "{event} connectionId[{}] linkName[{}]: closing local link",
                self.connection_id,
                link.name()
            );
            link.set_condition(condition.clone());
            link.close();
        }

        self.publisher.publish_state(EndpointState::Closed);
        if let Some(condition) = &condition {
            self.publisher.publish_error(ErrorContext::for_entity(
                AmqpException::from_condition(condition),
                self.hostname.clone(),
                self.entity_path.clone(),
            ));
        }

        self.close_session(link.session_mut(), condition);
    }

    fn close_session(&self, session: &mut dyn Session, condition: Option<ErrorCondition>) {
        if session.local_state() == EndpointState::Closed {
            log::debug!(
                "connectionId[{}] entityPath[{}]: session already closed",
                self.connection_id,
                self.entity_path
            );
            return;
        }

        log::info!(
            "connectionId[{}] entityPath[{}]: closing session after link closed, errorCondition[{}]",
            self.connection_id,
            self.entity_path,
            describe_condition(condition.as_ref())
        );
        session.set_condition(condition);
        session.close();
    }
}
