use super::describe_condition;
use super::publisher::{EndpointObserver, EndpointStatePublisher};
use crate::common::{AmqpErrorCondition, AmqpException, ErrorContext};
use crate::config::{SessionOptions, SessionTimeoutPolicy};
use crate::dispatch::{DispatchTask, Dispatcher, TimerHandle};
use crate::engine::{EndpointState, Session};
use futures::stream::BoxStream;
use std::sync::Arc;

/// Session-level callbacks delivered by the protocol engine, plus the
/// open-timeout firing on the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LocalOpen,
    RemoteOpen,
    LocalClose,
    RemoteClose,
    Final,
    OpenTimeout,
}

/// Drives a single session on a connection.
///
/// Opening the session locally arms an open timeout on the reactor
/// dispatcher. If the dispatcher cannot take the timer the session is closed
/// at once and the failure is published: a session whose open cannot be
/// bounded is not allowed to proceed. The timer is cancelled as soon as the
/// peer answers or the session closes.
///
/// What happens when the timeout fires is decided by
/// [`SessionTimeoutPolicy`]. The default only logs, because closing a
/// session from a timer callback is unsafe on some engines.
pub struct SessionHandler {
    connection_id: String,
    hostname: String,
    options: SessionOptions,
    dispatcher: Arc<dyn Dispatcher>,
    publisher: EndpointStatePublisher,
    open_timer: Option<TimerHandle>,
    timeout_tx: flume::Sender<()>,
    timeout_rx: flume::Receiver<()>,
}

impl SessionHandler {
    pub fn new(
        connection_id: impl Into<String>,
        hostname: impl Into<String>,
        options: SessionOptions,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let connection_id = connection_id.into();
        let publisher = EndpointStatePublisher::new(format!(
            "connectionId[{connection_id}] entityPath[{}]",
            options.entity_path
        ));
        let (timeout_tx, timeout_rx) = flume::unbounded();

        Self {
            connection_id,
            hostname: hostname.into(),
            options,
            dispatcher,
            publisher,
            open_timer: None,
            timeout_tx,
            timeout_rx,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn entity_path(&self) -> &str {
        &self.options.entity_path
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

    /// Whether an open timer is armed and still pending.
    pub fn has_pending_open_timer(&self) -> bool {
        self.open_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_cancelled())
    }

    /// Consumes a fired open-timeout signal, if any. The reactor glue calls
    /// this after running dispatched tasks and delivers
    /// [`SessionEvent::OpenTimeout`] when it returns `true`.
    pub fn take_elapsed_timeout(&self) -> bool {
        self.timeout_rx.try_recv().is_ok()
    }

    pub fn handle(&mut self, event: SessionEvent, session: &mut dyn Session) {
        match event {
            SessionEvent::LocalOpen => self.on_session_local_open(session),
            SessionEvent::RemoteOpen => self.on_session_remote_open(session),
            SessionEvent::LocalClose => self.on_session_local_close(session),
            SessionEvent::RemoteClose => self.on_session_remote_close(session),
            SessionEvent::Final => self.on_session_final(session),
            SessionEvent::OpenTimeout => self.on_session_timeout(session),
        }
    }

    pub fn on_session_local_open(&mut self, session: &mut dyn Session) {
        log::info!(
            "onSessionLocalOpen connectionId[{}] entityPath[{}] condition[{}]",
            self.connection_id,
            self.entity_path(),
            describe_condition(session.condition().as_ref())
        );

        let elapsed = self.timeout_tx.clone();
        let label = format!(
            "connectionId[{}] entityPath[{}]",
            self.connection_id,
            self.entity_path()
        );
        let task = DispatchTask::new(format!("session-open-timeout {label}"), move || {
            log::debug!("{label}: session open timer fired");
            // Handler gone means the session is gone too.
            let _ = elapsed.send(());
        });

        match self.dispatcher.schedule(task, self.options.open_timeout) {
            Ok(timer) => {
                if let Some(previous) = self.open_timer.replace(timer) {
                    previous.cancel();
                }
            }
            Err(e) => {
                log::error!(
                    "onSessionLocalOpen connectionId[{}] entityPath[{}]: could not arm open timeout: {e}",
                    self.connection_id,
                    self.entity_path()
                );

                let exception = AmqpException::new(
                    AmqpErrorCondition::InternalError,
                    format!(
                        "onSessionLocalOpen connectionId[{}], entityPath[{}], underlying IO of reactorDispatcher faulted with error: {e}",
                        self.connection_id,
                        self.entity_path()
                    ),
                );
                session.set_condition(Some(exception.to_condition()));
                session.close();
                self.publisher.publish_error(self.error_context(exception));
            }
        }
    }

    /// Runs when the open timer fires before the peer answered.
    pub fn on_session_timeout(&mut self, session: &mut dyn Session) {
        self.cancel_open_timer();

        if session.remote_state() != EndpointState::Uninitialized {
            log::debug!(
                "onSessionTimeout connectionId[{}] entityPath[{}]: remote state is {}, nothing to do",
                self.connection_id,
                self.entity_path(),
                session.remote_state()
            );
            return;
        }

        match self.options.timeout_policy {
            SessionTimeoutPolicy::Ignore => {
                log::warn!(
                    "onSessionTimeout connectionId[{}] entityPath[{}]: session not opened within {:?}, leaving it to the engine",
                    self.connection_id,
                    self.entity_path(),
                    self.options.open_timeout
                );
            }
            SessionTimeoutPolicy::ForceClose => {
                if session.local_state() == EndpointState::Closed {
                    return;
                }
                log::warn!(
                    "onSessionTimeout connectionId[{}] entityPath[{}]: session not opened within {:?}, closing",
                    self.connection_id,
                    self.entity_path(),
                    self.options.open_timeout
                );

                let exception = AmqpException::new(
                    AmqpErrorCondition::Timeout,
                    format!(
                        "Session for entityPath[{}] was not opened by the remote peer within {:?}",
                        self.entity_path(),
                        self.options.open_timeout
                    ),
                );
                session.set_condition(Some(exception.to_condition()));
                session.close();
                self.publisher.publish_state(EndpointState::Closed);
                self.publisher.publish_error(self.error_context(exception));
            }
        }
    }

    pub fn on_session_remote_open(&mut self, session: &mut dyn Session) {
        self.cancel_open_timer();
        log::info!(
            "onSessionRemoteOpen connectionId[{}] entityPath[{}] sessionState[{}] remoteState[{}]",
            self.connection_id,
            self.entity_path(),
            session.local_state(),
            session.remote_state()
        );

        if session.local_state() == EndpointState::Uninitialized {
            log::warn!(
                "onSessionRemoteOpen connectionId[{}] entityPath[{}]: peer opened first, opening locally",
                self.connection_id,
                self.entity_path()
            );
            session.open();
        }

        self.publisher.publish_state(EndpointState::Active);
    }

    pub fn on_session_local_close(&mut self, session: &mut dyn Session) {
        self.cancel_open_timer();
        log::info!(
            "onSessionLocalClose connectionId[{}] entityPath[{}] condition[{}]",
            self.connection_id,
            self.entity_path(),
            describe_condition(session.condition().as_ref())
        );
    }

    pub fn on_session_remote_close(&mut self, session: &mut dyn Session) {
        self.cancel_open_timer();
        let condition = session.remote_condition();
        log::info!(
            "onSessionRemoteClose connectionId[{}] entityPath[{}] condition[{}]",
            self.connection_id,
            self.entity_path(),
            describe_condition(condition.as_ref())
        );

        if session.local_state() != EndpointState::Closed {
            log::info!(
                "onSessionRemoteClose connectionId[{}] entityPath[{}]: closing local session",
                self.connection_id,
                self.entity_path()
            );
            session.set_condition(condition.clone());
            session.close();
        }

        self.publisher.publish_state(EndpointState::Closed);
        if let Some(condition) = condition {
            self.publisher
                .publish_error(self.error_context(AmqpException::from_condition(&condition)));
        }
    }

    pub fn on_session_final(&mut self, session: &mut dyn Session) {
        self.cancel_open_timer();
        log::info!(
            "onSessionFinal connectionId[{}] entityPath[{}] condition[{}]",
            self.connection_id,
            self.entity_path(),
            describe_condition(session.condition().as_ref())
        );

        self.close();
    }

    fn cancel_open_timer(&mut self) {
        if let Some(timer) = self.open_timer.take() {
            timer.cancel();
        }
    }

    fn error_context(&self, exception: AmqpException) -> ErrorContext {
        ErrorContext::for_entity(exception, self.hostname.clone(), self.entity_path())
    }
}
