use crate::common::ErrorContext;
use crate::engine::EndpointState;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Publishes an endpoint's lifecycle states and error contexts.
///
/// Each handler owns one publisher and is its only writer; readers subscribe
/// through an [`EndpointObserver`] from any thread. The state stream replays
/// the latest state to new subscribers and only emits on change. Once CLOSED
/// has been published no other state is accepted. The error stream has no
/// replay: subscribers only see errors published after they subscribed.
///
/// [`close`](Self::close) publishes CLOSED and completes both streams. It is
/// guarded and safe to call more than once.
pub struct EndpointStatePublisher {
    label: String,
    shared: Arc<Mutex<PublisherState>>,
}

/// Read side of an [`EndpointStatePublisher`]. Cheap to clone.
#[derive(Clone)]
pub struct EndpointObserver {
    label: String,
    shared: Arc<Mutex<PublisherState>>,
}

struct PublisherState {
    current: EndpointState,
    terminated: bool,
    state_subscribers: Vec<flume::Sender<EndpointState>>,
    error_subscribers: Vec<flume::Sender<ErrorContext>>,
}

impl PublisherState {
    fn emit_state(&mut self, state: EndpointState) {
        self.current = state;
        self.state_subscribers.retain(|tx| tx.send(state).is_ok());
    }
}

fn lock(shared: &Mutex<PublisherState>) -> MutexGuard<'_, PublisherState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EndpointStatePublisher {
    /// `label` identifies the endpoint in log lines, e.g. `connectionId[conn-1]`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            shared: Arc::new(Mutex::new(PublisherState {
                current: EndpointState::Uninitialized,
                terminated: false,
                state_subscribers: Vec::new(),
                error_subscribers: Vec::new(),
            })),
        }
    }

    pub fn observer(&self) -> EndpointObserver {
        EndpointObserver {
            label: self.label.clone(),
            shared: self.shared.clone(),
        }
    }

    pub fn publish_state(&self, state: EndpointState) {
        let mut inner = lock(&self.shared);

        if inner.terminated {
            log::debug!("{}: publisher closed, dropping state {state}", self.label);
            return;
        }
        if inner.current == state {
            return;
        }
        if inner.current.is_closed() {
            log::warn!(
                "{}: ignoring state {state} published after CLOSED",
                self.label
            );
            return;
        }

        log::debug!("{}: state {} -> {state}", self.label, inner.current);
        inner.emit_state(state);
    }

    pub fn publish_error(&self, context: ErrorContext) {
        let mut inner = lock(&self.shared);

        if inner.terminated {
            log::debug!("{}: publisher closed, dropping error {context}", self.label);
            return;
        }

        log::info!("{}: publishing error {context}", self.label);
        inner
            .error_subscribers
            .retain(|tx| tx.send(context.clone()).is_ok());
    }

    /// Publishes CLOSED and completes both streams. Returns `false` if the
    /// publisher was already closed.
    pub fn close(&self) -> bool {
        let mut inner = lock(&self.shared);

        if inner.terminated {
            log::debug!("{}: close called on closed publisher", self.label);
            return false;
        }

        if !inner.current.is_closed() {
            inner.emit_state(EndpointState::Closed);
        }
        inner.terminated = true;
        inner.state_subscribers.clear();
        inner.error_subscribers.clear();

        log::debug!("{}: publisher completed", self.label);
        true
    }

    pub fn current_state(&self) -> EndpointState {
        lock(&self.shared).current
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).terminated
    }

    pub fn observe_states(&self) -> BoxStream<'static, EndpointState> {
        self.observer().observe_states()
    }

    pub fn observe_errors(&self) -> BoxStream<'static, ErrorContext> {
        self.observer().observe_errors()
    }
}

impl EndpointObserver {
    /// Stream of states, starting with the latest one. Ends after CLOSED once
    /// the publisher is closed.
    pub fn observe_states(&self) -> BoxStream<'static, EndpointState> {
        let mut inner = lock(&self.shared);
        let (tx, rx) = flume::unbounded();

        // Receiver is alive, the send cannot fail.
        let _ = tx.send(inner.current);
        if !inner.terminated {
            inner.state_subscribers.push(tx);
        }

        rx.into_stream().boxed()
    }

    /// Stream of error contexts published from now on.
    pub fn observe_errors(&self) -> BoxStream<'static, ErrorContext> {
        let mut inner = lock(&self.shared);

        if inner.terminated {
            log::debug!("{}: error stream requested after close", self.label);
            return stream::empty().boxed();
        }

        let (tx, rx) = flume::unbounded();
        inner.error_subscribers.push(tx);
        rx.into_stream().boxed()
    }

    pub fn current_state(&self) -> EndpointState {
        lock(&self.shared).current
    }

    pub fn subscriber_count(&self) -> usize {
        let inner = lock(&self.shared);
        inner.state_subscribers.len() + inner.error_subscribers.len()
    }
}
