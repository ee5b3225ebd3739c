//! Fake protocol engine objects shared by the integration tests. Every call
//! the handlers make is appended to a shared log so tests can assert on the
//! exact sequence of engine actions.

#![allow(dead_code)]

use amqp::engine::{
    Connection, Endpoint, EndpointState, ErrorCondition, Link, Session, TlsSettings, Transport,
};
use futures::FutureExt;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

pub struct FakeEndpoint {
    pub kind: &'static str,
    pub local: EndpointState,
    pub remote: EndpointState,
    pub condition: Option<ErrorCondition>,
    pub remote_condition: Option<ErrorCondition>,
    pub log: CallLog,
}

impl FakeEndpoint {
    pub fn new(kind: &'static str, log: &CallLog) -> Self {
        Self {
            kind,
            local: EndpointState::Uninitialized,
            remote: EndpointState::Uninitialized,
            condition: None,
            remote_condition: None,
            log: log.clone(),
        }
    }
}

impl Endpoint for FakeEndpoint {
    fn local_state(&self) -> EndpointState {
        self.local
    }

    fn remote_state(&self) -> EndpointState {
        self.remote
    }

    fn condition(&self) -> Option<ErrorCondition> {
        self.condition.clone()
    }

    fn remote_condition(&self) -> Option<ErrorCondition> {
        self.remote_condition.clone()
    }

    fn set_condition(&mut self, condition: Option<ErrorCondition>) {
        self.log.record(format!("{}:set_condition", self.kind));
        self.condition = condition;
    }

    fn open(&mut self) {
        self.log.record(format!("{}:open", self.kind));
        self.local = EndpointState::Active;
    }

    fn close(&mut self) {
        self.log.record(format!("{}:close", self.kind));
        self.local = EndpointState::Closed;
    }
}

impl Session for FakeEndpoint {}

pub struct FakeTransport {
    pub condition: Option<ErrorCondition>,
    pub tls: Option<TlsSettings>,
    pub log: CallLog,
}

impl Transport for FakeTransport {
    fn condition(&self) -> Option<ErrorCondition> {
        self.condition.clone()
    }

    fn unbind(&mut self) {
        self.log.record("transport:unbind");
    }

    fn configure_tls(&mut self, settings: TlsSettings) {
        self.log.record("transport:tls");
        self.tls = Some(settings);
    }
}

pub struct FakeConnection {
    pub endpoint: FakeEndpoint,
    pub transport: FakeTransport,
    pub hostname: Option<String>,
    pub container: Option<String>,
    pub properties: HashMap<String, String>,
}

impl FakeConnection {
    pub fn new(log: &CallLog) -> Self {
        Self {
            endpoint: FakeEndpoint::new("connection", log),
            transport: FakeTransport {
                condition: None,
                tls: None,
                log: log.clone(),
            },
            hostname: None,
            container: None,
            properties: HashMap::new(),
        }
    }
}

impl Endpoint for FakeConnection {
    fn local_state(&self) -> EndpointState {
        self.endpoint.local_state()
    }

    fn remote_state(&self) -> EndpointState {
        self.endpoint.remote_state()
    }

    fn condition(&self) -> Option<ErrorCondition> {
        self.endpoint.condition()
    }

    fn remote_condition(&self) -> Option<ErrorCondition> {
        self.endpoint.remote_condition()
    }

    fn set_condition(&mut self, condition: Option<ErrorCondition>) {
        self.endpoint.set_condition(condition);
    }

    fn open(&mut self) {
        self.endpoint.open();
    }

    fn close(&mut self) {
        self.endpoint.close();
    }
}

impl Connection for FakeConnection {
    fn set_hostname(&mut self, hostname: &str) {
        self.hostname = Some(hostname.to_string());
    }

    fn set_container(&mut self, container_id: &str) {
        self.container = Some(container_id.to_string());
    }

    fn set_properties(&mut self, properties: HashMap<String, String>) {
        self.properties = properties;
    }

    fn free(&mut self) {
        self.endpoint.log.record("connection:free");
    }

    fn transport_mut(&mut self) -> Option<&mut dyn Transport> {
        Some(&mut self.transport)
    }
}

pub struct FakeLink {
    pub name: String,
    pub endpoint: FakeEndpoint,
    pub session: FakeEndpoint,
}

impl FakeLink {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            endpoint: FakeEndpoint::new("link", log),
            session: FakeEndpoint::new("session", log),
        }
    }
}

impl Endpoint for FakeLink {
    fn local_state(&self) -> EndpointState {
        self.endpoint.local_state()
    }

    fn remote_state(&self) -> EndpointState {
        self.endpoint.remote_state()
    }

    fn condition(&self) -> Option<ErrorCondition> {
        self.endpoint.condition()
    }

    fn remote_condition(&self) -> Option<ErrorCondition> {
        self.endpoint.remote_condition()
    }

    fn set_condition(&mut self, condition: Option<ErrorCondition>) {
        self.endpoint.set_condition(condition);
    }

    fn open(&mut self) {
        self.endpoint.open();
    }

    fn close(&mut self) {
        self.endpoint.close();
    }
}

impl Link for FakeLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn session_mut(&mut self) -> &mut dyn Session {
        &mut self.session
    }
}

/// Items already available on `stream`, and whether it has completed.
pub fn ready_items<T>(stream: &mut BoxStream<'static, T>) -> (Vec<T>, bool) {
    let mut items = Vec::new();
    loop {
        match stream.next().now_or_never() {
            Some(Some(item)) => items.push(item),
            Some(None) => return (items, true),
            None => return (items, false),
        }
    }
}

/// Waits for the next item, failing the test after `wait`.
pub async fn next_within<T>(stream: &mut BoxStream<'static, T>, wait: Duration) -> Option<T> {
    tokio::time::timeout(wait, stream.next())
        .await
        .expect("stream produced nothing in time")
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
