//! In-memory engine objects and dispatchers for unit tests.

use super::*;
use crate::common::DispatchError;
use crate::dispatch::{DispatchTask, Dispatcher, TimerHandle};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockEndpoint {
    pub local: EndpointState,
    pub remote: EndpointState,
    pub condition: Option<ErrorCondition>,
    pub remote_condition: Option<ErrorCondition>,
    pub open_calls: usize,
    pub close_calls: usize,
    pub set_condition_calls: usize,
}

impl MockEndpoint {
    pub fn with_states(local: EndpointState, remote: EndpointState) -> Self {
        Self {
            local,
            remote,
            ..Self::default()
        }
    }
}

macro_rules! delegate_endpoint {
    ($ty:ty) => {
        impl Endpoint for $ty {
            fn local_state(&self) -> EndpointState {
                self.endpoint.local
            }
            fn remote_state(&self) -> EndpointState {
                self.endpoint.remote
            }
            fn condition(&self) -> Option<ErrorCondition> {
                self.endpoint.condition.clone()
            }
            fn remote_condition(&self) -> Option<ErrorCondition> {
                self.endpoint.remote_condition.clone()
            }
            fn set_condition(&mut self, condition: Option<ErrorCondition>) {
                self.endpoint.set_condition_calls += 1;
                self.endpoint.condition = condition;
            }
            fn open(&mut self) {
                self.endpoint.open_calls += 1;
                self.endpoint.local = EndpointState::Active;
            }
            fn close(&mut self) {
                self.endpoint.close_calls += 1;
                self.endpoint.local = EndpointState::Closed;
            }
        }
    };
}

#[derive(Debug, Default)]
pub struct MockTransport {
    pub condition: Option<ErrorCondition>,
    pub unbind_calls: usize,
    pub tls: Option<TlsSettings>,
}

impl Transport for MockTransport {
    fn condition(&self) -> Option<ErrorCondition> {
        self.condition.clone()
    }

    fn unbind(&mut self) {
        self.unbind_calls += 1;
    }

    fn configure_tls(&mut self, settings: TlsSettings) {
        self.tls = Some(settings);
    }
}

#[derive(Debug, Default)]
pub struct MockConnection {
    pub endpoint: MockEndpoint,
    pub hostname: Option<String>,
    pub container: Option<String>,
    pub properties: HashMap<String, String>,
    pub free_calls: usize,
    pub transport: Option<MockTransport>,
}

impl MockConnection {
    pub fn with_transport() -> Self {
        Self {
            transport: Some(MockTransport::default()),
            ..Self::default()
        }
    }

    pub fn transport(&self) -> &MockTransport {
        self.transport.as_ref().expect("mock connection has a transport")
    }
}

delegate_endpoint!(MockConnection);

impl Connection for MockConnection {
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
        self.free_calls += 1;
    }

    fn transport_mut(&mut self) -> Option<&mut dyn Transport> {
        self.transport.as_mut().map(|t| t as &mut dyn Transport)
    }
}

#[derive(Debug, Default)]
pub struct MockSession {
    pub endpoint: MockEndpoint,
}

delegate_endpoint!(MockSession);

impl Session for MockSession {}

#[derive(Debug, Default)]
pub struct MockLink {
    pub name: String,
    pub endpoint: MockEndpoint,
    pub session: MockSession,
}

delegate_endpoint!(MockLink);

impl Link for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn session_mut(&mut self) -> &mut dyn Session {
        &mut self.session
    }
}

/// Dispatcher whose reactor I/O has faulted.
pub struct FaultedDispatcher;

impl Dispatcher for FaultedDispatcher {
    fn invoke(&self, task: DispatchTask) -> Result<(), DispatchError> {
        Err(DispatchError::IoFaulted {
            task: task.name().to_string(),
        })
    }

    fn schedule(&self, task: DispatchTask, _delay: Duration) -> Result<TimerHandle, DispatchError> {
        Err(DispatchError::IoFaulted {
            task: task.name().to_string(),
        })
    }
}

/// Dispatcher that keeps scheduled tasks until the test fires them.
#[derive(Default)]
pub struct ManualDispatcher {
    scheduled: Mutex<Vec<(DispatchTask, Duration, TimerHandle)>>,
}

impl ManualDispatcher {
    pub fn delays(&self) -> Vec<Duration> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(_, delay, _)| *delay)
            .collect()
    }

    pub fn handles(&self) -> Vec<TimerHandle> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, handle)| handle.clone())
            .collect()
    }

    /// Runs every scheduled task that was not cancelled; returns how many ran.
    pub fn fire_all(&self) -> usize {
        let due: Vec<_> = self.scheduled.lock().unwrap().drain(..).collect();
        let mut ran = 0;
        for (task, _, handle) in due {
            if !handle.is_cancelled() {
                task.run();
                ran += 1;
            }
        }
        ran
    }
}

impl Dispatcher for ManualDispatcher {
    fn invoke(&self, task: DispatchTask) -> Result<(), DispatchError> {
        task.run();
        Ok(())
    }

    fn schedule(&self, task: DispatchTask, delay: Duration) -> Result<TimerHandle, DispatchError> {
        let handle = TimerHandle::new();
        self.scheduled
            .lock()
            .unwrap()
            .push((task, delay, handle.clone()));
        Ok(handle)
    }
}
