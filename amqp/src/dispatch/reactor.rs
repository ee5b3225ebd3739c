use super::task::{DispatchTask, TimerHandle};
use crate::common::DispatchError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Schedules work onto the single reactor thread.
///
/// Both operations fail synchronously once the reactor can no longer accept
/// work; callers must treat that as fatal for whatever they were arming.
pub trait Dispatcher: Send + Sync {
    /// Queues `task` to run on the reactor as soon as possible.
    fn invoke(&self, task: DispatchTask) -> Result<(), DispatchError>;

    /// Queues `task` to run on the reactor once `delay` has elapsed.
    fn schedule(&self, task: DispatchTask, delay: Duration) -> Result<TimerHandle, DispatchError>;
}

/// Tokio-backed dispatcher feeding a [`ReactorQueue`].
#[derive(Debug, Clone)]
pub struct ReactorDispatcher {
    sender: flume::Sender<DispatchTask>,
}

/// The reactor side of a [`ReactorDispatcher`]: drains queued tasks in order.
///
/// Dropping the queue faults the dispatcher; later `invoke`/`schedule` calls
/// return [`DispatchError::IoFaulted`].
pub struct ReactorQueue {
    receiver: flume::Receiver<DispatchTask>,
    shutdown: CancellationToken,
}

impl ReactorDispatcher {
    pub fn new() -> (ReactorDispatcher, ReactorQueue) {
        let (sender, receiver) = flume::unbounded();
        (
            ReactorDispatcher { sender },
            ReactorQueue {
                receiver,
                shutdown: CancellationToken::new(),
            },
        )
    }

    pub fn is_faulted(&self) -> bool {
        self.sender.is_disconnected()
    }

    fn io_faulted(task: &DispatchTask) -> DispatchError {
        DispatchError::IoFaulted {
            task: task.name().to_string(),
        }
    }
}

impl Dispatcher for ReactorDispatcher {
    fn invoke(&self, task: DispatchTask) -> Result<(), DispatchError> {
        self.sender
            .send(task)
            .map_err(|e| Self::io_faulted(&e.into_inner()))
    }

    fn schedule(&self, task: DispatchTask, delay: Duration) -> Result<TimerHandle, DispatchError> {
        if self.is_faulted() {
            return Err(Self::io_faulted(&task));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DispatchError::NoRuntime {
            task: task.name().to_string(),
        })?;

        let handle = TimerHandle::new();
        let token = handle.token();
        let sender = self.sender.clone();

        runtime.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    log::trace!("Timer for '{}' cancelled", task.name());
                }
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = sender.send(task) {
                        log::warn!(
                            "Reactor queue closed before timer for '{}' fired",
                            e.into_inner().name()
                        );
                    }
                }
            }
        });

        Ok(handle)
    }
}

impl ReactorQueue {
    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs every task already queued, in order, and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task.run();
            ran += 1;
        }
        ran
    }

    /// Runs tasks as they arrive until shutdown or until every dispatcher is dropped.
    pub async fn run(self) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    log::debug!("Reactor queue shutting down");
                    break;
                }
                task = self.receiver.recv_async() => match task {
                    Ok(task) => task.run(),
                    Err(_) => {
                        log::debug!("All dispatchers dropped, reactor queue exiting");
                        break;
                    }
                },
            }
        }
    }
}
