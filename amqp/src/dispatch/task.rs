use std::fmt;
use tokio_util::sync::CancellationToken;

/// A unit of application work to run on the reactor thread.
pub struct DispatchTask {
    name: String,
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl DispatchTask {
    pub fn new<F>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            work: Box::new(work),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(self) {
        log::trace!("Running dispatch task '{}'", self.name);
        (self.work)();
    }
}

impl fmt::Debug for DispatchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handle to a scheduled task. Cancelling it before the delay elapses keeps
/// the task from ever reaching the reactor queue.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
