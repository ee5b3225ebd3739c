//! # Reactor Dispatch
//!
//! The only sanctioned way to get application work onto the reactor thread.
//! A [`DispatchTask`] wraps the work; a [`Dispatcher`] queues it immediately
//! or after a delay. [`ReactorDispatcher`] is the tokio implementation: timers
//! are spawned sleeps raced against their [`TimerHandle`], and due tasks land
//! on a channel drained in order by the single [`ReactorQueue`].

pub mod reactor;
pub mod task;

pub use reactor::{Dispatcher, ReactorDispatcher, ReactorQueue};
pub use task::{DispatchTask, TimerHandle};
