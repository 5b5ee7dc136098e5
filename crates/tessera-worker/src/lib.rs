//! Cooperative task primitives for the tessera pipeline.
//!
//! - **`Task`**: a manually driven state machine. Each `resume` does a bounded
//!   slice of work and answers with a [`Resume`]: run again next tick, sleep
//!   for N ticks, or done.
//! - **`TickScheduler`**: owns the tasks and decides which are due on a tick.
//!   [`run_tick`] drives one tick against a shared context without holding the
//!   scheduler borrow while tasks run, so tasks may spawn further tasks.
//! - **`poll_once`**: polls a collaborator future exactly once with a no-op
//!   waker. Waiting on a collaborator is therefore a `Resume::Yield`.
//!
//! A task spawned during tick `n` never runs before tick `n + 1`.

#![forbid(unsafe_code)]

mod poll;
mod scheduler;
mod task;

pub use poll::poll_once;
pub use scheduler::{TaskId, TickScheduler, run_tick};
pub use task::{FnTask, Resume, Task};
