//! Tick scheduler.

use std::cell::RefCell;

use tracing::trace;

use crate::task::{FnTask, Resume, Task};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

struct Scheduled<C: ?Sized> {
    id: TaskId,
    due: u64,
    task: Box<dyn Task<C>>,
}

/// Owns the pending tasks for a context type `C`.
///
/// ## Normative
/// - `now` starts at 0 and advances by one per [`run_tick`].
/// - A task spawned while `now == n` is due at `n + delay` with `delay >= 1`.
/// - Due tasks run in spawn order (oldest first).
pub struct TickScheduler<C: ?Sized> {
    now: u64,
    next_id: u64,
    tasks: Vec<Scheduled<C>>,
}

impl<C: ?Sized> std::fmt::Debug for TickScheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("now", &self.now)
            .field("pending", &self.tasks.len())
            .finish()
    }
}

impl<C: ?Sized> Default for TickScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> TickScheduler<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: 0,
            next_id: 0,
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Schedule `task` for the next tick.
    pub fn spawn(&mut self, task: Box<dyn Task<C>>) -> TaskId {
        self.spawn_after(1, task)
    }

    /// Schedule `task` `delay` ticks from now.
    pub fn spawn_after(&mut self, delay: u32, task: Box<dyn Task<C>>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let due = self.now + u64::from(delay.max(1));
        trace!(task = task.name(), id = id.0, due, "spawn");
        self.tasks.push(Scheduled { id, due, task });
        id
    }

    fn take_due(&mut self) -> Vec<Scheduled<C>> {
        self.now += 1;
        let now = self.now;
        let (mut due, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.tasks).into_iter().partition(|s| s.due <= now);
        self.tasks = rest;
        due.sort_by_key(|s| s.id);
        due
    }

    fn reschedule(&mut self, mut scheduled: Scheduled<C>, resume: Resume) {
        match resume.delay() {
            Some(delay) => {
                scheduled.due = self.now + u64::from(delay);
                self.tasks.push(scheduled);
            }
            None => trace!(task = scheduled.task.name(), id = scheduled.id.0, "done"),
        }
    }
}

impl<C: ?Sized + 'static> TickScheduler<C> {
    /// Run `f` on the next tick.
    pub fn defer<F>(&mut self, name: &'static str, f: F) -> TaskId
    where
        F: FnOnce(&C) + 'static,
    {
        self.spawn(Box::new(FnTask::new(name, f)))
    }
}

/// Advance `scheduler` by one tick, resuming every due task against `cx`.
///
/// The scheduler is not borrowed while a task runs. Tasks spawned during the
/// tick land in the scheduler and are due no earlier than the next tick.
/// Returns the number of tasks resumed.
pub fn run_tick<C: ?Sized>(scheduler: &RefCell<TickScheduler<C>>, cx: &C) -> usize {
    let due = scheduler.borrow_mut().take_due();
    let count = due.len();
    for mut scheduled in due {
        let resume = scheduled.task.resume(cx);
        scheduler.borrow_mut().reschedule(scheduled, resume);
    }
    count
}
