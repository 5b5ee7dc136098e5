//! Task trait and step results.

/// What a task wants after one `resume`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Run again on the next tick.
    Yield,
    /// Run again after this many ticks (0 behaves like 1).
    Sleep(u32),
    /// Finished; the scheduler drops the task.
    Done,
}

impl Resume {
    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, Resume::Done)
    }

    /// Ticks until the next resume, `None` when done.
    #[must_use]
    pub fn delay(self) -> Option<u32> {
        match self {
            Resume::Yield => Some(1),
            Resume::Sleep(n) => Some(n.max(1)),
            Resume::Done => None,
        }
    }
}

/// A unit of work resumed once per due tick.
///
/// Implementors keep their own state between resumes and must bound the work
/// done per call.
pub trait Task<C: ?Sized> {
    fn resume(&mut self, cx: &C) -> Resume;

    /// Label used in trace output.
    fn name(&self) -> &'static str {
        "task"
    }
}

/// One-shot task wrapping a closure. Used for deferred notifications.
pub struct FnTask<F> {
    name: &'static str,
    f: Option<F>,
}

impl<F> FnTask<F> {
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f: Some(f) }
    }
}

impl<C: ?Sized, F: FnOnce(&C)> Task<C> for FnTask<F> {
    fn resume(&mut self, cx: &C) -> Resume {
        if let Some(f) = self.f.take() {
            f(cx);
        }
        Resume::Done
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
