//! Priority queue of pending entry decodes.

use tessera_core::EntryAddress;

/// Flat queue of `(entry, priority)`.
///
/// `pop_highest` scans linearly and takes the first strictly greater
/// priority, so equal priorities leave in enqueue order. `raise` updates a
/// queued entry in place and keeps its position.
#[derive(Debug, Default)]
pub struct FileQueue {
    items: Vec<(EntryAddress, i32)>,
}

impl FileQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, addr: &EntryAddress) -> bool {
        self.items.iter().any(|(a, _)| a == addr)
    }

    #[must_use]
    pub fn priority(&self, addr: &EntryAddress) -> Option<i32> {
        self.items.iter().find(|(a, _)| a == addr).map(|(_, p)| *p)
    }

    /// Enqueue `addr`, or raise it if already queued.
    pub fn push(&mut self, addr: EntryAddress, priority: i32) {
        if !self.raise(&addr, priority) && !self.contains(&addr) {
            self.items.push((addr, priority));
        }
    }

    /// Raise a queued entry to `priority`. Never lowers. Returns whether the
    /// priority changed.
    pub fn raise(&mut self, addr: &EntryAddress, priority: i32) -> bool {
        match self.items.iter_mut().find(|(a, _)| a == addr) {
            Some((_, current)) if priority > *current => {
                *current = priority;
                true
            }
            _ => false,
        }
    }

    pub fn pop_highest(&mut self) -> Option<(EntryAddress, i32)> {
        let mut best: Option<(usize, i32)> = None;
        for (index, (_, priority)) in self.items.iter().enumerate() {
            if best.is_none_or(|(_, p)| *priority > p) {
                best = Some((index, *priority));
            }
        }
        best.map(|(index, _)| self.items.remove(index))
    }
}
