use std::{collections::HashMap, rc::Rc};

use tessera_core::{ConsumerId, LoadListener};

/// Registered listeners by id.
#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    next: u64,
    listeners: HashMap<ConsumerId, Rc<dyn LoadListener>>,
}

impl ConsumerRegistry {
    pub(crate) fn register(&mut self, listener: Rc<dyn LoadListener>) -> ConsumerId {
        let id = ConsumerId(self.next);
        self.next += 1;
        self.listeners.insert(id, listener);
        id
    }

    pub(crate) fn remove(&mut self, id: ConsumerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: ConsumerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub(crate) fn get(&self, id: ConsumerId) -> Option<Rc<dyn LoadListener>> {
        self.listeners.get(&id).cloned()
    }
}
