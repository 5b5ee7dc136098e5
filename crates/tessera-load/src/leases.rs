//! Per-consumer references into the cache.

use std::collections::HashMap;

use tessera_core::ConsumerId;

/// Which consumer holds which source, and how many cache references it took
/// on each of the source's files.
///
/// A consumer holds a source from `load_source` until `unload_source`, with
/// or without file references.
#[derive(Debug, Default)]
pub(crate) struct Leases {
    by_source: HashMap<String, HashMap<ConsumerId, HashMap<String, u32>>>,
}

impl Leases {
    pub(crate) fn hold(&mut self, source: &str, consumer: ConsumerId) {
        self.by_source
            .entry(source.to_string())
            .or_default()
            .entry(consumer)
            .or_default();
    }

    pub(crate) fn is_held(&self, source: &str, consumer: ConsumerId) -> bool {
        self.by_source
            .get(source)
            .is_some_and(|holders| holders.contains_key(&consumer))
    }

    pub(crate) fn has_holders(&self, source: &str) -> bool {
        self.by_source
            .get(source)
            .is_some_and(|holders| !holders.is_empty())
    }

    /// Record one more reference on `file`.
    pub(crate) fn add(&mut self, source: &str, consumer: ConsumerId, file: &str) {
        *self
            .by_source
            .entry(source.to_string())
            .or_default()
            .entry(consumer)
            .or_default()
            .entry(file.to_string())
            .or_default() += 1;
    }

    /// Drop one reference on `file`. Returns `false` if none was held.
    pub(crate) fn take_one(&mut self, source: &str, consumer: ConsumerId, file: &str) -> bool {
        let Some(files) = self
            .by_source
            .get_mut(source)
            .and_then(|holders| holders.get_mut(&consumer))
        else {
            return false;
        };
        match files.get_mut(file) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                files.remove(file);
                true
            }
            None => false,
        }
    }

    /// Forget `consumer` on `source`, returning its references.
    pub(crate) fn drop_consumer(&mut self, source: &str, consumer: ConsumerId) -> Vec<(String, u32)> {
        let Some(holders) = self.by_source.get_mut(source) else {
            return Vec::new();
        };
        let files = holders.remove(&consumer).unwrap_or_default();
        if holders.is_empty() {
            self.by_source.remove(source);
        }
        files.into_iter().collect()
    }

    pub(crate) fn sources_of(&self, consumer: ConsumerId) -> Vec<String> {
        let mut sources: Vec<String> = self
            .by_source
            .iter()
            .filter(|(_, holders)| holders.contains_key(&consumer))
            .map(|(source, _)| source.clone())
            .collect();
        sources.sort();
        sources
    }

    pub(crate) fn count(&self, source: &str, consumer: ConsumerId, file: &str) -> u32 {
        self.by_source
            .get(source)
            .and_then(|holders| holders.get(&consumer))
            .and_then(|files| files.get(file))
            .copied()
            .unwrap_or(0)
    }
}
