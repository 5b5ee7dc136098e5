//! Source-level coordination: coalescing, cache hits, completion fan-out.

use std::{collections::HashMap, rc::Rc};

use tessera_archive::ChunkedArchive;
use tessera_core::{ConsumerId, LoadResult, SourceKind, SourceOptions};
use tracing::{debug, info, trace, warn};

use crate::{loaders, pipeline::Pipeline};

struct InFlight {
    kind: SourceKind,
    waiters: Vec<ConsumerId>,
}

pub(crate) struct LoadedSource {
    pub(crate) kind: SourceKind,
    pub(crate) files: Vec<String>,
    pub(crate) archive: Option<Rc<ChunkedArchive>>,
}

/// What a loader hands back on success.
pub(crate) struct SourceOutput {
    pub(crate) files: Vec<String>,
    pub(crate) archive: Option<Rc<ChunkedArchive>>,
}

impl SourceOutput {
    pub(crate) fn from_files(files: Vec<String>) -> Self {
        Self {
            files,
            archive: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct SourceTable {
    in_flight: HashMap<String, InFlight>,
    loaded: HashMap<String, LoadedSource>,
}

impl SourceTable {
    pub(crate) fn archive(&self, source: &str) -> Option<Rc<ChunkedArchive>> {
        self.loaded.get(source).and_then(|l| l.archive.clone())
    }

    pub(crate) fn is_loaded(&self, source: &str) -> bool {
        self.loaded.contains_key(source)
    }
}

impl Pipeline {
    /// Ask for `source` on behalf of `consumer`.
    ///
    /// Returns `false` when the consumer or the source is unknown. An accepted
    /// request always ends in exactly one success or error callback, on a
    /// later tick.
    pub fn load_source(
        &self,
        consumer: ConsumerId,
        source: &str,
        kind: SourceKind,
        options: SourceOptions,
    ) -> bool {
        if !self.is_consumer(consumer) {
            warn!(consumer = consumer.0, source, "load from unregistered consumer");
            return false;
        }
        if !self.services.registry().is_registered(source) {
            warn!(source, "load of unregistered source");
            return false;
        }
        self.leases.borrow_mut().hold(source, consumer);

        let hit = {
            let mut sources = self.sources.borrow_mut();
            if let Some(job) = sources.in_flight.get_mut(source) {
                if !job.waiters.contains(&consumer) {
                    job.waiters.push(consumer);
                }
                debug!(source, consumer = consumer.0, waiters = job.waiters.len(), "joined in-flight load");
                return true;
            }

            let hit = sources.loaded.get(source).and_then(|loaded| {
                let cached = match loaded.kind {
                    SourceKind::Chunked => loaded.archive.is_some(),
                    _ => !loaded.files.is_empty() && self.cache.borrow().has_source(source),
                };
                cached.then(|| (loaded.kind, loaded.files.clone()))
            });
            if hit.is_none() && sources.loaded.remove(source).is_some() {
                debug!(source, "cached source was emptied, reloading");
            }
            if hit.is_none() {
                sources.in_flight.insert(
                    source.to_string(),
                    InFlight {
                        kind,
                        waiters: vec![consumer],
                    },
                );
            }
            hit
        };

        match hit {
            Some((loaded_kind, files)) => {
                if loaded_kind != kind {
                    warn!(source, requested = %kind, loaded = %loaded_kind, "source already loaded as another kind");
                }
                self.defer_source_hit(consumer, source.to_string(), loaded_kind, files);
            }
            None => {
                info!(source, %kind, "loading source");
                let task = loaders::for_kind(kind, source.to_string(), options);
                self.scheduler.borrow_mut().spawn(task);
            }
        }
        true
    }

    fn defer_source_hit(
        &self,
        consumer: ConsumerId,
        source: String,
        kind: SourceKind,
        files: Vec<String>,
    ) {
        trace!(source = %source, consumer = consumer.0, "cache hit, deferring notification");
        self.scheduler
            .borrow_mut()
            .defer("source-hit", move |p: &Pipeline| {
                if !p.leases.borrow().is_held(&source, consumer) {
                    trace!(source = %source, "consumer unloaded before hit delivery");
                    return;
                }
                if kind != SourceKind::Chunked {
                    p.pin_files(consumer, &source, &files);
                }
                p.notify(consumer, |l| l.on_source_load_success(&source, &files));
            });
    }

    /// Stop `consumer`'s interest in `source`.
    ///
    /// Removes it from every waiter list of the source, releases every cache
    /// reference it holds there, and once nobody holds the source drops the
    /// loaded record and whatever the cache still keeps unreferenced. Loads
    /// and decodes already in flight keep running for remaining waiters.
    pub fn unload_source(&self, consumer: ConsumerId, source: &str) {
        {
            let mut sources = self.sources.borrow_mut();
            if let Some(job) = sources.in_flight.get_mut(source) {
                job.waiters = std::mem::take(&mut job.waiters)
                    .into_iter()
                    .filter(|c| *c != consumer)
                    .collect();
            }
        }
        self.files.borrow_mut().drop_consumer(source, consumer);

        let held = self.leases.borrow_mut().drop_consumer(source, consumer);
        {
            let mut cache = self.cache.borrow_mut();
            for (file, count) in &held {
                for _ in 0..*count {
                    cache.release(source, file);
                }
            }
        }
        debug!(source, consumer = consumer.0, released = held.len(), "source unloaded");

        let abandoned = !self.leases.borrow().has_holders(source)
            && !self.sources.borrow().in_flight.contains_key(source);
        if abandoned {
            self.forget_source(source);
        }
    }

    fn forget_source(&self, source: &str) {
        self.sources.borrow_mut().loaded.remove(source);
        if self.cache.borrow_mut().evict_unused(source) {
            debug!(source, "unreferenced entries evicted");
        }
    }

    /// Loader completion for `source`.
    pub(crate) fn finish_source(&self, source: &str, outcome: LoadResult<SourceOutput>) {
        let job = self.sources.borrow_mut().in_flight.remove(source);
        let Some(job) = job else {
            warn!(source, "completion for a source that is not loading");
            return;
        };

        match outcome {
            Ok(output) => {
                info!(source, files = output.files.len(), waiters = job.waiters.len(), "source loaded");
                self.sources.borrow_mut().loaded.insert(
                    source.to_string(),
                    LoadedSource {
                        kind: job.kind,
                        files: output.files.clone(),
                        archive: output.archive,
                    },
                );
                if job.kind != SourceKind::Chunked {
                    for consumer in &job.waiters {
                        self.pin_files(*consumer, source, &output.files);
                    }
                }
                if !self.leases.borrow().has_holders(source) {
                    self.forget_source(source);
                }
                for consumer in job.waiters {
                    if self.leases.borrow().is_held(source, consumer) {
                        self.notify(consumer, |l| l.on_source_load_success(source, &output.files));
                    }
                }
            }
            Err(error) => {
                warn!(source, %error, waiters = job.waiters.len(), "source load failed");
                self.cache.borrow_mut().evict_unused(source);
                for consumer in job.waiters {
                    if self.leases.borrow().is_held(source, consumer) {
                        self.notify(consumer, |l| l.on_source_load_error(source, &error));
                    }
                }
            }
        }
    }

    pub(crate) fn report_progress(&self, source: &str, fraction: f32) {
        let waiters = self
            .sources
            .borrow()
            .in_flight
            .get(source)
            .map(|job| job.waiters.clone())
            .unwrap_or_default();
        for consumer in waiters {
            self.notify(consumer, |l| l.on_source_load_progress(source, fraction));
        }
    }
}
