use std::{
    cell::{Ref, RefCell},
    rc::Rc,
};

use tessera_cache::ResourceCache;
use tessera_core::{ConsumerId, LoadListener, TextureHandle};
use tessera_worker::{TickScheduler, run_tick};
use tracing::{debug, trace, warn};

use crate::{
    config::PipelineConfig, consumers::ConsumerRegistry, file::FileTable, leases::Leases,
    services::Services, source::SourceTable,
};

/// Single-threaded load pipeline.
///
/// Nothing happens until the host drives [`tick`](Self::tick), typically
/// once per frame. All state lives in `RefCell`s that are released before
/// any listener callback or task resume, so callbacks can call back in.
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) services: Services,
    pub(crate) cache: RefCell<ResourceCache>,
    pub(crate) scheduler: RefCell<TickScheduler<Pipeline>>,
    pub(crate) consumers: RefCell<ConsumerRegistry>,
    pub(crate) sources: RefCell<SourceTable>,
    pub(crate) files: RefCell<FileTable>,
    pub(crate) leases: RefCell<Leases>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("services", &self.services)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: Services) -> Self {
        let cache = ResourceCache::new(Rc::clone(services.surface()));
        Self {
            config,
            services,
            cache: RefCell::new(cache),
            scheduler: RefCell::new(TickScheduler::new()),
            consumers: RefCell::new(ConsumerRegistry::default()),
            sources: RefCell::new(SourceTable::default()),
            files: RefCell::new(FileTable::default()),
            leases: RefCell::new(Leases::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read access to the cache, for queries like `has_file`.
    ///
    /// Do not hold the guard across [`tick`](Self::tick).
    pub fn cache(&self) -> Ref<'_, ResourceCache> {
        self.cache.borrow()
    }

    pub fn register_consumer(&self, listener: Rc<dyn LoadListener>) -> ConsumerId {
        let id = self.consumers.borrow_mut().register(listener);
        debug!(consumer = id.0, "consumer registered");
        id
    }

    /// Unload every source `consumer` holds and forget its listener.
    pub fn unregister_consumer(&self, consumer: ConsumerId) {
        let sources = self.leases.borrow().sources_of(consumer);
        for source in sources {
            self.unload_source(consumer, &source);
        }
        if self.consumers.borrow_mut().remove(consumer) {
            debug!(consumer = consumer.0, "consumer unregistered");
        }
    }

    pub(crate) fn is_consumer(&self, consumer: ConsumerId) -> bool {
        self.consumers.borrow().contains(consumer)
    }

    /// Take a reference on a cached file for `consumer` and return its live
    /// texture, rebuilding it if the surface dropped it.
    pub fn acquire(&self, consumer: ConsumerId, source: &str, file: &str) -> Option<TextureHandle> {
        let texture = self.cache.borrow_mut().get(source, file)?;
        self.leases.borrow_mut().add(source, consumer, file);
        Some(texture)
    }

    /// Drop one reference `consumer` took on `file`.
    pub fn release_file(&self, consumer: ConsumerId, source: &str, file: &str) {
        if !self.leases.borrow_mut().take_one(source, consumer, file) {
            warn!(consumer = consumer.0, source, file, "release without a held reference");
            return;
        }
        self.cache.borrow_mut().release(source, file);
    }

    /// References `consumer` holds on `file`.
    #[must_use]
    pub fn references(&self, consumer: ConsumerId, source: &str, file: &str) -> u32 {
        self.leases.borrow().count(source, consumer, file)
    }

    /// Take a reference on each of `files` for `consumer`.
    pub(crate) fn pin_files(&self, consumer: ConsumerId, source: &str, files: &[String]) {
        for file in files {
            let texture = self.cache.borrow_mut().get(source, file);
            if texture.is_some() {
                self.leases.borrow_mut().add(source, consumer, file);
            }
        }
    }

    /// Invoke `f` on the listener of `consumer`, outside every borrow.
    pub(crate) fn notify<F>(&self, consumer: ConsumerId, f: F)
    where
        F: FnOnce(&dyn LoadListener),
    {
        let listener = self.consumers.borrow().get(consumer);
        match listener {
            Some(listener) => f(listener.as_ref()),
            None => trace!(consumer = consumer.0, "notification for unregistered consumer"),
        }
    }

    /// Run one scheduler tick. Returns the number of tasks resumed.
    pub fn tick(&self) -> usize {
        run_tick(&self.scheduler, self)
    }

    /// Tick until no task is pending or `max_ticks` ran. Returns the ticks run.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && !self.is_idle() {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduler.borrow().is_empty()
    }

    /// Ticks run so far.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.scheduler.borrow().now()
    }
}
