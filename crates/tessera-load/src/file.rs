//! Entry-level coordination for chunked archives.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
    task::Poll,
};

use bytes::Bytes;
use tessera_archive::{ChunkedArchive, EntryBody, FileDescriptor, RowCopier, patch_copier};
use tessera_cache::{NewFile, RawShadow};
use tessera_core::{
    Channel, ConsumerId, EntryAddress, FileMetadata, LoadError, LoadResult, ServiceFuture,
    SourceKind, TextureDesc,
};
use tessera_worker::{Resume, Task, poll_once};
use tracing::{debug, trace, warn};

use crate::{pipeline::Pipeline, queue::FileQueue};

/// Times a patch goes back to the queue because its base was evicted.
const MAX_BASE_REQUEUES: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Waiter {
    pub(crate) consumer: ConsumerId,
    pub(crate) channel: Option<Channel>,
}

struct FileJob {
    source: String,
    file: String,
    priority: i32,
    waiters: Vec<Waiter>,
    archive: Rc<ChunkedArchive>,
    requeues: u32,
}

/// Pending entry decodes. At most one is active.
#[derive(Default)]
pub(crate) struct FileTable {
    jobs: HashMap<EntryAddress, FileJob>,
    queue: FileQueue,
    active: Option<EntryAddress>,
    pump_scheduled: bool,
    /// Entries whose last decode failed; never decoded again on a
    /// dependent's behalf.
    failed: HashSet<EntryAddress>,
}

impl FileTable {
    pub(crate) fn drop_consumer(&mut self, source: &str, consumer: ConsumerId) {
        for job in self.jobs.values_mut().filter(|j| j.source == source) {
            job.waiters = std::mem::take(&mut job.waiters)
                .into_iter()
                .filter(|w| w.consumer != consumer)
                .collect();
        }
    }
}

fn entry_error(archive: &ChunkedArchive, source: &str, file: &str) -> Option<LoadError> {
    if archive.descriptor(file).is_some() {
        return None;
    }
    Some(
        archive
            .rejection(file)
            .cloned()
            .unwrap_or_else(|| LoadError::UnknownFile {
                source_url: source.to_string(),
                file: file.to_string(),
            }),
    )
}

impl Pipeline {
    /// Ask for one entry of a loaded chunked source.
    ///
    /// `channel` is echoed back in the completion callback. A repeated
    /// request for an entry already queued joins it and can only raise its
    /// priority. Returns `false` when the consumer is unknown or the source
    /// has no chunk table loaded.
    pub fn load_file(
        &self,
        consumer: ConsumerId,
        source: &str,
        file: &str,
        priority: i32,
        channel: Option<Channel>,
    ) -> bool {
        if !self.is_consumer(consumer) {
            warn!(consumer = consumer.0, source, file, "file load from unregistered consumer");
            return false;
        }
        let archive = self.sources.borrow().archive(source);
        let Some(archive) = archive else {
            warn!(source, file, "file requested before its chunked source loaded");
            return false;
        };
        let waiter = Waiter { consumer, channel };

        if self.cache.borrow().has_file(source, file) {
            self.defer_file_hit(waiter, source.to_string(), file.to_string(), priority);
            return true;
        }

        let addr = EntryAddress::new(SourceKind::Chunked, source, file);
        let joined = {
            let mut files = self.files.borrow_mut();
            let table = &mut *files;
            table.jobs.get_mut(&addr).map(|job| {
                if !job.waiters.contains(&waiter) {
                    job.waiters.push(waiter);
                }
                let raised = priority > job.priority;
                if raised {
                    job.priority = priority;
                    table.queue.raise(&addr, priority);
                }
                raised && table.queue.contains(&addr)
            })
        };
        if let Some(raised) = joined {
            debug!(source, file, priority, raised, "joined queued file");
            if raised {
                self.boost_ancestors(&archive, source, file, priority);
            }
            return true;
        }

        if let Some(error) = entry_error(&archive, source, file) {
            self.defer_file_error(vec![waiter], source.to_string(), file.to_string(), error);
            return true;
        }
        let chain = archive.ancestors(file, |base| self.cache.borrow().has_file(source, base));
        let chain = match chain {
            Ok(chain) => chain,
            Err(error) => {
                warn!(source, file, %error, "dependency chain unresolved");
                self.defer_file_error(vec![waiter], source.to_string(), file.to_string(), error);
                return true;
            }
        };

        {
            let mut files = self.files.borrow_mut();
            files.failed.remove(&addr);
            files.jobs.insert(
                addr.clone(),
                FileJob {
                    source: source.to_string(),
                    file: file.to_string(),
                    priority,
                    waiters: vec![waiter],
                    archive: Rc::clone(&archive),
                    requeues: 0,
                },
            );
            files.queue.push(addr, priority);
        }
        debug!(source, file, priority, ancestors = chain.len(), "file queued");
        self.enqueue_ancestors(&archive, source, &chain, priority);
        self.request_pump();
        true
    }

    /// Priority of a queued or active entry decode.
    #[must_use]
    pub fn file_priority(&self, source: &str, file: &str) -> Option<i32> {
        let addr = EntryAddress::new(SourceKind::Chunked, source, file);
        self.files.borrow().jobs.get(&addr).map(|job| job.priority)
    }

    fn boost_ancestors(&self, archive: &Rc<ChunkedArchive>, source: &str, file: &str, priority: i32) {
        let chain = archive.ancestors(file, |base| self.cache.borrow().has_file(source, base));
        match chain {
            Ok(chain) => self.enqueue_ancestors(archive, source, &chain, priority),
            Err(error) => debug!(source, file, %error, "no ancestors to boost"),
        }
    }

    /// Queue `chain` (nearest base first) above `priority`; the farthest base
    /// gets the highest priority so it decodes first.
    fn enqueue_ancestors(
        &self,
        archive: &Rc<ChunkedArchive>,
        source: &str,
        chain: &[String],
        priority: i32,
    ) {
        let mut files = self.files.borrow_mut();
        let table = &mut *files;
        for (distance, base) in chain.iter().enumerate() {
            let step = i32::try_from(distance).unwrap_or(i32::MAX).saturating_add(1);
            let boosted = priority.saturating_add(step);
            let addr = EntryAddress::new(SourceKind::Chunked, source, base.as_str());
            match table.jobs.get_mut(&addr) {
                Some(job) => {
                    if boosted > job.priority {
                        job.priority = boosted;
                        table.queue.raise(&addr, boosted);
                    }
                }
                None => {
                    trace!(source, base = %base, priority = boosted, "base queued");
                    table.jobs.insert(
                        addr.clone(),
                        FileJob {
                            source: source.to_string(),
                            file: base.clone(),
                            priority: boosted,
                            waiters: Vec::new(),
                            archive: Rc::clone(archive),
                            requeues: 0,
                        },
                    );
                    table.queue.push(addr, boosted);
                }
            }
        }
    }

    fn defer_file_hit(&self, waiter: Waiter, source: String, file: String, priority: i32) {
        trace!(source = %source, file = %file, "file cached, deferring notification");
        self.scheduler
            .borrow_mut()
            .defer("file-hit", move |p: &Pipeline| {
                let texture = p.cache.borrow_mut().get(&source, &file);
                if texture.is_none() {
                    debug!(source = %source, file = %file, "cached file vanished, requeueing");
                    p.load_file(waiter.consumer, &source, &file, priority, waiter.channel);
                    return;
                }
                p.leases.borrow_mut().add(&source, waiter.consumer, &file);
                p.notify(waiter.consumer, |l| {
                    l.on_file_load_success(&source, &file, waiter.channel);
                });
            });
    }

    fn defer_file_error(&self, waiters: Vec<Waiter>, source: String, file: String, error: LoadError) {
        self.scheduler
            .borrow_mut()
            .defer("file-error", move |p: &Pipeline| {
                for waiter in waiters {
                    p.notify(waiter.consumer, |l| {
                        l.on_file_load_error(&source, &file, waiter.channel, &error);
                    });
                }
            });
    }

    /// Pop on the next tick, so every request made during this one competes.
    fn request_pump(&self) {
        {
            let mut files = self.files.borrow_mut();
            if files.active.is_some() || files.pump_scheduled {
                return;
            }
            files.pump_scheduled = true;
        }
        self.scheduler.borrow_mut().defer("file-pump", |p: &Pipeline| {
            p.files.borrow_mut().pump_scheduled = false;
            p.pump_files();
        });
    }

    /// Start the highest-priority queued decode unless one is active.
    fn pump_files(&self) {
        let task = {
            let mut files = self.files.borrow_mut();
            let table = &mut *files;
            if table.active.is_some() {
                return;
            }
            let mut next = None;
            while let Some((addr, priority)) = table.queue.pop_highest() {
                if let Some(job) = table.jobs.get(&addr) {
                    trace!(source = %job.source, file = %job.file, priority, "decode started");
                    next = Some(FileDecodeTask::new(
                        addr.clone(),
                        job.source.clone(),
                        job.file.clone(),
                        Rc::clone(&job.archive),
                    ));
                    table.active = Some(addr);
                    break;
                }
            }
            next
        };
        if let Some(task) = task {
            self.scheduler.borrow_mut().spawn(Box::new(task));
        }
    }

    /// Put the active decode at `addr` back in the queue behind a fresh decode
    /// of its evicted base. Returns `false` once the job ran out of requeues.
    fn requeue_for_base(&self, addr: &EntryAddress, base: &str) -> bool {
        let requeued = {
            let mut files = self.files.borrow_mut();
            let table = &mut *files;
            match table.jobs.get_mut(addr) {
                Some(job) if job.requeues < MAX_BASE_REQUEUES => {
                    job.requeues += 1;
                    table.queue.push(addr.clone(), job.priority);
                    if table.active.as_ref() == Some(addr) {
                        table.active = None;
                    }
                    Some((
                        Rc::clone(&job.archive),
                        job.source.clone(),
                        job.file.clone(),
                        job.priority,
                    ))
                }
                _ => None,
            }
        };
        let Some((archive, source, file, priority)) = requeued else {
            return false;
        };
        debug!(source = %source, file = %file, base, priority, "base evicted, requeued");
        self.boost_ancestors(&archive, &source, &file, priority);
        self.pump_files();
        true
    }

    fn finish_file(&self, addr: &EntryAddress, outcome: LoadResult<()>) {
        let job = {
            let mut files = self.files.borrow_mut();
            if files.active.as_ref() == Some(addr) {
                files.active = None;
            }
            match &outcome {
                Ok(()) => files.failed.remove(addr),
                Err(_) => files.failed.insert(addr.clone()),
            };
            files.jobs.remove(addr)
        };

        if let Some(job) = job {
            match outcome {
                Ok(()) => {
                    debug!(source = %job.source, file = %job.file, waiters = job.waiters.len(), "file loaded");
                    for waiter in &job.waiters {
                        let texture = self.cache.borrow_mut().get(&job.source, &job.file);
                        if texture.is_some() {
                            self.leases
                                .borrow_mut()
                                .add(&job.source, waiter.consumer, &job.file);
                        }
                    }
                    for waiter in &job.waiters {
                        self.notify(waiter.consumer, |l| {
                            l.on_file_load_success(&job.source, &job.file, waiter.channel);
                        });
                    }
                }
                Err(error) => {
                    warn!(source = %job.source, file = %job.file, %error, "file load failed");
                    for waiter in &job.waiters {
                        self.notify(waiter.consumer, |l| {
                            l.on_file_load_error(&job.source, &job.file, waiter.channel, &error);
                        });
                    }
                }
            }
            if !self.sources.borrow().is_loaded(&job.source) {
                self.cache.borrow_mut().evict_unused(&job.source);
            }
        }
        self.pump_files();
    }
}

enum DecodeState {
    Start,
    Decompressing(ServiceFuture<LoadResult<Bytes>>),
    Patching { copier: RowCopier, stream: Bytes },
    Store(Bytes),
    Done,
}

/// Decompress, rebuild and store one chunked entry.
struct FileDecodeTask {
    addr: EntryAddress,
    source: String,
    file: String,
    archive: Rc<ChunkedArchive>,
    state: DecodeState,
}

impl FileDecodeTask {
    fn new(addr: EntryAddress, source: String, file: String, archive: Rc<ChunkedArchive>) -> Self {
        Self {
            addr,
            source,
            file,
            archive,
            state: DecodeState::Start,
        }
    }

    fn unknown(&self) -> LoadError {
        LoadError::UnknownFile {
            source_url: self.source.clone(),
            file: self.file.clone(),
        }
    }

    fn step(&mut self, p: &Pipeline) -> LoadResult<Resume> {
        let archive = Rc::clone(&self.archive);
        let descriptor = archive.descriptor(&self.file).ok_or_else(|| self.unknown())?;

        match std::mem::replace(&mut self.state, DecodeState::Done) {
            DecodeState::Start => {
                if self.requeue_if_base_evicted(p, descriptor) {
                    return Ok(Resume::Done);
                }
                let (chunk, size) = archive.chunk(&self.file).ok_or_else(|| self.unknown())?;
                let decompressor = p.services.decompressor()?;
                self.state = DecodeState::Decompressing(decompressor.decompress(chunk, size));
                Ok(Resume::Yield)
            }
            DecodeState::Decompressing(mut fut) => match poll_once(&mut fut) {
                Poll::Pending => {
                    self.state = DecodeState::Decompressing(fut);
                    Ok(Resume::Yield)
                }
                Poll::Ready(raw) => {
                    let raw = raw?;
                    if self.requeue_if_base_evicted(p, descriptor) {
                        return Ok(Resume::Done);
                    }
                    self.state = self.prepare(p, descriptor, raw)?;
                    Ok(Resume::Yield)
                }
            },
            DecodeState::Patching { mut copier, stream } => {
                self.state = if copier.step(&stream, p.config.rows_per_tick) {
                    DecodeState::Store(copier.into_bytes())
                } else {
                    DecodeState::Patching { copier, stream }
                };
                Ok(Resume::Yield)
            }
            DecodeState::Store(pixels) => {
                self.store(p, descriptor, pixels);
                p.finish_file(&self.addr, Ok(()));
                Ok(Resume::Done)
            }
            DecodeState::Done => Ok(Resume::Done),
        }
    }

    /// A base this patch needs was stored once but is gone from the cache
    /// while the manifest still resolves it.
    fn requeue_if_base_evicted(&self, p: &Pipeline, descriptor: &FileDescriptor) -> bool {
        let Some(base) = descriptor.base() else {
            return false;
        };
        if p.cache.borrow().file_raw(&self.source, base).is_some()
            || self.archive.descriptor(base).is_none()
        {
            return false;
        }
        let base_addr = EntryAddress::new(SourceKind::Chunked, &self.source, base);
        if p.files.borrow().failed.contains(&base_addr) {
            return false;
        }
        p.requeue_for_base(&self.addr, base)
    }

    fn prepare(
        &self,
        p: &Pipeline,
        descriptor: &FileDescriptor,
        raw: Bytes,
    ) -> LoadResult<DecodeState> {
        let expected = descriptor
            .buffer_len()
            .ok_or_else(|| LoadError::EntrySizeMismatch {
                file: self.file.clone(),
                expected: usize::MAX,
                found: raw.len(),
            })?;

        match &descriptor.body {
            EntryBody::Master { .. } => {
                if raw.len() != expected {
                    return Err(LoadError::EntrySizeMismatch {
                        file: self.file.clone(),
                        expected,
                        found: raw.len(),
                    });
                }
                Ok(DecodeState::Store(raw))
            }
            EntryBody::Patch { base, rects } => {
                let base_raw = p.cache.borrow().file_raw(&self.source, base);
                let base_raw = base_raw.ok_or_else(|| LoadError::UnresolvedBase {
                    file: self.file.clone(),
                    base: base.clone(),
                })?;
                let desc = TextureDesc {
                    width: descriptor.width,
                    height: descriptor.height,
                    format: descriptor.format,
                };
                let copier = patch_copier(&self.file, base, &base_raw, &desc, rects, raw.len())?;
                Ok(DecodeState::Patching {
                    copier,
                    stream: raw,
                })
            }
            EntryBody::Crop { .. } => Err(LoadError::MalformedManifest(format!(
                "crop entry `{}` in a chunked archive",
                self.file
            ))),
        }
    }

    fn store(&self, p: &Pipeline, descriptor: &FileDescriptor, pixels: Bytes) {
        let desc = TextureDesc {
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
        };
        let texture = p.services.surface().create_texture(&desc, &pixels);
        let mut metadata = FileMetadata::new(descriptor.format);
        if let Some(base) = descriptor.base() {
            metadata = metadata.with_dependency(base);
        }
        p.cache.borrow_mut().set(
            &self.source,
            &self.file,
            NewFile {
                texture,
                width: descriptor.width,
                height: descriptor.height,
                metadata,
                raw: Some(RawShadow {
                    key: self.addr.to_string(),
                    bytes: pixels,
                }),
            },
        );
    }
}

impl Task<Pipeline> for FileDecodeTask {
    fn resume(&mut self, p: &Pipeline) -> Resume {
        match self.step(p) {
            Ok(resume) => resume,
            Err(error) => {
                p.finish_file(&self.addr, Err(error));
                Resume::Done
            }
        }
    }

    fn name(&self) -> &'static str {
        "file-decode"
    }
}
