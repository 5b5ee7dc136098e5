//! Eager `PWAR` decoder.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
    task::Poll,
};

use bytes::Bytes;
use tessera_core::{
    Decompressor, FileMetadata, LoadError, LoadResult, PixelFormat, ServiceFuture, TextureDesc,
};
use tessera_worker::poll_once;
use tracing::{debug, trace};

use crate::{
    container::{ArchiveHeader, ContainerFormat, split_archive},
    manifest::{EntryBody, FileDescriptor, Manifest, ManifestPolicy},
    patch::{RowCopier, patch_copier, plan_crop},
};

/// One decoded archive entry.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedEntry {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub metadata: FileMetadata,
    pub pixels: Bytes,
}

#[derive(Debug, PartialEq)]
pub enum DecoderPoll {
    /// Nothing to report this resume.
    Pending,
    Extracted(ExtractedEntry),
    /// A single entry failed; decoding continues.
    Failed { name: String, error: LoadError },
    Finished,
}

enum Phase {
    Slice(Bytes),
    Decompress(ServiceFuture<LoadResult<Bytes>>),
    Extract,
    Finished,
}

struct InProgress {
    index: usize,
    copier: RowCopier,
    metadata: FileMetadata,
}

/// Phased decoder for one archive blob.
///
/// Each [`resume`](Self::resume) does one phase step: slice the header and
/// manifest, wait on the block decompression, then extract one entry (row
/// copies are further bounded by `rows_per_tick`).
///
/// An `Err` from `resume` fails the whole archive. Per-entry failures come
/// back as [`DecoderPoll::Failed`].
pub struct ArchiveDecoder {
    phase: Phase,
    decompressor: Rc<dyn Decompressor>,
    policy: ManifestPolicy,
    rows_per_tick: usize,
    header: Option<ArchiveHeader>,
    files: Vec<FileDescriptor>,
    payload: Bytes,
    queue: VecDeque<usize>,
    failures: VecDeque<(String, LoadError)>,
    current: Option<InProgress>,
    stalled: usize,
    done: HashMap<String, Bytes>,
    failed: HashSet<String>,
    settled: usize,
    total: usize,
}

impl std::fmt::Debug for ArchiveDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDecoder")
            .field("settled", &self.settled)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl ArchiveDecoder {
    pub fn new(
        blob: Bytes,
        decompressor: Rc<dyn Decompressor>,
        policy: ManifestPolicy,
        rows_per_tick: usize,
    ) -> Self {
        Self {
            phase: Phase::Slice(blob),
            decompressor,
            policy,
            rows_per_tick: rows_per_tick.max(1),
            header: None,
            files: Vec::new(),
            payload: Bytes::new(),
            queue: VecDeque::new(),
            failures: VecDeque::new(),
            current: None,
            stalled: 0,
            done: HashMap::new(),
            failed: HashSet::new(),
            settled: 0,
            total: 0,
        }
    }

    /// Fraction of manifest entries settled, extracted or failed.
    #[must_use]
    pub fn progress(&self) -> f32 {
        match self.phase {
            Phase::Finished => 1.0,
            _ if self.total == 0 => 0.0,
            _ => self.settled as f32 / self.total as f32,
        }
    }

    pub fn resume(&mut self) -> LoadResult<DecoderPoll> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Slice(blob) => {
                self.slice(&blob)?;
                Ok(DecoderPoll::Pending)
            }
            Phase::Decompress(mut fut) => match poll_once(&mut fut) {
                Poll::Pending => {
                    self.phase = Phase::Decompress(fut);
                    Ok(DecoderPoll::Pending)
                }
                Poll::Ready(result) => {
                    let payload = result?;
                    let expected = self.header.map_or(0, |h| h.payload_raw_len);
                    if payload.len() != expected {
                        return Err(LoadError::Truncated {
                            needed: expected,
                            available: payload.len(),
                        });
                    }
                    trace!(bytes = payload.len(), "payload decompressed");
                    self.payload = payload;
                    self.phase = Phase::Extract;
                    Ok(DecoderPoll::Pending)
                }
            },
            Phase::Extract => {
                self.phase = Phase::Extract;
                let poll = self.extract();
                if matches!(poll, DecoderPoll::Finished) {
                    self.phase = Phase::Finished;
                }
                Ok(poll)
            }
            Phase::Finished => Ok(DecoderPoll::Finished),
        }
    }

    fn slice(&mut self, blob: &Bytes) -> LoadResult<()> {
        let parts = split_archive(blob)?;
        let manifest = Manifest::parse(&parts.manifest, ContainerFormat::Archive, &self.policy)?;
        debug!(
            version = manifest.version,
            entries = manifest.files.len(),
            payload_raw_len = parts.header.payload_raw_len,
            "archive manifest parsed"
        );

        self.total = manifest.files.len() + manifest.rejected.len();
        self.failures = manifest.rejected.into_iter().collect();
        self.queue = (0..manifest.files.len()).collect();
        self.files = manifest.files;
        self.header = Some(parts.header);
        self.phase = Phase::Decompress(
            self.decompressor
                .decompress(parts.payload, parts.header.payload_raw_len),
        );
        Ok(())
    }

    fn extract(&mut self) -> DecoderPoll {
        if let Some(progress) = self.current.take() {
            return self.continue_copy(progress);
        }
        if let Some((name, error)) = self.failures.pop_front() {
            return self.fail(name, error);
        }

        while let Some(index) = self.queue.pop_front() {
            match self.start(index) {
                Start::Deferred => {
                    self.queue.push_back(index);
                    self.stalled += 1;
                    if self.stalled > self.queue.len() {
                        // Every remaining entry waits on another one.
                        self.queue.pop_back();
                        self.stalled = 0;
                        let file = &self.files[index];
                        let name = file.name.clone();
                        let error = LoadError::UnresolvedBase {
                            file: name.clone(),
                            base: file.base().unwrap_or_default().to_string(),
                        };
                        return self.fail(name, error);
                    }
                }
                Start::Ready(poll) => {
                    self.stalled = 0;
                    return poll;
                }
            }
        }
        DecoderPoll::Finished
    }

    fn start(&mut self, index: usize) -> Start {
        let file = &self.files[index];
        let name = file.name.clone();
        let bpp = file.format.bytes_per_pixel();
        let Some(expected) = file.buffer_len() else {
            return Start::Ready(self.fail(
                name.clone(),
                LoadError::EntrySizeMismatch {
                    file: name,
                    expected: usize::MAX,
                    found: 0,
                },
            ));
        };

        match &file.body {
            EntryBody::Master { span } => {
                let Some(span) = *span else {
                    return Start::Ready(self.fail(
                        name.clone(),
                        LoadError::MissingField {
                            entry: name,
                            field: "offset",
                        },
                    ));
                };
                let end = span.offset.checked_add(span.length);
                let result = match end {
                    Some(end) if end <= self.payload.len() && span.length == expected => {
                        Ok(self.payload.slice(span.offset..end))
                    }
                    Some(end) if end <= self.payload.len() => Err(LoadError::EntrySizeMismatch {
                        file: name.clone(),
                        expected,
                        found: span.length,
                    }),
                    _ => Err(LoadError::Truncated {
                        needed: end.unwrap_or(usize::MAX),
                        available: self.payload.len(),
                    }),
                };
                let metadata = FileMetadata::new(file.format);
                Start::Ready(match result {
                    Ok(pixels) => self.succeed(index, metadata, pixels),
                    Err(error) => self.fail(name, error),
                })
            }
            EntryBody::Crop { rect } => {
                let rect = *rect;
                let (sheet_w, sheet_h) = self
                    .header
                    .map_or((0, 0), |h| (h.sheet_width, h.sheet_height));
                let sheet_len = PixelFormat::Rgba32.buffer_len(sheet_w, sheet_h);
                if sheet_len.is_none_or(|len| len > self.payload.len()) {
                    let error = LoadError::Truncated {
                        needed: sheet_len.unwrap_or(usize::MAX),
                        available: self.payload.len(),
                    };
                    return Start::Ready(self.fail(name, error));
                }
                match plan_crop(&name, sheet_w, sheet_h, bpp, rect) {
                    Ok(op) => {
                        let copier = RowCopier::new(vec![0; expected], rect.w, bpp, vec![op]);
                        let metadata = FileMetadata::new(file.format).with_crop(vec![rect]);
                        Start::Ready(self.continue_copy(InProgress {
                            index,
                            copier,
                            metadata,
                        }))
                    }
                    Err(error) => Start::Ready(self.fail(name, error)),
                }
            }
            EntryBody::Patch { base, rects } => {
                if let Some(base_pixels) = self.done.get(base) {
                    let desc = TextureDesc {
                        width: file.width,
                        height: file.height,
                        format: file.format,
                    };
                    let planned = patch_copier(
                        &name,
                        base,
                        base_pixels,
                        &desc,
                        rects,
                        self.payload.len(),
                    );
                    return Start::Ready(match planned {
                        Ok(copier) => {
                            let metadata =
                                FileMetadata::new(file.format).with_dependency(base.clone());
                            self.continue_copy(InProgress {
                                index,
                                copier,
                                metadata,
                            })
                        }
                        Err(error) => self.fail(name, error),
                    });
                }

                let pending = self.queue.iter().any(|i| self.files[*i].name == *base);
                if pending && !self.failed.contains(base) {
                    trace!(entry = %name, base = %base, "patch deferred behind its base");
                    return Start::Deferred;
                }
                let error = LoadError::UnresolvedBase {
                    file: name.clone(),
                    base: base.clone(),
                };
                Start::Ready(self.fail(name, error))
            }
        }
    }

    fn continue_copy(&mut self, mut progress: InProgress) -> DecoderPoll {
        let src = self.payload.clone();
        if !progress.copier.step(&src, self.rows_per_tick) {
            self.current = Some(progress);
            return DecoderPoll::Pending;
        }
        let InProgress {
            index,
            copier,
            metadata,
        } = progress;
        self.succeed(index, metadata, copier.into_bytes())
    }

    fn succeed(&mut self, index: usize, metadata: FileMetadata, pixels: Bytes) -> DecoderPoll {
        let file = &self.files[index];
        self.settled += 1;
        self.done.insert(file.name.clone(), pixels.clone());
        trace!(entry = %file.name, bytes = pixels.len(), "entry extracted");
        DecoderPoll::Extracted(ExtractedEntry {
            name: file.name.clone(),
            width: file.width,
            height: file.height,
            metadata,
            pixels,
        })
    }

    fn fail(&mut self, name: String, error: LoadError) -> DecoderPoll {
        self.settled += 1;
        debug!(entry = %name, %error, "entry failed");
        self.failed.insert(name.clone());
        DecoderPoll::Failed { name, error }
    }
}

enum Start {
    Ready(DecoderPoll),
    Deferred,
}
