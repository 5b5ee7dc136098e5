use std::task::Poll;

use bytes::Bytes;
use tessera_archive::{ArchiveDecoder, DecoderPoll, ExtractedEntry};
use tessera_cache::{NewFile, RawShadow};
use tessera_core::{EntryAddress, FetchError, LoadResult, ServiceFuture, SourceKind, TextureDesc};
use tessera_worker::{Resume, Task, poll_once};
use tracing::{trace, warn};

use super::resolve;
use crate::{pipeline::Pipeline, source::SourceOutput};

enum State {
    Start,
    Fetching(ServiceFuture<Result<Bytes, FetchError>>),
    Decoding(Box<ArchiveDecoder>),
    Done,
}

/// `archive` sources: fetch, then decode every entry eagerly, one per tick.
pub(super) struct ArchiveLoader {
    source: String,
    state: State,
    files: Vec<String>,
}

impl ArchiveLoader {
    pub(super) fn new(source: String) -> Self {
        Self {
            source,
            state: State::Start,
            files: Vec::new(),
        }
    }

    fn store(&mut self, p: &Pipeline, entry: ExtractedEntry) {
        let desc = TextureDesc {
            width: entry.width,
            height: entry.height,
            format: entry.metadata.format,
        };
        let texture = p.services.surface().create_texture(&desc, &entry.pixels);
        let key = EntryAddress::new(SourceKind::Archive, &self.source, entry.name.as_str());
        let stored = p.cache.borrow_mut().set(
            &self.source,
            &entry.name,
            NewFile {
                texture,
                width: entry.width,
                height: entry.height,
                metadata: entry.metadata,
                raw: Some(RawShadow {
                    key: key.to_string(),
                    bytes: entry.pixels,
                }),
            },
        );
        if stored {
            trace!(source = %self.source, file = %entry.name, "entry stored");
            self.files.push(entry.name);
        } else {
            p.services.surface().destroy_texture(texture);
        }
    }

    /// `Ok(true)` once every entry settled.
    fn step(&mut self, p: &Pipeline) -> LoadResult<bool> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                let url = resolve(p, &self.source)?;
                self.state = State::Fetching(p.services.fetcher()?.fetch(&url));
            }
            State::Fetching(mut fut) => match poll_once(&mut fut) {
                Poll::Pending => self.state = State::Fetching(fut),
                Poll::Ready(blob) => {
                    let decoder = ArchiveDecoder::new(
                        blob?,
                        p.services.decompressor()?,
                        p.config.manifest.clone(),
                        p.config.rows_per_tick,
                    );
                    self.state = State::Decoding(Box::new(decoder));
                }
            },
            State::Decoding(mut decoder) => {
                let poll = decoder.resume()?;
                let progress = decoder.progress();
                self.state = State::Decoding(decoder);
                match poll {
                    DecoderPoll::Pending => {}
                    DecoderPoll::Extracted(entry) => {
                        self.store(p, entry);
                        p.report_progress(&self.source, progress);
                    }
                    DecoderPoll::Failed { name, error } => {
                        warn!(source = %self.source, file = %name, %error, "entry excluded");
                        p.report_progress(&self.source, progress);
                    }
                    DecoderPoll::Finished => {
                        self.state = State::Done;
                        return Ok(true);
                    }
                }
            }
            State::Done => return Ok(true),
        }
        Ok(false)
    }
}

impl Task<Pipeline> for ArchiveLoader {
    fn resume(&mut self, p: &Pipeline) -> Resume {
        match self.step(p) {
            Ok(false) => Resume::Yield,
            Ok(true) => {
                let files = std::mem::take(&mut self.files);
                p.finish_source(&self.source, Ok(SourceOutput::from_files(files)));
                Resume::Done
            }
            Err(error) => {
                p.finish_source(&self.source, Err(error));
                Resume::Done
            }
        }
    }

    fn name(&self) -> &'static str {
        "archive-loader"
    }
}
