use std::{rc::Rc, task::Poll};

use bytes::Bytes;
use tessera_archive::ChunkedArchive;
use tessera_core::{FetchError, LoadResult, ServiceFuture};
use tessera_worker::{Resume, Task, poll_once};
use tracing::debug;

use super::resolve;
use crate::{pipeline::Pipeline, source::SourceOutput};

enum State {
    Start,
    Fetching(ServiceFuture<Result<Bytes, FetchError>>),
    Parse(Bytes),
    Done,
}

/// `chunked` sources: fetch and validate the chunk table only. Entries are
/// decoded on demand by `load_file`.
pub(super) struct ChunkedLoader {
    source: String,
    state: State,
}

impl ChunkedLoader {
    pub(super) fn new(source: String) -> Self {
        Self {
            source,
            state: State::Start,
        }
    }

    fn step(&mut self, p: &Pipeline) -> LoadResult<Option<SourceOutput>> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                let url = resolve(p, &self.source)?;
                self.state = State::Fetching(p.services.fetcher()?.fetch(&url));
            }
            State::Fetching(mut fut) => match poll_once(&mut fut) {
                Poll::Pending => self.state = State::Fetching(fut),
                Poll::Ready(blob) => self.state = State::Parse(blob?),
            },
            State::Parse(blob) => {
                let archive = ChunkedArchive::parse(&blob, &p.config.manifest)?;
                let files = archive.names();
                debug!(source = %self.source, files = files.len(), rejected = archive.manifest().rejected.len(), "chunk table parsed");
                return Ok(Some(SourceOutput {
                    files,
                    archive: Some(Rc::new(archive)),
                }));
            }
            State::Done => {}
        }
        Ok(None)
    }
}

impl Task<Pipeline> for ChunkedLoader {
    fn resume(&mut self, p: &Pipeline) -> Resume {
        match self.step(p) {
            Ok(None) if matches!(self.state, State::Done) => Resume::Done,
            Ok(None) => Resume::Yield,
            Ok(Some(output)) => {
                p.finish_source(&self.source, Ok(output));
                Resume::Done
            }
            Err(error) => {
                p.finish_source(&self.source, Err(error));
                Resume::Done
            }
        }
    }

    fn name(&self) -> &'static str {
        "chunked-loader"
    }
}
