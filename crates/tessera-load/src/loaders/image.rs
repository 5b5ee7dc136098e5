use std::task::Poll;

use tessera_cache::NewFile;
use tessera_core::{DecodedImage, FileMetadata, LoadError, LoadResult, ServiceFuture};
use tessera_worker::{Resume, Task, poll_once};
use tracing::debug;
use url::Url;

use super::resolve;
use crate::{pipeline::Pipeline, source::SourceOutput};

/// Name of the single file an image source produces.
fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map_or_else(|| "index".to_string(), str::to_string)
}

enum State {
    Start,
    Decoding {
        name: String,
        fut: ServiceFuture<LoadResult<DecodedImage>>,
    },
    Done,
}

/// `image` and `local` sources: one decoded picture.
pub(super) struct ImageLoader {
    source: String,
    local_only: bool,
    state: State,
}

impl ImageLoader {
    pub(super) fn new(source: String, local_only: bool) -> Self {
        Self {
            source,
            local_only,
            state: State::Start,
        }
    }

    fn step(&mut self, p: &Pipeline) -> LoadResult<Option<SourceOutput>> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                let url = resolve(p, &self.source)?;
                if self.local_only && url.scheme() != "file" {
                    return Err(LoadError::UnsupportedScheme(url.scheme().to_string()));
                }
                let fut = p.services.image_decoder()?.decode(&url);
                self.state = State::Decoding {
                    name: file_name(&url),
                    fut,
                };
                Ok(None)
            }
            State::Decoding { name, mut fut } => match poll_once(&mut fut) {
                Poll::Pending => {
                    self.state = State::Decoding { name, fut };
                    Ok(None)
                }
                Poll::Ready(decoded) => {
                    let decoded = decoded?;
                    debug!(source = %self.source, file = %name, width = decoded.desc.width, height = decoded.desc.height, "image decoded");
                    let stored = p.cache.borrow_mut().set(
                        &self.source,
                        &name,
                        NewFile {
                            texture: decoded.texture,
                            width: decoded.desc.width,
                            height: decoded.desc.height,
                            metadata: FileMetadata::new(decoded.desc.format),
                            raw: None,
                        },
                    );
                    // A refused set leaves the earlier entry under `name` in place.
                    if !stored {
                        p.services.surface().destroy_texture(decoded.texture);
                    }
                    Ok(Some(SourceOutput::from_files(vec![name])))
                }
            },
            State::Done => Ok(None),
        }
    }
}

impl Task<Pipeline> for ImageLoader {
    fn resume(&mut self, p: &Pipeline) -> Resume {
        match self.step(p) {
            Ok(None) if !matches!(self.state, State::Done) => Resume::Yield,
            Ok(None) => Resume::Done,
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
        if self.local_only { "local-loader" } else { "image-loader" }
    }
}
