use std::task::Poll;

use tessera_cache::NewFile;
use tessera_core::{DecodedImage, FileMetadata, LoadResult, ServiceFuture, SourceOptions};
use tessera_worker::{Resume, Task, poll_once};
use tracing::{debug, warn};
use url::Url;

use super::resolve;
use crate::{pipeline::Pipeline, source::SourceOutput};

fn frame_name(index: u32) -> String {
    format!("frame_{index:04}")
}

/// `video` sources: frames sampled at a fixed interval until the end of the
/// video or the frame cap.
pub(super) struct VideoLoader {
    source: String,
    options: SourceOptions,
    url: Option<Url>,
    index: u32,
    pending: Option<ServiceFuture<LoadResult<Option<DecodedImage>>>>,
    files: Vec<String>,
}

impl VideoLoader {
    pub(super) fn new(source: String, options: SourceOptions) -> Self {
        Self {
            source,
            options,
            url: None,
            index: 0,
            pending: None,
            files: Vec::new(),
        }
    }

    /// `Ok(true)` once sampling is over.
    fn step(&mut self, p: &Pipeline) -> LoadResult<bool> {
        let url = match &self.url {
            Some(url) => url.clone(),
            None => {
                let url = resolve(p, &self.source)?;
                p.services.frame_sampler()?;
                self.url = Some(url.clone());
                url
            }
        };

        let mut fut = match self.pending.take() {
            Some(fut) => fut,
            None => {
                if self.index >= p.config.max_video_frames {
                    debug!(source = %self.source, frames = self.files.len(), "frame cap reached");
                    return Ok(true);
                }
                let at = self.options.frame_time(self.index);
                p.services.frame_sampler()?.sample(&url, at)
            }
        };

        let sampled = match poll_once(&mut fut) {
            Poll::Pending => {
                self.pending = Some(fut);
                return Ok(false);
            }
            Poll::Ready(sampled) => sampled,
        };

        match sampled {
            Ok(None) => {
                debug!(source = %self.source, frames = self.files.len(), "end of video");
                return Ok(true);
            }
            Ok(Some(frame)) => {
                let name = frame_name(self.index);
                let stored = p.cache.borrow_mut().set(
                    &self.source,
                    &name,
                    NewFile {
                        texture: frame.texture,
                        width: frame.desc.width,
                        height: frame.desc.height,
                        metadata: FileMetadata::new(frame.desc.format),
                        raw: None,
                    },
                );
                if stored {
                    self.files.push(name);
                } else {
                    p.services.surface().destroy_texture(frame.texture);
                }
            }
            Err(error) => {
                warn!(source = %self.source, frame = self.index, %error, "frame skipped");
            }
        }

        self.index += 1;
        let cap = p.config.max_video_frames.max(1);
        p.report_progress(&self.source, self.index.min(cap) as f32 / cap as f32);
        Ok(self.options.sample_interval.is_zero())
    }
}

impl Task<Pipeline> for VideoLoader {
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
        "video-loader"
    }
}
