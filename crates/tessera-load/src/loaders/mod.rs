//! One loader task per source kind.
//!
//! Every loader runs as a scheduler task, polls its collaborator futures at
//! most once per resume, and reports back through
//! [`Pipeline::finish_source`] exactly once.

mod archive;
mod chunked;
mod image;
mod video;

use tessera_core::{LoadError, LoadResult, SourceKind, SourceOptions};
use tessera_worker::Task;
use url::Url;

use crate::pipeline::Pipeline;

pub(crate) fn for_kind(
    kind: SourceKind,
    source: String,
    options: SourceOptions,
) -> Box<dyn Task<Pipeline>> {
    match kind {
        SourceKind::Archive => Box::new(archive::ArchiveLoader::new(source)),
        SourceKind::Chunked => Box::new(chunked::ChunkedLoader::new(source)),
        SourceKind::Video => Box::new(video::VideoLoader::new(source, options)),
        SourceKind::Image => Box::new(image::ImageLoader::new(source, false)),
        SourceKind::Local => Box::new(image::ImageLoader::new(source, true)),
    }
}

fn resolve(p: &Pipeline, source: &str) -> LoadResult<Url> {
    p.services
        .registry()
        .resolve(source)
        .ok_or_else(|| LoadError::UnregisteredUrl(source.to_string()))
}
