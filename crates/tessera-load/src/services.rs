use std::rc::Rc;

use tessera_archive::Lz4Decompressor;
use tessera_core::{
    Decompressor, Fetcher, FrameSampler, ImageDecoder, LoadError, LoadResult, Surface,
    UrlRegistry,
};

/// Collaborators the pipeline delegates to.
///
/// The registry and the surface are mandatory. The rest are optional; a
/// source that needs a missing one fails with [`LoadError::NotConfigured`].
/// Block decompression defaults to [`Lz4Decompressor`].
#[derive(Clone)]
pub struct Services {
    registry: Rc<dyn UrlRegistry>,
    surface: Rc<dyn Surface>,
    fetcher: Option<Rc<dyn Fetcher>>,
    image_decoder: Option<Rc<dyn ImageDecoder>>,
    decompressor: Option<Rc<dyn Decompressor>>,
    frame_sampler: Option<Rc<dyn FrameSampler>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("fetcher", &self.fetcher.is_some())
            .field("image_decoder", &self.image_decoder.is_some())
            .field("decompressor", &self.decompressor.is_some())
            .field("frame_sampler", &self.frame_sampler.is_some())
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(registry: Rc<dyn UrlRegistry>, surface: Rc<dyn Surface>) -> Self {
        Self {
            registry,
            surface,
            fetcher: None,
            image_decoder: None,
            decompressor: Some(Rc::new(Lz4Decompressor)),
            frame_sampler: None,
        }
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn with_image_decoder(mut self, decoder: Rc<dyn ImageDecoder>) -> Self {
        self.image_decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn with_decompressor(mut self, decompressor: Rc<dyn Decompressor>) -> Self {
        self.decompressor = Some(decompressor);
        self
    }

    #[must_use]
    pub fn without_decompressor(mut self) -> Self {
        self.decompressor = None;
        self
    }

    #[must_use]
    pub fn with_frame_sampler(mut self, sampler: Rc<dyn FrameSampler>) -> Self {
        self.frame_sampler = Some(sampler);
        self
    }

    pub(crate) fn registry(&self) -> &dyn UrlRegistry {
        self.registry.as_ref()
    }

    pub(crate) fn surface(&self) -> &Rc<dyn Surface> {
        &self.surface
    }

    pub(crate) fn fetcher(&self) -> LoadResult<&dyn Fetcher> {
        self.fetcher
            .as_deref()
            .ok_or(LoadError::NotConfigured("fetcher"))
    }

    pub(crate) fn image_decoder(&self) -> LoadResult<&dyn ImageDecoder> {
        self.image_decoder
            .as_deref()
            .ok_or(LoadError::NotConfigured("image decoder"))
    }

    pub(crate) fn decompressor(&self) -> LoadResult<Rc<dyn Decompressor>> {
        self.decompressor
            .clone()
            .ok_or(LoadError::NotConfigured("decompressor"))
    }

    pub(crate) fn frame_sampler(&self) -> LoadResult<&dyn FrameSampler> {
        self.frame_sampler
            .as_deref()
            .ok_or(LoadError::NotConfigured("frame sampler"))
    }
}
