use std::rc::Rc;

use futures::FutureExt;
use tessera_core::{
    DecodedImage, Fetcher, ImageDecoder, LoadError, LoadResult, PixelFormat, ServiceFuture,
    Surface, TextureDesc,
};
use tracing::trace;
use url::Url;

/// [`ImageDecoder`] that fetches the bytes, decodes them with the `image`
/// crate and uploads the result as `rgba32`.
pub struct ImageCrateDecoder {
    fetcher: Rc<dyn Fetcher>,
    surface: Rc<dyn Surface>,
}

impl ImageCrateDecoder {
    pub fn new(fetcher: Rc<dyn Fetcher>, surface: Rc<dyn Surface>) -> Self {
        Self { fetcher, surface }
    }
}

impl std::fmt::Debug for ImageCrateDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCrateDecoder").finish_non_exhaustive()
    }
}

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, url: &Url) -> ServiceFuture<LoadResult<DecodedImage>> {
        let fetch = self.fetcher.fetch(url);
        let surface = Rc::clone(&self.surface);
        let url = url.clone();
        async move {
            let body = fetch.await?;
            let decoded = image::load_from_memory(&body)
                .map_err(|e| LoadError::ImageDecode(format!("{url}: {e}")))?;
            let rgba = decoded.to_rgba8();
            let desc = TextureDesc {
                width: rgba.width(),
                height: rgba.height(),
                format: PixelFormat::Rgba32,
            };
            trace!(url = %url, width = desc.width, height = desc.height, "image decoded");
            let texture = surface.create_texture(&desc, rgba.as_raw());
            Ok(DecodedImage { texture, desc })
        }
        .boxed_local()
    }
}
