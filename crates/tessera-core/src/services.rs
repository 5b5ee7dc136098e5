//! Collaborator contracts.
//!
//! Every asynchronous collaborator hands back a [`ServiceFuture`]. The
//! pipeline never awaits them; a task polls the future once per tick and
//! yields while it is pending.

use std::time::Duration;

use bytes::Bytes;
use futures::future::LocalBoxFuture;
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;
use url::Url;

use crate::{
    error::{FetchError, LoadResult},
    format::PixelFormat,
};

pub type ServiceFuture<T> = LocalBoxFuture<'static, T>;

/// Opaque handle to a pixel resource owned by the display surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Result of the image-decode service: a resource already living on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub texture: TextureHandle,
    pub desc: TextureDesc,
}

/// Raw payload fetch for a resolved URL.
pub trait Fetcher {
    fn fetch(&self, url: &Url) -> ServiceFuture<Result<Bytes, FetchError>>;
}

/// URL to decoded, uploaded image.
pub trait ImageDecoder {
    fn decode(&self, url: &Url) -> ServiceFuture<LoadResult<DecodedImage>>;
}

/// Block decompression into a buffer of exactly `expected_len` bytes.
pub trait Decompressor {
    fn decompress(&self, input: Bytes, expected_len: usize) -> ServiceFuture<LoadResult<Bytes>>;
}

/// Video frame extraction. `Ok(None)` means `at` is past the end of the video.
pub trait FrameSampler {
    fn sample(&self, url: &Url, at: Duration) -> ServiceFuture<LoadResult<Option<DecodedImage>>>;
}

/// Which sources are known and where they can be fetched from.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait UrlRegistry {
    fn is_registered(&self, source: &str) -> bool;

    fn resolve(&self, source: &str) -> Option<Url>;
}

/// The virtual display surface pixel resources live on.
///
/// The surface may invalidate any texture at any time; `is_alive` reports it.
pub trait Surface {
    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> TextureHandle;

    fn is_alive(&self, texture: TextureHandle) -> bool;

    fn destroy_texture(&self, texture: TextureHandle);
}
