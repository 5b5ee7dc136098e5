//! Fake collaborators with configurable latency.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::Rc,
    time::Duration,
};

use bytes::Bytes;
use futures::FutureExt;
use tessera_core::{
    DecodedImage, Decompressor, FetchError, Fetcher, FrameSampler, ImageDecoder, LoadError,
    LoadResult, PixelFormat, ServiceFuture, Surface, TextureDesc, UrlRegistry,
};
use url::Url;

use crate::{blobs::pattern, delayed::Delayed, surface::MemorySurface};

/// Fetcher serving canned bodies keyed by URL string.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    responses: RefCell<HashMap<String, Result<Bytes, FetchError>>>,
    delay: Cell<usize>,
    calls: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every response stays pending for `polls` polls.
    #[must_use]
    pub fn with_delay(self, polls: usize) -> Self {
        self.delay.set(polls);
        self
    }

    pub fn serve<B: Into<Bytes>>(&self, url: &str, body: B) {
        self.responses
            .borrow_mut()
            .insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.responses
            .borrow_mut()
            .insert(url.to_string(), Err(error));
    }

    #[must_use]
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.borrow().iter().filter(|u| *u == url).count()
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &Url) -> ServiceFuture<Result<Bytes, FetchError>> {
        self.calls.borrow_mut().push(url.as_str().to_string());
        let response = self
            .responses
            .borrow()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| Err(FetchError::new(404, "not found")));
        Delayed::new(self.delay.get(), response).boxed_local()
    }
}

/// Image decoder uploading canned pixels onto a [`MemorySurface`].
#[derive(Debug)]
pub struct FakeImageDecoder {
    surface: Rc<MemorySurface>,
    images: RefCell<HashMap<String, (TextureDesc, Vec<u8>)>>,
    delay: usize,
    calls: Cell<usize>,
}

impl FakeImageDecoder {
    #[must_use]
    pub fn new(surface: Rc<MemorySurface>, delay: usize) -> Self {
        Self {
            surface,
            images: RefCell::new(HashMap::new()),
            delay,
            calls: Cell::new(0),
        }
    }

    pub fn serve(&self, url: &str, width: u32, height: u32) {
        let desc = TextureDesc {
            width,
            height,
            format: PixelFormat::Rgba32,
        };
        let pixels = pattern(width, height, 4, 7);
        self.images
            .borrow_mut()
            .insert(url.to_string(), (desc, pixels));
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ImageDecoder for FakeImageDecoder {
    fn decode(&self, url: &Url) -> ServiceFuture<LoadResult<DecodedImage>> {
        self.calls.set(self.calls.get() + 1);
        let image = self.images.borrow().get(url.as_str()).cloned();
        let surface = Rc::clone(&self.surface);
        let delay = self.delay;
        let url = url.to_string();
        async move {
            Delayed::new(delay, ()).await;
            let (desc, pixels) =
                image.ok_or_else(|| LoadError::ImageDecode(format!("no image at {url}")))?;
            Ok(DecodedImage {
                texture: surface.create_texture(&desc, &pixels),
                desc,
            })
        }
        .boxed_local()
    }
}

/// Frame sampler for a video of fixed `duration`.
#[derive(Debug)]
pub struct FakeFrameSampler {
    surface: Rc<MemorySurface>,
    duration: Duration,
    desc: TextureDesc,
    fail_at: Option<Duration>,
    samples: RefCell<Vec<Duration>>,
}

impl FakeFrameSampler {
    #[must_use]
    pub fn new(surface: Rc<MemorySurface>, duration: Duration, width: u32, height: u32) -> Self {
        Self {
            surface,
            duration,
            desc: TextureDesc {
                width,
                height,
                format: PixelFormat::Rgba32,
            },
            fail_at: None,
            samples: RefCell::new(Vec::new()),
        }
    }

    /// Report a decode error when asked for the frame at `at`.
    #[must_use]
    pub fn failing_at(mut self, at: Duration) -> Self {
        self.fail_at = Some(at);
        self
    }

    #[must_use]
    pub fn samples(&self) -> Vec<Duration> {
        self.samples.borrow().clone()
    }
}

impl FrameSampler for FakeFrameSampler {
    fn sample(&self, _url: &Url, at: Duration) -> ServiceFuture<LoadResult<Option<DecodedImage>>> {
        self.samples.borrow_mut().push(at);
        let result = if self.fail_at == Some(at) {
            Err(LoadError::ImageDecode(format!("frame at {at:?} is corrupt")))
        } else if at >= self.duration {
            Ok(None)
        } else {
            let seed = u8::try_from(at.as_millis() % 251).unwrap_or(0);
            let pixels = pattern(self.desc.width, self.desc.height, 4, seed);
            Ok(Some(DecodedImage {
                texture: self.surface.create_texture(&self.desc, &pixels),
                desc: self.desc,
            }))
        };
        Delayed::new(1, result).boxed_local()
    }
}

/// LZ4 block decompressor with optional latency and failure injection.
#[derive(Debug, Default)]
pub struct MemoryDecompressor {
    delay: usize,
    fail: Cell<bool>,
    calls: Cell<usize>,
}

impl MemoryDecompressor {
    #[must_use]
    pub fn new(delay: usize) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_next(&self) {
        self.fail.set(true);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Decompressor for MemoryDecompressor {
    fn decompress(&self, input: Bytes, expected_len: usize) -> ServiceFuture<LoadResult<Bytes>> {
        self.calls.set(self.calls.get() + 1);
        let result = if self.fail.replace(false) {
            Err(LoadError::Decompress("injected failure".into()))
        } else {
            lz4_flex::block::decompress(&input, expected_len)
                .map(Bytes::from)
                .map_err(|e| LoadError::Decompress(e.to_string()))
        };
        Delayed::new(self.delay, result).boxed_local()
    }
}

/// Registry where each registered source resolves to itself as a URL.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    known: RefCell<HashMap<String, Url>>,
    unresolvable: RefCell<HashSet<String>>,
}

impl StaticRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source`, which must itself parse as a URL.
    pub fn register(&self, source: &str) {
        let url = Url::parse(source).expect("registered sources must be URLs");
        self.known.borrow_mut().insert(source.to_string(), url);
    }

    /// Registered, but `resolve` yields nothing (URL sync still pending).
    pub fn register_unresolved(&self, source: &str) {
        self.unresolvable.borrow_mut().insert(source.to_string());
    }
}

impl UrlRegistry for StaticRegistry {
    fn is_registered(&self, source: &str) -> bool {
        self.known.borrow().contains_key(source) || self.unresolvable.borrow().contains(source)
    }

    fn resolve(&self, source: &str) -> Option<Url> {
        self.known.borrow().get(source).cloned()
    }
}
