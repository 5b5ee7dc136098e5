#![allow(dead_code)]

use std::{rc::Rc, time::Duration};

use bytes::Bytes;
use tessera_core::ConsumerId;
use tessera_load::{Pipeline, PipelineConfig, Services};
use tessera_test_utils::{
    FakeFrameSampler, FakeImageDecoder, MemoryDecompressor, MemoryFetcher, MemorySurface,
    RecordingListener, StaticRegistry,
};
use tracing_subscriber::EnvFilter;

pub const CHUNKED: &str = "https://cdn.example/packs/ui.pwck";
pub const ARCHIVE: &str = "https://cdn.example/packs/ui.pwar";
pub const IMAGE: &str = "https://cdn.example/art/hero.png";
pub const VIDEO: &str = "https://cdn.example/clips/intro.mp4";

/// Upper bound for `settle`; every scenario here finishes far below it.
const MAX_TICKS: usize = 10_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A pipeline wired to in-memory collaborators.
pub struct Harness {
    pub pipeline: Rc<Pipeline>,
    pub registry: Rc<StaticRegistry>,
    pub surface: Rc<MemorySurface>,
    pub fetcher: Rc<MemoryFetcher>,
    pub images: Rc<FakeImageDecoder>,
    pub sampler: Rc<FakeFrameSampler>,
    pub decompressor: Rc<MemoryDecompressor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::build(config, |surface| {
            FakeFrameSampler::new(surface, Duration::from_secs(3), 2, 2)
        })
    }

    pub fn build<F>(config: PipelineConfig, sampler: F) -> Self
    where
        F: FnOnce(Rc<MemorySurface>) -> FakeFrameSampler,
    {
        init_tracing();
        let registry = Rc::new(StaticRegistry::new());
        let surface = Rc::new(MemorySurface::new());
        let fetcher = Rc::new(MemoryFetcher::new());
        let images = Rc::new(FakeImageDecoder::new(Rc::clone(&surface), 1));
        let sampler = Rc::new(sampler(Rc::clone(&surface)));
        let decompressor = Rc::new(MemoryDecompressor::new(1));

        let services = Services::new(registry.clone(), surface.clone())
            .with_fetcher(fetcher.clone())
            .with_image_decoder(images.clone())
            .with_decompressor(decompressor.clone())
            .with_frame_sampler(sampler.clone());

        Self {
            pipeline: Rc::new(Pipeline::new(config, services)),
            registry,
            surface,
            fetcher,
            images,
            sampler,
            decompressor,
        }
    }

    pub fn consumer(&self) -> (ConsumerId, Rc<RecordingListener>) {
        let listener = Rc::new(RecordingListener::new());
        let id = self.pipeline.register_consumer(listener.clone());
        (id, listener)
    }

    /// Register `source` and serve `body` for it.
    pub fn serve(&self, source: &str, body: Bytes) {
        self.registry.register(source);
        self.fetcher.serve(source, body);
    }

    /// Tick until nothing is pending.
    pub fn settle(&self) -> usize {
        let ticks = self.pipeline.run_until_idle(MAX_TICKS);
        assert!(self.pipeline.is_idle(), "pipeline still busy after {ticks} ticks");
        ticks
    }
}

/// `base` with `rect` (in pixels, rgba32) replaced row by row from `stream`.
pub fn overwrite(
    base: &[u8],
    width: u32,
    (x, y, w, h): (u32, u32, u32, u32),
    stream: &[u8],
) -> Vec<u8> {
    let mut out = base.to_vec();
    let stride = width as usize * 4;
    let row_len = w as usize * 4;
    for row in 0..h as usize {
        let dst = (y as usize + row) * stride + x as usize * 4;
        out[dst..dst + row_len].copy_from_slice(&stream[row * row_len..(row + 1) * row_len]);
    }
    out
}
