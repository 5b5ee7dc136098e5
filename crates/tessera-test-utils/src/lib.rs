#![forbid(unsafe_code)]
#![expect(
    clippy::expect_used,
    reason = "test utility crate, panics on misuse are acceptable"
)]

//! Shared test utilities for the tessera workspace.

pub mod blobs;
pub mod delayed;
pub mod listener;
pub mod services;
pub mod surface;

pub use blobs::{ArchiveBuilder, ChunkedBuilder, pattern};
pub use delayed::Delayed;
pub use listener::{Recorded, RecordingListener};
pub use services::{
    FakeFrameSampler, FakeImageDecoder, MemoryDecompressor, MemoryFetcher, StaticRegistry,
};
pub use surface::MemorySurface;
