#![forbid(unsafe_code)]

//! # tessera-core
//!
//! Shared vocabulary of the tessera content pipeline.
//!
//! ## Entry addressing (normative)
//!
//! Every decoded entry is addressed as `<kind>://<sourceId>/<entryPath>`:
//! - `kind` is the scheme of the [`SourceKind`] that produced the entry;
//! - `sourceId` is `hex(sha256(source))` truncated to 16 bytes;
//! - `entryPath` is the entry name as it appears in the container manifest.
//!
//! The rendered address doubles as the key of the raw-byte shadow table, so
//! it must stay collision-free per distinct entry.
//!
//! ## Collaborators
//!
//! The pipeline never performs I/O itself. Fetching, image decoding, block
//! decompression, frame sampling, URL resolution and pixel upload are all
//! injected through the traits in this crate. Every asynchronous collaborator
//! returns a [`ServiceFuture`] which the tick scheduler polls once per tick.

mod address;
mod error;
mod format;
mod geometry;
mod listener;
mod metadata;
mod options;
mod services;

pub use address::{AddressError, EntryAddress, SourceKind, source_id};
pub use error::{ErrorCode, FetchError, LoadError, LoadResult, TransportError, TransportKind};
pub use format::PixelFormat;
pub use geometry::Rect;
pub use listener::{Channel, ConsumerId, LoadListener};
pub use metadata::FileMetadata;
pub use options::SourceOptions;
#[cfg(any(test, feature = "test-utils"))]
pub use services::MockUrlRegistry;
pub use services::{
    DecodedImage, Decompressor, Fetcher, FrameSampler, ImageDecoder, ServiceFuture, Surface,
    TextureDesc, TextureHandle, UrlRegistry,
};
