#![forbid(unsafe_code)]

//! # tessera-archive
//!
//! Container parsing for the two packed formats:
//!
//! - `PWAR` archives: one LZ4 block holding every entry. Decoded eagerly by
//!   [`ArchiveDecoder`], one entry per resume.
//! - `PWCK` chunked archives: one LZ4 block per entry. Parsed once into a
//!   [`ChunkedArchive`] table, entries are decoded on request.
//!
//! Both carry a JSON manifest, see [`Manifest`]. Patch entries are rebuilt
//! from their base with [`RowCopier`], which bounds the rows copied per step.

mod chunked;
mod container;
mod decoder;
mod lz4;
mod manifest;
mod patch;

pub use chunked::ChunkedArchive;
pub use container::{
    ARCHIVE_HEADER_LEN, ArchiveHeader, ArchiveParts, CHUNKED_HEADER_LEN, ChunkedParts,
    ContainerFormat, split_archive, split_chunked,
};
pub use decoder::{ArchiveDecoder, DecoderPoll, ExtractedEntry};
pub use lz4::Lz4Decompressor;
pub use manifest::{ChunkRef, EntryBody, FileDescriptor, Manifest, ManifestPolicy, Span};
pub use patch::{CopyOp, PatchRect, RowCopier, patch_copier, plan_crop, plan_patch};
