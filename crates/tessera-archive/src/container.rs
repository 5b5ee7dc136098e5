//! Binary container headers.
//!
//! All integers are little-endian `u32`.
//!
//! ```text
//! PWAR | manifest_len | sheet_width | sheet_height | payload_raw_len | manifest | lz4 payload
//! PWCK | manifest_len | manifest | chunk region
//! ```

use bytes::Bytes;
use tessera_core::{LoadError, LoadResult};

pub const ARCHIVE_HEADER_LEN: usize = 20;
pub const CHUNKED_HEADER_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    Archive,
    Chunked,
}

impl ContainerFormat {
    #[must_use]
    pub const fn magic(self) -> &'static [u8; 4] {
        match self {
            ContainerFormat::Archive => b"PWAR",
            ContainerFormat::Chunked => b"PWCK",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ContainerFormat::Archive => "PWAR",
            ContainerFormat::Chunked => "PWCK",
        }
    }

    /// Format announced by the first four bytes of `blob`.
    #[must_use]
    pub fn detect(blob: &[u8]) -> Option<Self> {
        let prefix = blob.get(..4)?;
        [ContainerFormat::Archive, ContainerFormat::Chunked]
            .into_iter()
            .find(|f| f.magic() == prefix)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub manifest_len: usize,
    pub sheet_width: u32,
    pub sheet_height: u32,
    pub payload_raw_len: usize,
}

/// A `PWAR` blob sliced into its parts. Slices share the blob's buffer.
#[derive(Clone, Debug)]
pub struct ArchiveParts {
    pub header: ArchiveHeader,
    pub manifest: Bytes,
    pub payload: Bytes,
}

#[derive(Clone, Debug)]
pub struct ChunkedParts {
    pub manifest: Bytes,
    pub region: Bytes,
}

struct Cursor<'a> {
    blob: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(blob: &'a Bytes) -> Self {
        Self { blob, pos: 0 }
    }

    fn take(&mut self, len: usize) -> LoadResult<Bytes> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.blob.len());
        let Some(end) = end else {
            return Err(LoadError::Truncated {
                needed: self.pos.saturating_add(len),
                available: self.blob.len(),
            });
        };
        let out = self.blob.slice(self.pos..end);
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> LoadResult<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn len(&mut self) -> LoadResult<usize> {
        self.u32().map(|v| v as usize)
    }

    fn magic(&mut self, format: ContainerFormat) -> LoadResult<()> {
        let raw = self.take(4)?;
        if raw.as_ref() != format.magic() {
            return Err(LoadError::BadMagic {
                expected: format.name(),
                found: ContainerFormat::detect(&raw).map(ContainerFormat::name),
            });
        }
        Ok(())
    }

    fn rest(self) -> Bytes {
        self.blob.slice(self.pos..)
    }
}

/// Slice a `PWAR` blob.
pub fn split_archive(blob: &Bytes) -> LoadResult<ArchiveParts> {
    let mut cur = Cursor::new(blob);
    cur.magic(ContainerFormat::Archive)?;
    let header = ArchiveHeader {
        manifest_len: cur.len()?,
        sheet_width: cur.u32()?,
        sheet_height: cur.u32()?,
        payload_raw_len: cur.len()?,
    };
    let manifest = cur.take(header.manifest_len)?;
    Ok(ArchiveParts {
        header,
        manifest,
        payload: cur.rest(),
    })
}

/// Slice a `PWCK` blob.
pub fn split_chunked(blob: &Bytes) -> LoadResult<ChunkedParts> {
    let mut cur = Cursor::new(blob);
    cur.magic(ContainerFormat::Chunked)?;
    let manifest_len = cur.len()?;
    let manifest = cur.take(manifest_len)?;
    Ok(ChunkedParts {
        manifest,
        region: cur.rest(),
    })
}
