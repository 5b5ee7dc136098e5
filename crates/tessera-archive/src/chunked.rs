use std::collections::HashSet;

use bytes::Bytes;
use tessera_core::{LoadError, LoadResult};
use tracing::{debug, warn};

use crate::{
    container::{ContainerFormat, split_chunked},
    manifest::{FileDescriptor, Manifest, ManifestPolicy},
};

/// Parsed `PWCK` blob: the manifest and the chunk region it indexes.
///
/// Nothing is decompressed up front; callers pull one chunk at a time.
#[derive(Debug)]
pub struct ChunkedArchive {
    manifest: Manifest,
    region: Bytes,
}

impl ChunkedArchive {
    /// Validate header, manifest and chunk bounds.
    ///
    /// Descriptors whose chunk falls outside the region are rejected
    /// individually.
    pub fn parse(blob: &Bytes, policy: &ManifestPolicy) -> LoadResult<Self> {
        let parts = split_chunked(blob)?;
        let mut manifest = Manifest::parse(&parts.manifest, ContainerFormat::Chunked, policy)?;

        let region_len = parts.region.len();
        let (kept, out_of_bounds): (Vec<_>, Vec<_>) =
            std::mem::take(&mut manifest.files)
                .into_iter()
                .partition(|f| {
                    f.chunk.is_some_and(|c| {
                        c.offset
                            .checked_add(c.length)
                            .is_some_and(|end| end <= region_len)
                    })
                });
        manifest.files = kept;
        for descriptor in out_of_bounds {
            let needed = descriptor
                .chunk
                .map_or(0, |c| c.offset.saturating_add(c.length));
            warn!(entry = %descriptor.name, needed, region_len, "chunk outside region");
            manifest.rejected.push((
                descriptor.name,
                LoadError::Truncated {
                    needed,
                    available: region_len,
                },
            ));
        }

        debug!(
            files = manifest.files.len(),
            region_len, "chunked archive parsed"
        );
        Ok(Self {
            manifest,
            region: parts.region,
        })
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&FileDescriptor> {
        self.manifest.file(name)
    }

    #[must_use]
    pub fn rejection(&self, name: &str) -> Option<&LoadError> {
        self.manifest.rejection(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.manifest.names()
    }

    /// Compressed bytes of `name` and their decompressed length.
    #[must_use]
    pub fn chunk(&self, name: &str) -> Option<(Bytes, usize)> {
        let chunk = self.descriptor(name)?.chunk?;
        let bytes = self.region.slice(chunk.offset..chunk.offset + chunk.length);
        Some((bytes, chunk.size))
    }

    /// Bases `name` depends on, nearest first, stopping before the first base
    /// for which `resolved` holds.
    ///
    /// A base missing from the manifest or a cycle in the chain is an error
    /// naming the entry whose base could not be resolved.
    pub fn ancestors<F>(&self, name: &str, resolved: F) -> LoadResult<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([name.to_string()]);
        let mut current = name.to_string();

        loop {
            let descriptor = self.descriptor(&current).ok_or_else(|| LoadError::UnknownFile {
                source_url: String::new(),
                file: current.clone(),
            })?;
            let Some(base) = descriptor.base() else {
                return Ok(chain);
            };
            if resolved(base) {
                return Ok(chain);
            }
            if self.descriptor(base).is_none() || !seen.insert(base.to_string()) {
                return Err(LoadError::UnresolvedBase {
                    file: current,
                    base: base.to_string(),
                });
            }
            chain.push(base.to_string());
            current = base.to_string();
        }
    }
}
