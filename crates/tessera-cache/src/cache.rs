use std::{collections::HashMap, rc::Rc};

use bytes::Bytes;
use tessera_core::{FileMetadata, Surface, TextureDesc, TextureHandle};
use tracing::{debug, error, trace, warn};

/// Pixel bytes a texture can be rebuilt from, stored under `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawShadow {
    pub key: String,
    pub bytes: Bytes,
}

/// Everything [`ResourceCache::set`] stores for one file.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub metadata: FileMetadata,
    pub raw: Option<RawShadow>,
}

#[derive(Debug)]
struct FileEntry {
    texture: TextureHandle,
    raw_key: Option<String>,
    width: u32,
    height: u32,
    used_count: u32,
    metadata: FileMetadata,
}

#[derive(Debug, Default)]
struct SourceEntry {
    files: HashMap<String, FileEntry>,
    /// Unshadowed textures of released files, freed with the source.
    retired: Vec<TextureHandle>,
    used_count: u32,
}

/// Reference-counted store of decoded files, grouped by source.
///
/// ## Normative
/// - `get` increments the file's and the source's used count.
/// - A file whose count drops to zero is removed. Its texture is destroyed
///   only if it has a raw shadow; without one the texture is not owned by
///   this cache.
/// - A source whose count drops to zero is removed together with every
///   texture of its files and the raw shadows keyed by them. Shadows of other
///   sources are untouched.
/// - A stored texture is never replaced by `set`; invalidated textures are
///   rebuilt from the shadow with the stored size and format.
pub struct ResourceCache {
    surface: Rc<dyn Surface>,
    sources: HashMap<String, SourceEntry>,
    raw: HashMap<String, Bytes>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("sources", &self.sources.len())
            .field("raw", &self.raw.len())
            .finish_non_exhaustive()
    }
}

impl ResourceCache {
    pub fn new(surface: Rc<dyn Surface>) -> Self {
        Self {
            surface,
            sources: HashMap::new(),
            raw: HashMap::new(),
        }
    }

    #[must_use]
    pub fn has_source(&self, source: &str) -> bool {
        self.sources.contains_key(source)
    }

    #[must_use]
    pub fn has_file(&self, source: &str, file: &str) -> bool {
        self.sources
            .get(source)
            .is_some_and(|s| s.files.contains_key(file))
    }

    /// Store a freshly decoded file. Returns `false` (and changes nothing)
    /// when the file is already present.
    pub fn set(&mut self, source: &str, file: &str, entry: NewFile) -> bool {
        if self.has_file(source, file) {
            error!(source, file, "file already cached, ignoring set");
            return false;
        }

        let raw_key = entry.raw.map(|shadow| {
            self.raw.insert(shadow.key.clone(), shadow.bytes);
            shadow.key
        });
        trace!(
            source,
            file,
            width = entry.width,
            height = entry.height,
            shadowed = raw_key.is_some(),
            "set"
        );
        self.sources.entry(source.to_string()).or_default().files.insert(
            file.to_string(),
            FileEntry {
                texture: entry.texture,
                raw_key,
                width: entry.width,
                height: entry.height,
                used_count: 0,
                metadata: entry.metadata,
            },
        );
        true
    }

    /// Take one reference on `file` and return its live texture.
    ///
    /// An invalidated texture is rebuilt from the raw shadow. Without a
    /// shadow the file cannot be rebuilt and `None` is returned.
    pub fn get(&mut self, source: &str, file: &str) -> Option<TextureHandle> {
        let entry = self.sources.get_mut(source)?;
        let record = entry.files.get_mut(file)?;

        if !self.surface.is_alive(record.texture) {
            let Some(bytes) = record.raw_key.as_ref().and_then(|k| self.raw.get(k)) else {
                error!(source, file, "texture invalidated and no raw shadow to rebuild from");
                return None;
            };
            let desc = TextureDesc {
                width: record.width,
                height: record.height,
                format: record.metadata.format,
            };
            record.texture = self.surface.create_texture(&desc, bytes);
            debug!(source, file, texture = record.texture.0, "regenerated");
        }

        record.used_count += 1;
        entry.used_count += 1;
        Some(record.texture)
    }

    /// Current texture without taking a reference or regenerating.
    #[must_use]
    pub fn peek(&self, source: &str, file: &str) -> Option<TextureHandle> {
        self.sources.get(source)?.files.get(file).map(|f| f.texture)
    }

    /// Drop one reference on `file`.
    pub fn release(&mut self, source: &str, file: &str) {
        let Some(entry) = self.sources.get_mut(source) else {
            warn!(source, file, "release of unknown source");
            return;
        };
        let Some(record) = entry.files.get_mut(file) else {
            warn!(source, file, "release of unknown file");
            return;
        };
        if record.used_count == 0 {
            warn!(source, file, "release without matching get");
            return;
        }

        record.used_count -= 1;
        if record.used_count == 0 {
            if let Some(dropped) = entry.files.remove(file) {
                match &dropped.raw_key {
                    Some(key) => {
                        self.surface.destroy_texture(dropped.texture);
                        self.raw.remove(key);
                    }
                    None => entry.retired.push(dropped.texture),
                }
                trace!(source, file, "file released");
            }
        }
        entry.used_count = entry.used_count.saturating_sub(1);
        if entry.used_count == 0 {
            self.remove_source(source);
        }
    }

    /// Remove `source` if nothing references it. Returns whether it was removed.
    ///
    /// Covers sources that were populated but never handed out, including
    /// partial output of a failed load.
    pub fn evict_unused(&mut self, source: &str) -> bool {
        match self.sources.get(source) {
            Some(entry) if entry.used_count == 0 => {
                self.remove_source(source);
                true
            }
            _ => false,
        }
    }

    fn remove_source(&mut self, source: &str) {
        let Some(entry) = self.sources.remove(source) else {
            return;
        };
        for texture in &entry.retired {
            if self.surface.is_alive(*texture) {
                self.surface.destroy_texture(*texture);
            }
        }
        for record in entry.files.values() {
            if self.surface.is_alive(record.texture) {
                self.surface.destroy_texture(record.texture);
            }
            if let Some(key) = &record.raw_key {
                self.raw.remove(key);
            }
        }
        debug!(source, files = entry.files.len(), "source evicted");
    }

    /// Raw shadow stored under `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        self.raw.get(key).cloned()
    }

    #[must_use]
    pub fn file_raw(&self, source: &str, file: &str) -> Option<Bytes> {
        let key = self.sources.get(source)?.files.get(file)?.raw_key.as_ref()?;
        self.raw(key)
    }

    #[must_use]
    pub fn metadata(&self, source: &str, file: &str) -> Option<&FileMetadata> {
        self.sources
            .get(source)?
            .files
            .get(file)
            .map(|f| &f.metadata)
    }

    /// File names of `source`, sorted.
    #[must_use]
    pub fn file_names(&self, source: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources
            .get(source)
            .map(|s| s.files.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    #[must_use]
    pub fn source_used_count(&self, source: &str) -> Option<u32> {
        self.sources.get(source).map(|s| s.used_count)
    }

    #[must_use]
    pub fn file_used_count(&self, source: &str, file: &str) -> Option<u32> {
        self.sources
            .get(source)?
            .files
            .get(file)
            .map(|f| f.used_count)
    }

    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }
}
