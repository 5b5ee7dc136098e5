//! Builders for archive and chunked-archive blobs.
//!
//! Both emit the little-endian `u32` header layout the decoders read.

use bytes::Bytes;
use serde_json::{Value, json};
use tessera_core::Rect;

/// Deterministic pixel bytes; different seeds give different buffers.
#[must_use]
pub fn pattern(width: u32, height: u32, bpp: usize, seed: u8) -> Vec<u8> {
    let len = width as usize * height as usize * bpp;
    (0..len)
        .map(|i| (i.wrapping_mul(31).wrapping_add(usize::from(seed)) % 256) as u8)
        .collect()
}

fn rect_json(rect: Rect) -> Value {
    json!({ "x": rect.x, "y": rect.y, "w": rect.w, "h": rect.h })
}

fn v1_manifest() -> Value {
    json!({
        "manifestVersion": 1,
        "requiredFeatures": [],
        "extensions": {},
        "files": [],
    })
}

fn push_u32(out: &mut Vec<u8>, value: usize) {
    let value = u32::try_from(value).expect("blob field exceeds u32");
    out.extend_from_slice(&value.to_le_bytes());
}

/// Builds `PWAR` blobs: header, manifest, one LZ4 block payload.
#[derive(Clone, Debug)]
pub struct ArchiveBuilder {
    sheet: (u32, u32),
    payload: Vec<u8>,
    manifest: Value,
}

impl ArchiveBuilder {
    /// Empty v1 archive.
    #[must_use]
    pub fn v1() -> Self {
        Self {
            sheet: (0, 0),
            payload: Vec::new(),
            manifest: v1_manifest(),
        }
    }

    /// v0 archive whose payload is one `width x height` rgba32 sheet.
    #[must_use]
    pub fn v0(width: u32, height: u32, sheet: &[u8]) -> Self {
        Self {
            sheet: (width, height),
            payload: sheet.to_vec(),
            manifest: json!([]),
        }
    }

    /// v0 entry cropped out of the sheet.
    #[must_use]
    pub fn crop(mut self, path: &str, rect: Rect) -> Self {
        self.manifest
            .as_array_mut()
            .expect("crop entries need a v0 archive")
            .push(json!({ "path": path, "rect": rect_json(rect) }));
        self
    }

    #[must_use]
    pub fn manifest_version(mut self, version: u64) -> Self {
        self.manifest["manifestVersion"] = json!(version);
        self
    }

    #[must_use]
    pub fn require(mut self, feature: &str) -> Self {
        self.manifest["requiredFeatures"]
            .as_array_mut()
            .expect("v1 manifest")
            .push(json!(feature));
        self
    }

    /// Master entry; `pixels` are appended to the flat payload.
    #[must_use]
    pub fn master(mut self, name: &str, width: u32, height: u32, pixels: &[u8]) -> Self {
        let offset = self.payload.len();
        self.payload.extend_from_slice(pixels);
        self.file(json!({
            "name": name,
            "format": "rgba32",
            "width": width,
            "height": height,
            "offset": offset,
            "length": pixels.len(),
        }))
    }

    /// Patch entry; each rect's bytes are appended to the flat payload.
    #[must_use]
    pub fn patch(
        mut self,
        name: &str,
        base: &str,
        width: u32,
        height: u32,
        rects: &[(Rect, &[u8])],
    ) -> Self {
        let mut entries = Vec::new();
        for (rect, bytes) in rects {
            let offset = self.payload.len();
            self.payload.extend_from_slice(bytes);
            let mut entry = rect_json(*rect);
            entry["offset"] = json!(offset);
            entry["length"] = json!(bytes.len());
            entries.push(entry);
        }
        self.file(json!({
            "name": name,
            "kind": "patch",
            "base": base,
            "format": "rgba32",
            "width": width,
            "height": height,
            "rects": entries,
        }))
    }

    /// Append a raw v1 descriptor.
    #[must_use]
    pub fn file(mut self, entry: Value) -> Self {
        self.manifest["files"]
            .as_array_mut()
            .expect("v1 manifest")
            .push(entry);
        self
    }

    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn build(&self) -> Bytes {
        let manifest = serde_json::to_vec(&self.manifest).expect("manifest serializes");
        let compressed = lz4_flex::block::compress(&self.payload);
        let mut out = Vec::with_capacity(20 + manifest.len() + compressed.len());
        out.extend_from_slice(b"PWAR");
        push_u32(&mut out, manifest.len());
        push_u32(&mut out, self.sheet.0 as usize);
        push_u32(&mut out, self.sheet.1 as usize);
        push_u32(&mut out, self.payload.len());
        out.extend_from_slice(&manifest);
        out.extend_from_slice(&compressed);
        Bytes::from(out)
    }
}

/// Builds `PWCK` blobs: header, v1 manifest, one LZ4 block per entry.
#[derive(Clone, Debug)]
pub struct ChunkedBuilder {
    region: Vec<u8>,
    manifest: Value,
}

impl Default for ChunkedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            region: Vec::new(),
            manifest: v1_manifest(),
        }
    }

    #[must_use]
    pub fn manifest_version(mut self, version: u64) -> Self {
        self.manifest["manifestVersion"] = json!(version);
        self
    }

    #[must_use]
    pub fn require(mut self, feature: &str) -> Self {
        self.manifest["requiredFeatures"]
            .as_array_mut()
            .expect("v1 manifest")
            .push(json!(feature));
        self
    }

    fn push_chunk(&mut self, raw: &[u8]) -> Value {
        let compressed = lz4_flex::block::compress(raw);
        let offset = self.region.len();
        self.region.extend_from_slice(&compressed);
        json!({ "offset": offset, "length": compressed.len(), "size": raw.len() })
    }

    #[must_use]
    pub fn master(mut self, name: &str, width: u32, height: u32, pixels: &[u8]) -> Self {
        let chunk = self.push_chunk(pixels);
        self.file(json!({
            "name": name,
            "format": "rgba32",
            "width": width,
            "height": height,
            "chunk": chunk,
        }))
    }

    /// Patch entry whose rect bytes are concatenated into its own chunk.
    #[must_use]
    pub fn patch(
        mut self,
        name: &str,
        base: &str,
        width: u32,
        height: u32,
        rects: &[(Rect, &[u8])],
    ) -> Self {
        let mut stream = Vec::new();
        let mut entries = Vec::new();
        for (rect, bytes) in rects {
            let mut entry = rect_json(*rect);
            entry["offset"] = json!(stream.len());
            entry["length"] = json!(bytes.len());
            stream.extend_from_slice(bytes);
            entries.push(entry);
        }
        let chunk = self.push_chunk(&stream);
        self.file(json!({
            "name": name,
            "kind": "patch",
            "base": base,
            "format": "rgba32",
            "width": width,
            "height": height,
            "rects": entries,
            "chunk": chunk,
        }))
    }

    /// Append a raw descriptor.
    #[must_use]
    pub fn file(mut self, entry: Value) -> Self {
        self.manifest["files"]
            .as_array_mut()
            .expect("v1 manifest")
            .push(entry);
        self
    }

    #[must_use]
    pub fn build(&self) -> Bytes {
        let manifest = serde_json::to_vec(&self.manifest).expect("manifest serializes");
        let mut out = Vec::with_capacity(8 + manifest.len() + self.region.len());
        out.extend_from_slice(b"PWCK");
        push_u32(&mut out, manifest.len());
        out.extend_from_slice(&manifest);
        out.extend_from_slice(&self.region);
        Bytes::from(out)
    }
}
