//! Manifest schemas and validation.
//!
//! Two schemas exist:
//! - v0, a bare list of `{path, rect}` crops out of a single sheet;
//! - v1, `{manifestVersion, requiredFeatures, extensions, files}`.
//!
//! Version and feature checks fail the whole manifest. Anything wrong with a
//! single descriptor only rejects that descriptor.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tessera_core::{LoadError, LoadResult, PixelFormat, Rect};
use tracing::{debug, warn};

use crate::{container::ContainerFormat, patch::PatchRect};

/// What this build accepts in a manifest header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestPolicy {
    pub max_version: u32,
    /// Plain capability names. `format:<name>` is understood for every
    /// format [`PixelFormat::parse`] knows.
    pub features: Vec<String>,
    /// Used for descriptors with an absent or unknown format.
    pub default_format: PixelFormat,
}

impl Default for ManifestPolicy {
    fn default() -> Self {
        Self {
            max_version: 1,
            features: ["patch", "crop", "chunked"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_format: PixelFormat::Rgba32,
        }
    }
}

impl ManifestPolicy {
    #[must_use]
    pub fn supports(&self, feature: &str) -> bool {
        if let Some(format) = feature.strip_prefix("format:") {
            return PixelFormat::parse(format).is_some();
        }
        self.features.iter().any(|f| f == feature)
    }
}

/// Byte range into a flat decompressed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

/// Compressed chunk of one chunked-archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ChunkRef {
    pub offset: usize,
    pub length: usize,
    /// Decompressed length.
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryBody {
    /// Full buffer. Archive masters carry a payload span; chunked masters are
    /// their whole chunk.
    Master { span: Option<Span> },
    /// Base entry overwritten by sub-rectangles.
    Patch { base: String, rects: Vec<PatchRect> },
    /// v0 crop of the sheet.
    Crop { rect: Rect },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub body: EntryBody,
    pub chunk: Option<ChunkRef>,
}

impl FileDescriptor {
    #[must_use]
    pub fn base(&self) -> Option<&str> {
        match &self.body {
            EntryBody::Patch { base, .. } => Some(base),
            EntryBody::Master { .. } | EntryBody::Crop { .. } => None,
        }
    }

    #[must_use]
    pub fn is_patch(&self) -> bool {
        self.base().is_some()
    }

    /// Byte length of the decoded pixel buffer.
    #[must_use]
    pub fn buffer_len(&self) -> Option<usize> {
        self.format.buffer_len(self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    pub version: u32,
    pub required_features: Vec<String>,
    pub extensions: Map<String, Value>,
    /// Accepted descriptors in manifest order.
    pub files: Vec<FileDescriptor>,
    /// Descriptors that failed validation, with the reason.
    pub rejected: Vec<(String, LoadError)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifest {
    V0(Vec<Value>),
    V1(RawManifestV1),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifestV1 {
    manifest_version: Option<u32>,
    #[serde(default)]
    required_features: Vec<String>,
    #[serde(default)]
    extensions: Map<String, Value>,
    files: Vec<Value>,
}

#[derive(Deserialize)]
struct RawCrop {
    path: Option<String>,
    rect: Option<Rect>,
}

#[derive(Deserialize)]
struct RawFile {
    name: Option<String>,
    kind: Option<String>,
    format: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    offset: Option<usize>,
    length: Option<usize>,
    base: Option<String>,
    #[serde(default)]
    rects: Vec<PatchRect>,
    chunk: Option<ChunkRef>,
}

fn entry_label(index: usize, value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map_or_else(|| format!("#{index}"), String::from)
}

fn required<T>(value: Option<T>, entry: &str, field: &'static str) -> LoadResult<T> {
    value.ok_or_else(|| LoadError::MissingField {
        entry: entry.to_string(),
        field,
    })
}

impl Manifest {
    /// Parse and validate manifest JSON for `container`.
    pub fn parse(
        json: &[u8],
        container: ContainerFormat,
        policy: &ManifestPolicy,
    ) -> LoadResult<Self> {
        let raw: RawManifest = serde_json::from_slice(json)
            .map_err(|e| LoadError::MalformedManifest(e.to_string()))?;

        let mut manifest = match raw {
            RawManifest::V0(entries) => {
                if container == ContainerFormat::Chunked {
                    return Err(LoadError::MalformedManifest(
                        "chunked containers require a v1 manifest".into(),
                    ));
                }
                let mut manifest = Self::empty(0);
                for (index, value) in entries.into_iter().enumerate() {
                    let label = entry_label(index, &value, "path");
                    manifest.accept(label, Self::v0_entry(value));
                }
                manifest
            }
            RawManifest::V1(v1) => {
                let version = required(v1.manifest_version, "manifest", "manifestVersion")?;
                if version > policy.max_version {
                    return Err(LoadError::UnsupportedManifestVersion {
                        found: version,
                        supported: policy.max_version,
                    });
                }
                if let Some(feature) = v1.required_features.iter().find(|f| !policy.supports(f)) {
                    return Err(LoadError::UnsupportedFeature(feature.clone()));
                }
                let mut manifest = Self::empty(version);
                manifest.required_features = v1.required_features;
                manifest.extensions = v1.extensions;
                for (index, value) in v1.files.into_iter().enumerate() {
                    let label = entry_label(index, &value, "name");
                    let entry = Self::v1_entry(&label, value, container, policy);
                    manifest.accept(label, entry);
                }
                manifest
            }
        };

        manifest.reject_duplicates();
        debug!(
            version = manifest.version,
            files = manifest.files.len(),
            rejected = manifest.rejected.len(),
            "manifest parsed"
        );
        Ok(manifest)
    }

    fn empty(version: u32) -> Self {
        Self {
            version,
            required_features: Vec::new(),
            extensions: Map::new(),
            files: Vec::new(),
            rejected: Vec::new(),
        }
    }

    fn accept(&mut self, label: String, entry: LoadResult<FileDescriptor>) {
        match entry {
            Ok(descriptor) => self.files.push(descriptor),
            Err(error) => {
                warn!(entry = %label, %error, "manifest entry rejected");
                self.rejected.push((label, error));
            }
        }
    }

    fn reject_duplicates(&mut self) {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(self.files.len());
        for descriptor in std::mem::take(&mut self.files) {
            if seen.insert(descriptor.name.clone()) {
                kept.push(descriptor);
            } else {
                let error =
                    LoadError::MalformedManifest(format!("duplicate entry `{}`", descriptor.name));
                warn!(entry = %descriptor.name, "duplicate manifest entry");
                self.rejected.push((descriptor.name, error));
            }
        }
        self.files = kept;
    }

    fn v0_entry(value: Value) -> LoadResult<FileDescriptor> {
        let raw: RawCrop =
            serde_json::from_value(value).map_err(|e| LoadError::MalformedManifest(e.to_string()))?;
        let name = required(raw.path, "v0 entry", "path")?;
        let rect = required(raw.rect, &name, "rect")?;
        Ok(FileDescriptor {
            name,
            format: PixelFormat::Rgba32,
            width: rect.w,
            height: rect.h,
            body: EntryBody::Crop { rect },
            chunk: None,
        })
    }

    fn v1_entry(
        label: &str,
        value: Value,
        container: ContainerFormat,
        policy: &ManifestPolicy,
    ) -> LoadResult<FileDescriptor> {
        let raw: RawFile = serde_json::from_value(value)
            .map_err(|e| LoadError::MalformedManifest(format!("entry `{label}`: {e}")))?;
        let name = required(raw.name, label, "name")?;
        let width = required(raw.width, &name, "width")?;
        let height = required(raw.height, &name, "height")?;
        let format = PixelFormat::parse_or(raw.format.as_deref(), policy.default_format);

        let body = match raw.kind.as_deref() {
            Some("patch") => EntryBody::Patch {
                base: required(raw.base, &name, "base")?,
                rects: raw.rects,
            },
            Some("master") | None => match container {
                ContainerFormat::Archive => EntryBody::Master {
                    span: Some(Span {
                        offset: required(raw.offset, &name, "offset")?,
                        length: required(raw.length, &name, "length")?,
                    }),
                },
                ContainerFormat::Chunked => EntryBody::Master { span: None },
            },
            Some(other) => {
                return Err(LoadError::MalformedManifest(format!(
                    "entry `{name}` has unknown kind `{other}`"
                )));
            }
        };

        let chunk = match container {
            ContainerFormat::Chunked => Some(required(raw.chunk, &name, "chunk")?),
            ContainerFormat::Archive => None,
        };

        Ok(FileDescriptor {
            name,
            format,
            width,
            height,
            body,
            chunk,
        })
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn rejection(&self, name: &str) -> Option<&LoadError> {
        self.rejected
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    /// Accepted entry names in manifest order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn parse(value: Value, container: ContainerFormat) -> LoadResult<Manifest> {
        let bytes = serde_json::to_vec(&value).expect("json");
        Manifest::parse(&bytes, container, &ManifestPolicy::default())
    }

    #[test]
    fn v0_entries_are_crops() {
        let manifest = parse(
            json!([
                { "path": "a.png", "rect": { "x": 0, "y": 0, "w": 2, "h": 2 } },
                { "path": "b.png" },
            ]),
            ContainerFormat::Archive,
        )
        .expect("v0 parses");
        assert_eq!(manifest.version, 0);
        assert_eq!(manifest.names(), vec!["a.png".to_string()]);
        assert_eq!(
            manifest.file("a.png").map(|f| f.body.clone()),
            Some(EntryBody::Crop {
                rect: Rect::new(0, 0, 2, 2)
            })
        );
        assert_eq!(
            manifest.rejection("b.png"),
            Some(&LoadError::MissingField {
                entry: "b.png".into(),
                field: "rect"
            })
        );
    }

    #[test]
    fn v1_masters_and_patches() {
        let manifest = parse(
            json!({
                "manifestVersion": 1,
                "requiredFeatures": ["patch", "format:bgra32"],
                "extensions": { "origin": "test" },
                "files": [
                    { "name": "m", "format": "bgra32", "width": 2, "height": 1, "offset": 0, "length": 8 },
                    { "name": "p", "kind": "patch", "base": "m", "format": "weird", "width": 2, "height": 1,
                      "rects": [{ "offset": 8, "length": 4, "x": 1, "y": 0, "w": 1, "h": 1 }] },
                ],
            }),
            ContainerFormat::Archive,
        )
        .expect("v1 parses");
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.extensions.get("origin"), Some(&json!("test")));
        let master = manifest.file("m").expect("master");
        assert_eq!(master.format, PixelFormat::Bgra32);
        assert_eq!(
            master.body,
            EntryBody::Master {
                span: Some(Span {
                    offset: 0,
                    length: 8
                })
            }
        );
        let patch = manifest.file("p").expect("patch");
        assert_eq!(patch.format, PixelFormat::Rgba32);
        assert_eq!(patch.base(), Some("m"));
    }

    #[rstest]
    #[case(json!({ "manifestVersion": 2, "files": [] }),
           LoadError::UnsupportedManifestVersion { found: 2, supported: 1 })]
    #[case(json!({ "manifestVersion": 1, "requiredFeatures": ["hdr"], "files": [] }),
           LoadError::UnsupportedFeature("hdr".into()))]
    #[case(json!({ "manifestVersion": 1, "requiredFeatures": ["format:yuv420"], "files": [] }),
           LoadError::UnsupportedFeature("format:yuv420".into()))]
    #[case(json!({ "files": [] }),
           LoadError::MissingField { entry: "manifest".into(), field: "manifestVersion" })]
    fn header_failures_reject_whole_manifest(#[case] value: Value, #[case] expected: LoadError) {
        assert_eq!(parse(value, ContainerFormat::Archive).unwrap_err(), expected);
    }

    #[test]
    fn malformed_json_is_fatal() {
        let err = Manifest::parse(b"{not json", ContainerFormat::Archive, &ManifestPolicy::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::MalformedManifest(_)));
    }

    #[test]
    fn chunked_requires_v1_and_chunk_refs() {
        assert!(matches!(
            parse(json!([]), ContainerFormat::Chunked),
            Err(LoadError::MalformedManifest(_))
        ));

        let manifest = parse(
            json!({
                "manifestVersion": 1,
                "files": [
                    { "name": "ok", "width": 1, "height": 1, "chunk": { "offset": 0, "length": 3, "size": 4 } },
                    { "name": "nochunk", "width": 1, "height": 1 },
                ],
            }),
            ContainerFormat::Chunked,
        )
        .expect("manifest parses");
        assert_eq!(manifest.names(), vec!["ok".to_string()]);
        assert_eq!(
            manifest.rejection("nochunk"),
            Some(&LoadError::MissingField {
                entry: "nochunk".into(),
                field: "chunk"
            })
        );
    }

    #[test]
    fn duplicate_names_keep_the_first() {
        let manifest = parse(
            json!({
                "manifestVersion": 1,
                "files": [
                    { "name": "a", "width": 1, "height": 1, "offset": 0, "length": 4 },
                    { "name": "a", "width": 2, "height": 2, "offset": 4, "length": 16 },
                ],
            }),
            ContainerFormat::Archive,
        )
        .expect("manifest parses");
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.file("a").map(|f| f.width), Some(1));
        assert_eq!(manifest.rejected.len(), 1);
    }

    #[rstest]
    #[case("patch", true)]
    #[case("format:alpha8", true)]
    #[case("format:", false)]
    #[case("streaming", false)]
    fn policy_feature_support(#[case] feature: &str, #[case] supported: bool) {
        assert_eq!(ManifestPolicy::default().supports(feature), supported);
    }
}
