use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Container kind a source is decoded as.
///
/// The kind selects the loader and is also the scheme of every
/// [`EntryAddress`] produced from the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Packed archive, every entry extracted eagerly.
    Archive,
    /// Chunked archive, entries decoded lazily per request.
    Chunked,
    /// Frames sampled from a video.
    Video,
    /// Single image resolved to a local `file://` handle.
    Local,
    /// Single remote image.
    Image,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Archive,
        SourceKind::Chunked,
        SourceKind::Video,
        SourceKind::Local,
        SourceKind::Image,
    ];

    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            SourceKind::Archive => "archive",
            SourceKind::Chunked => "chunked",
            SourceKind::Video => "video",
            SourceKind::Local => "local",
            SourceKind::Image => "image",
        }
    }

    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.scheme() == scheme)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Stable identifier of a source inside entry addresses.
///
/// Same recipe as asset roots: sha256 of the source string, first 16 bytes, hex.
#[must_use]
pub fn source_id(source: &str) -> String {
    let hash = Sha256::digest(source.as_bytes());
    hex::encode(&hash[..16])
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address `{0}` has no `://` separator")]
    MissingScheme(String),
    #[error("unknown entry kind `{0}`")]
    UnknownKind(String),
    #[error("address `{0}` has no entry path")]
    MissingPath(String),
}

/// `<kind>://<sourceId>/<entryPath>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryAddress {
    kind: SourceKind,
    source_id: String,
    path: String,
}

impl EntryAddress {
    /// Address of `path` inside `source`.
    pub fn new<S: Into<String>>(kind: SourceKind, source: &str, path: S) -> Self {
        Self {
            kind,
            source_id: source_id(source),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for EntryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.kind, self.source_id, self.path)
    }
}

impl FromStr for EntryAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(s.to_string()))?;
        let kind = SourceKind::from_scheme(scheme)
            .ok_or_else(|| AddressError::UnknownKind(scheme.to_string()))?;
        // Source ids are hex, so the first `/` always ends the id.
        let (source_id, path) = rest
            .split_once('/')
            .filter(|(id, path)| !id.is_empty() && !path.is_empty())
            .ok_or_else(|| AddressError::MissingPath(s.to_string()))?;

        Ok(Self {
            kind,
            source_id: source_id.to_string(),
            path: path.to_string(),
        })
    }
}
