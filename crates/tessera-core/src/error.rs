use thiserror::Error;

/// Raw failure reported by the fetch service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fetch failed with code {code}: {message}")]
pub struct FetchError {
    pub code: u16,
    pub message: String,
}

impl FetchError {
    pub fn new<S: Into<String>>(code: u16, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Unreachable,
    RedirectLimit,
    SizeLimit,
    RateLimited,
    Http(u16),
    Other,
}

impl TransportKind {
    /// Classifies a raw `(code, message)` pair from the fetch service.
    ///
    /// Message hints win over the numeric code because hosts report redirect
    /// and size limits with whatever status the last hop returned.
    #[must_use]
    pub fn classify(code: u16, message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("redirect") {
            return TransportKind::RedirectLimit;
        }
        if message.contains("too large") || message.contains("size limit") || code == 413 {
            return TransportKind::SizeLimit;
        }
        if code == 429 || message.contains("rate limit") {
            return TransportKind::RateLimited;
        }
        if code == 0
            || message.contains("unreachable")
            || message.contains("resolve")
            || message.contains("connection")
        {
            return TransportKind::Unreachable;
        }
        if (100..=599).contains(&code) {
            return TransportKind::Http(code);
        }
        TransportKind::Other
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind:?} (code {code}): {message}")]
pub struct TransportError {
    pub kind: TransportKind,
    pub code: u16,
    pub message: String,
}

impl From<FetchError> for TransportError {
    fn from(error: FetchError) -> Self {
        Self {
            kind: TransportKind::classify(error.code, &error.message),
            code: error.code,
            message: error.message,
        }
    }
}

/// Centralized pipeline error.
///
/// Cloneable so a single failure can be fanned out to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("bad magic: expected `{expected}`, found `{}`", .found.unwrap_or("unknown"))]
    BadMagic {
        expected: &'static str,
        found: Option<&'static str>,
    },
    #[error("payload truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),
    #[error("entry `{entry}` is missing required field `{field}`")]
    MissingField { entry: String, field: &'static str },
    #[error("unsupported manifest version {found} (supported up to {supported})")]
    UnsupportedManifestVersion { found: u32, supported: u32 },
    #[error("unsupported required feature `{0}`")]
    UnsupportedFeature(String),
    #[error("patch `{file}` declares no rectangles")]
    MissingPatchRect { file: String },
    #[error("rectangle {index} of patch `{file}` is out of range")]
    PatchRectOutOfRange { file: String, index: usize },
    #[error("`{file}` depends on unresolved base `{base}`")]
    UnresolvedBase { file: String, base: String },
    #[error("base `{base}` holds {found} bytes but patch `{file}` needs {expected}")]
    BaseSizeMismatch {
        file: String,
        base: String,
        expected: usize,
        found: usize,
    },
    #[error("entry `{file}` holds {found} bytes, expected {expected}")]
    EntrySizeMismatch {
        file: String,
        expected: usize,
        found: usize,
    },
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("image decode failed: {0}")]
    ImageDecode(String),
    #[error("unknown file `{file}` in `{source_url}`")]
    UnknownFile { source_url: String, file: String },

    #[error("`{0}` service is not configured")]
    NotConfigured(&'static str),

    #[error("`{0}` was never registered")]
    UnregisteredUrl(String),
    #[error("`{0}` resolves to an unsupported scheme")]
    UnsupportedScheme(String),
    #[error("source `{0}` is not loaded")]
    SourceNotLoaded(String),
}

impl From<FetchError> for LoadError {
    fn from(error: FetchError) -> Self {
        Self::Transport(error.into())
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Stable code a host maps to localized title and body text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unreachable,
    RedirectLimit,
    SizeLimit,
    RateLimited,
    HttpStatus,
    Transport,
    BadContent,
    BadManifest,
    UnsupportedManifest,
    BadPatch,
    UnresolvedBase,
    Decode,
    NotConfigured,
    Unregistered,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unreachable => "transport.unreachable",
            ErrorCode::RedirectLimit => "transport.redirect_limit",
            ErrorCode::SizeLimit => "transport.size_limit",
            ErrorCode::RateLimited => "transport.rate_limited",
            ErrorCode::HttpStatus => "transport.http_status",
            ErrorCode::Transport => "transport.other",
            ErrorCode::BadContent => "content.bad_payload",
            ErrorCode::BadManifest => "content.bad_manifest",
            ErrorCode::UnsupportedManifest => "content.unsupported_manifest",
            ErrorCode::BadPatch => "content.bad_patch",
            ErrorCode::UnresolvedBase => "content.unresolved_base",
            ErrorCode::Decode => "content.decode",
            ErrorCode::NotConfigured => "integration.not_configured",
            ErrorCode::Unregistered => "consistency.unregistered",
        }
    }
}

impl LoadError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            LoadError::Transport(t) => match t.kind {
                TransportKind::Unreachable => ErrorCode::Unreachable,
                TransportKind::RedirectLimit => ErrorCode::RedirectLimit,
                TransportKind::SizeLimit => ErrorCode::SizeLimit,
                TransportKind::RateLimited => ErrorCode::RateLimited,
                TransportKind::Http(_) => ErrorCode::HttpStatus,
                TransportKind::Other => ErrorCode::Transport,
            },
            LoadError::BadMagic { .. } | LoadError::Truncated { .. } => ErrorCode::BadContent,
            LoadError::MalformedManifest(_) | LoadError::MissingField { .. } => {
                ErrorCode::BadManifest
            }
            LoadError::UnsupportedManifestVersion { .. } | LoadError::UnsupportedFeature(_) => {
                ErrorCode::UnsupportedManifest
            }
            LoadError::MissingPatchRect { .. }
            | LoadError::PatchRectOutOfRange { .. }
            | LoadError::BaseSizeMismatch { .. } => ErrorCode::BadPatch,
            LoadError::UnresolvedBase { .. } => ErrorCode::UnresolvedBase,
            LoadError::EntrySizeMismatch { .. }
            | LoadError::Decompress(_)
            | LoadError::ImageDecode(_)
            | LoadError::UnknownFile { .. } => ErrorCode::Decode,
            LoadError::NotConfigured(_) => ErrorCode::NotConfigured,
            LoadError::UnregisteredUrl(_)
            | LoadError::UnsupportedScheme(_)
            | LoadError::SourceNotLoaded(_) => ErrorCode::Unregistered,
        }
    }
}
