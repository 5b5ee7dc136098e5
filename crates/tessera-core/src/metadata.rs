use crate::{format::PixelFormat, geometry::Rect};

/// Per-file metadata kept next to the decoded resource.
///
/// `format` is what regeneration re-uploads with; `dependency` names the base
/// a patch was reconstructed from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub format: PixelFormat,
    pub crop: Vec<Rect>,
    pub dependency: Option<String>,
}

impl FileMetadata {
    #[must_use]
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_crop(mut self, crop: Vec<Rect>) -> Self {
        self.crop = crop;
        self
    }

    #[must_use]
    pub fn with_dependency<S: Into<String>>(mut self, base: S) -> Self {
        self.dependency = Some(base.into());
        self
    }
}
