use serde::{Deserialize, Serialize};
use tracing::debug;

/// Closed set of pixel layouts a container may declare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit RGBA. The fallback for unrecognized format strings.
    #[default]
    Rgba32,
    Bgra32,
    Rgb24,
    Alpha8,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Alpha8 => 1,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgba32 => "rgba32",
            PixelFormat::Bgra32 => "bgra32",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Alpha8 => "alpha8",
        }
    }

    /// Strict parse, case-insensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rgba32" | "rgba" => Some(PixelFormat::Rgba32),
            "bgra32" | "bgra" => Some(PixelFormat::Bgra32),
            "rgb24" | "rgb" => Some(PixelFormat::Rgb24),
            "alpha8" | "a8" => Some(PixelFormat::Alpha8),
            _ => None,
        }
    }

    /// Lenient parse used for entry descriptors: unknown or absent strings map
    /// to `fallback`.
    #[must_use]
    pub fn parse_or(s: Option<&str>, fallback: PixelFormat) -> Self {
        match s {
            None => fallback,
            Some(raw) => Self::parse(raw).unwrap_or_else(|| {
                debug!(format = raw, fallback = fallback.name(), "unknown pixel format");
                fallback
            }),
        }
    }

    /// Byte length of a tightly packed `width × height` buffer.
    #[must_use]
    pub fn buffer_len(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("rgba32", PixelFormat::Rgba32, 4)]
    #[case("BGRA32", PixelFormat::Bgra32, 4)]
    #[case("rgb24", PixelFormat::Rgb24, 3)]
    #[case("a8", PixelFormat::Alpha8, 1)]
    fn parses_known_formats(#[case] raw: &str, #[case] expected: PixelFormat, #[case] bpp: usize) {
        let format = PixelFormat::parse(raw).unwrap();
        assert_eq!(format, expected);
        assert_eq!(format.bytes_per_pixel(), bpp);
    }

    #[test]
    fn unknown_format_falls_back() {
        assert_eq!(PixelFormat::parse("etc2"), None);
        assert_eq!(
            PixelFormat::parse_or(Some("etc2"), PixelFormat::default()),
            PixelFormat::Rgba32
        );
        assert_eq!(
            PixelFormat::parse_or(None, PixelFormat::Alpha8),
            PixelFormat::Alpha8
        );
    }

    #[test]
    fn buffer_len_checks_overflow() {
        assert_eq!(PixelFormat::Rgb24.buffer_len(4, 2), Some(24));
        assert_eq!(PixelFormat::Rgba32.buffer_len(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn serde_uses_manifest_names() {
        let json = serde_json::to_string(&PixelFormat::Alpha8).unwrap();
        assert_eq!(json, "\"alpha8\"");
    }
}
