//! Magic-byte format detection.
//!
//! Detection looks only at the leading bytes of the stream; file names and
//! extensions are never consulted.

use image::ImageFormat;

/// Raster containers whose geometry can be read from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Jpeg,
    Png,
    Webp,
}

impl SniffedFormat {
    /// Detect the container from the first bytes of a stream.
    pub fn detect(header: &[u8]) -> Option<Self> {
        // JPEG: FF D8 FF
        if header.len() >= 3 && header[..3] == [0xFF, 0xD8, 0xFF] {
            return Some(Self::Jpeg);
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if header.len() >= 8 && header[..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
            return Some(Self::Png);
        }

        // WebP: RIFF....WEBP
        if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }

        None
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Webp => ImageFormat::WebP,
        }
    }
}
