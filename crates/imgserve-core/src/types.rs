//! Core data types for the imgserve pipeline.
//!
//! These are value types: a source image's content identity, the namespace it
//! lives under, and the parsed descriptions of the derivatives requested for it.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// MD5 hex digest of an original's raw bytes.
///
/// Always 32 lowercase hex characters when built through [`ContentHash::parse`]
/// or [`ContentHash::of_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Length of a hex-encoded MD5 digest.
    pub const LEN: usize = 32;

    /// Parse a client-supplied hash.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        let valid = value.len() == Self::LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(PipelineError::Validation(format!(
                "hash must be {} lowercase hex characters, got {value:?}",
                Self::LEN
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Compute the content hash of an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        Self(format!("{:x}", digest))
    }

    pub(crate) fn from_hex_unchecked(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Logical grouping (tenant or bucket) used only as a key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Parse a namespace, rejecting values that could escape or split a key path.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        if value.is_empty() {
            return Err(PipelineError::Validation("namespace must not be empty".into()));
        }
        if value == "." || value == ".." {
            return Err(PipelineError::Validation(format!(
                "namespace {value:?} is reserved"
            )));
        }
        if value
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
        {
            return Err(PipelineError::Validation(format!(
                "namespace {value:?} contains a path separator, whitespace or control character"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Intrinsic properties of an original, persisted as its sidecar.
///
/// Field order is part of the sidecar format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProperties {
    /// Hex content hash
    pub hash: String,
    /// Height in pixels (0 when not decoded)
    pub height: u32,
    /// Width in pixels (0 when not decoded)
    pub width: u32,
    /// MIME type
    pub content_type: String,
}

impl ImageProperties {
    /// Serialize to the compact sidecar JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the sidecar JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The hash as a validated [`ContentHash`].
    pub fn content_hash(&self) -> Result<ContentHash, PipelineError> {
        ContentHash::parse(&self.hash)
    }
}

/// Encoded format of a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl DerivativeFormat {
    /// Parse a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Canonical extension used in storage keys.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// The `image` crate format used for encoding.
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Webp => image::ImageFormat::WebP,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

/// Geometry of a requested derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geometry {
    /// Keep the original dimensions
    FullSize,
    /// Square, center-cropped
    Square(u32),
    /// Fixed width, height follows aspect ratio
    Width(u32),
    /// Exact box, filled then center-cropped
    Exact { width: u32, height: u32 },
}

/// One requested derivative, parsed from a token such as `300x200-q80.jpg`.
///
/// Grammar: `GEOMETRY[-qQUALITY].EXT` where `GEOMETRY` is one of `full_size`,
/// `xN`, `wN` or `WxH`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputSpec {
    pub geometry: Geometry,
    pub format: DerivativeFormat,
    pub quality: Option<u8>,
}

const MAX_SPEC_DIMENSION: u32 = 10_000;

impl OutputSpec {
    /// Parse a single output token.
    pub fn parse(token: &str) -> Result<Self, PipelineError> {
        let invalid = |why: &str| PipelineError::Validation(format!("output {token:?}: {why}"));

        let (stem, ext) = token
            .rsplit_once('.')
            .ok_or_else(|| invalid("missing format extension"))?;
        let format =
            DerivativeFormat::from_extension(ext).ok_or_else(|| invalid("unsupported format"))?;

        let (geometry_part, quality) = match stem.rsplit_once("-q") {
            Some((geometry, q)) => {
                let q: u8 = q.parse().map_err(|_| invalid("quality is not a number"))?;
                if !(1..=100).contains(&q) {
                    return Err(invalid("quality must be between 1 and 100"));
                }
                (geometry, Some(q))
            }
            None => (stem, None),
        };

        let dimension = |s: &str| -> Result<u32, PipelineError> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("dimension is not a number"));
            }
            let n: u32 = s.parse().map_err(|_| invalid("dimension is not a number"))?;
            if n == 0 || n > MAX_SPEC_DIMENSION {
                return Err(invalid("dimension out of range"));
            }
            Ok(n)
        };

        let geometry = if geometry_part == "full_size" {
            Geometry::FullSize
        } else if let Some(n) = geometry_part.strip_prefix('x') {
            Geometry::Square(dimension(n)?)
        } else if let Some(n) = geometry_part.strip_prefix('w') {
            Geometry::Width(dimension(n)?)
        } else if let Some((w, h)) = geometry_part.split_once('x') {
            Geometry::Exact {
                width: dimension(w)?,
                height: dimension(h)?,
            }
        } else {
            return Err(invalid("unrecognized geometry"));
        };

        Ok(Self {
            geometry,
            format,
            quality,
        })
    }

    /// Parse a comma-separated output list, skipping empty tokens.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, PipelineError> {
        list.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Format name reported with per-item events.
    pub fn format_name(&self) -> &'static str {
        self.format.extension()
    }
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.geometry {
            Geometry::FullSize => write!(f, "full_size")?,
            Geometry::Square(n) => write!(f, "x{n}")?,
            Geometry::Width(n) => write!(f, "w{n}")?,
            Geometry::Exact { width, height } => write!(f, "{width}x{height}")?,
        }
        if let Some(q) = self.quality {
            write!(f, "-q{q}")?;
        }
        write!(f, ".{}", self.format.extension())
    }
}

impl std::str::FromStr for OutputSpec {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_known_vectors() {
        assert_eq!(
            ContentHash::of_bytes(b"").as_str(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            ContentHash::of_bytes(b"The quick brown fox jumps over the lazy dog").as_str(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_content_hash_parse() {
        assert!(ContentHash::parse("31e8b3187a9f63f26d58c88bf09a7bbd").is_ok());
        assert!(ContentHash::parse("31E8B3187A9F63F26D58C88BF09A7BBD").is_err());
        assert!(ContentHash::parse("31e8b3187a9f").is_err());
        assert!(ContentHash::parse("").is_err());
    }

    #[test]
    fn test_namespace_rejects_separators() {
        assert!(Namespace::parse("avatars").is_ok());
        assert!(Namespace::parse("").is_err());
        assert!(Namespace::parse("a/b").is_err());
        assert!(Namespace::parse("..").is_err());
        assert!(Namespace::parse("with space").is_err());
    }

    #[test]
    fn test_image_properties_to_json_layout() {
        let props = ImageProperties {
            hash: "THISISAHASH".to_string(),
            height: 10,
            width: 20,
            content_type: "image/jpeg".to_string(),
        };
        assert_eq!(
            props.to_json().unwrap(),
            r#"{"hash":"THISISAHASH","height":10,"width":20,"content_type":"image/jpeg"}"#
        );
    }

    #[test]
    fn test_image_properties_round_trip() {
        let props = ImageProperties {
            hash: "2a9d1753531a2c060c002a97b983854c".to_string(),
            height: 496,
            width: 574,
            content_type: "image/webp".to_string(),
        };
        let back = ImageProperties::from_json(&props.to_json().unwrap()).unwrap();
        assert_eq!(back, props);
        assert!(back.content_hash().is_ok());
    }

    #[test]
    fn test_output_spec_parse_variants() {
        let spec = OutputSpec::parse("300x200.jpg").unwrap();
        assert_eq!(
            spec.geometry,
            Geometry::Exact {
                width: 300,
                height: 200
            }
        );
        assert_eq!(spec.format, DerivativeFormat::Jpeg);

        assert_eq!(
            OutputSpec::parse("x110.webp").unwrap().geometry,
            Geometry::Square(110)
        );
        assert_eq!(
            OutputSpec::parse("w400.png").unwrap().geometry,
            Geometry::Width(400)
        );
        let full = OutputSpec::parse("full_size-q60.jpg").unwrap();
        assert_eq!(full.geometry, Geometry::FullSize);
        assert_eq!(full.quality, Some(60));
    }

    #[test]
    fn test_output_spec_canonical_rendering() {
        let spec = OutputSpec::parse("300x200.JPEG").unwrap();
        assert_eq!(spec.to_string(), "300x200.jpg");
        assert_eq!(OutputSpec::parse("x50-q80.gif").unwrap().to_string(), "x50-q80.gif");
    }

    #[test]
    fn test_output_spec_rejects_bad_tokens() {
        for token in [
            "original",
            "info.json",
            "300x200",
            "x0.jpg",
            "x.jpg",
            "abc.png",
            "w10-q0.png",
            "w10-q101.png",
            "w+10.png",
            "300x200.bmp",
        ] {
            assert!(OutputSpec::parse(token).is_err(), "accepted {token}");
        }
    }

    #[test]
    fn test_parse_list_skips_empty_tokens() {
        let specs = OutputSpec::parse_list("x300.jpg, ,full_size.webp,").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].to_string(), "full_size.webp");
    }
}
