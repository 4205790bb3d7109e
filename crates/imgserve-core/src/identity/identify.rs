//! Content identity extraction: hash, content type and dimensions.

use image::ImageReader;
use std::io::Cursor;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;
use crate::types::{ContentHash, ImageProperties};

use super::sniff::SniffedFormat;

/// Compute the identity of an original from its raw bytes.
///
/// The hash always covers the exact input bytes. A caller-supplied
/// `content_type_override` wins over sniffing; in that case dimensions are
/// decoded only if the bytes happen to be a recognized raster container, and
/// are `0` otherwise.
pub fn identify(
    bytes: &[u8],
    content_type_override: Option<&str>,
) -> Result<ImageProperties, PipelineError> {
    let hash = ContentHash::of_bytes(bytes);
    let sniffed = SniffedFormat::detect(bytes);

    let (content_type, (width, height)) = match (content_type_override, sniffed) {
        (Some(content_type), Some(format)) => (
            content_type.to_string(),
            header_dimensions(bytes, format).unwrap_or((0, 0)),
        ),
        (Some(content_type), None) => (content_type.to_string(), (0, 0)),
        (None, Some(format)) => (
            format.content_type().to_string(),
            header_dimensions(bytes, format)?,
        ),
        (None, None) => {
            return Err(PipelineError::UnsupportedFormat {
                format: describe_header(bytes),
            })
        }
    };

    Ok(ImageProperties {
        hash: hash.to_string(),
        height,
        width,
        content_type,
    })
}

/// Read width and height from the container header without decoding pixels.
fn header_dimensions(bytes: &[u8], format: SniffedFormat) -> Result<(u32, u32), PipelineError> {
    ImageReader::with_format(Cursor::new(bytes), format.image_format())
        .into_dimensions()
        .map_err(|e| PipelineError::Decode {
            message: format!("cannot read {} header: {e}", format.content_type()),
        })
}

fn describe_header(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "empty input".to_string();
    }
    let shown: Vec<String> = bytes.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("unrecognized header {}", shown.join(" "))
}

/// File-based identity extraction with size limits.
pub struct Identifier {
    limits: LimitsConfig,
}

impl Identifier {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Identify an image file on disk.
    pub async fn identify_file(
        &self,
        path: &Path,
        content_type_override: Option<&str>,
    ) -> Result<ImageProperties, PipelineError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        identify(&bytes, content_type_override)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::encode_fixture;
    use image::ImageFormat;

    #[test]
    fn test_identify_jpeg() {
        let bytes = encode_fixture(ImageFormat::Jpeg, 574, 496);
        let props = identify(&bytes, None).unwrap();
        assert_eq!(props.height, 496);
        assert_eq!(props.width, 574);
        assert_eq!(props.content_type, "image/jpeg");
        assert_eq!(props.hash, ContentHash::of_bytes(&bytes).as_str());
    }

    #[test]
    fn test_identify_png() {
        let bytes = encode_fixture(ImageFormat::Png, 574, 496);
        let props = identify(&bytes, None).unwrap();
        assert_eq!((props.width, props.height), (574, 496));
        assert_eq!(props.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_identify_webp_without_extension() {
        let bytes = encode_fixture(ImageFormat::WebP, 574, 496);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webp_without_ext");
        std::fs::write(&path, &bytes).unwrap();

        let props = Identifier::new(LimitsConfig::default())
            .identify_file(&path, None)
            .await
            .unwrap();
        assert_eq!(props.content_type, "image/webp");
        assert_eq!((props.width, props.height), (574, 496));
        assert_eq!(props.hash, ContentHash::of_bytes(&bytes).as_str());
    }

    #[tokio::test]
    async fn test_misleading_extension_ignored() {
        let bytes = encode_fixture(ImageFormat::Png, 20, 10);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("really_a_png.jpg");
        std::fs::write(&path, &bytes).unwrap();

        let props = Identifier::new(LimitsConfig::default())
            .identify_file(&path, None)
            .await
            .unwrap();
        assert_eq!(props.content_type, "image/png");
    }

    #[test]
    fn test_identify_svg_with_override() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#;
        let props = identify(svg, Some("image/svg+xml")).unwrap();
        assert_eq!(props.content_type, "image/svg+xml");
        assert_eq!((props.width, props.height), (0, 0));
        assert_eq!(props.hash, ContentHash::of_bytes(svg).as_str());
    }

    #[test]
    fn test_override_keeps_raster_dimensions() {
        let bytes = encode_fixture(ImageFormat::Png, 30, 40);
        let props = identify(&bytes, Some("image/x-custom")).unwrap();
        assert_eq!(props.content_type, "image/x-custom");
        assert_eq!((props.width, props.height), (30, 40));
    }

    #[test]
    fn test_unsupported_without_override() {
        let err = identify(b"<svg/>", None).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));

        let err = identify(&[], None).unwrap_err();
        assert!(err.to_string().contains("empty input"));
    }

    #[test]
    fn test_truncated_header_is_decode_error() {
        let bytes = encode_fixture(ImageFormat::Png, 30, 40);
        let err = identify(&bytes[..12], None).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Identifier::new(LimitsConfig::default())
            .identify_file(&dir.path().join("missing.jpg"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }
}
