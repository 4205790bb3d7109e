//! Derivative transform port and the `image`-crate implementation.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

use crate::config::LimitsConfig;
use crate::error::PipelineError;
use crate::types::{DerivativeFormat, Geometry, OutputSpec};

/// Produces derivative bytes from original bytes.
///
/// Implementations must be deterministic for a given (bytes, spec) pair:
/// concurrent requests for the same derivative may both generate it, and
/// the later write must be indistinguishable from the earlier one.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transformer name for logging.
    fn name(&self) -> &str;

    /// Generate the derivative described by `spec`.
    async fn transform(&self, original: &[u8], spec: &OutputSpec)
        -> Result<Vec<u8>, PipelineError>;
}

/// Default JPEG quality when the output spec does not carry one.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Decodes with the `image` crate, resizes per [`Geometry`] and re-encodes.
pub struct ImageTransformer {
    limits: LimitsConfig,
}

impl ImageTransformer {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Synchronous transform (runs in spawn_blocking).
    fn transform_sync(
        original: &[u8],
        spec: &OutputSpec,
        max_dim: u32,
    ) -> Result<Vec<u8>, PipelineError> {
        let fail = |message: String| PipelineError::Transform {
            spec: spec.to_string(),
            message,
        };

        let reader = image::ImageReader::new(Cursor::new(original))
            .with_guessed_format()
            .map_err(|e| fail(format!("cannot detect image format: {e}")))?;
        if reader.format().is_none() {
            return Err(PipelineError::UnsupportedFormat {
                format: "original is not a decodable raster image".to_string(),
            });
        }
        let image = reader.decode().map_err(|e| fail(e.to_string()))?;

        let (src_w, src_h) = image.dimensions();
        if src_w > max_dim || src_h > max_dim {
            return Err(PipelineError::ImageTooLarge {
                width: src_w,
                height: src_h,
                max_dim,
            });
        }

        let (width, height) = target_dimensions(spec.geometry, src_w, src_h, max_dim)?;

        let resized = match spec.geometry {
            Geometry::FullSize => image,
            Geometry::Width(_) => image.resize_exact(width, height, FilterType::Lanczos3),
            Geometry::Square(_) | Geometry::Exact { .. } => {
                image.resize_to_fill(width, height, FilterType::Lanczos3)
            }
        };

        encode(&resized, spec.format, spec.quality).map_err(fail)
    }
}

#[async_trait]
impl Transformer for ImageTransformer {
    fn name(&self) -> &str {
        "image"
    }

    async fn transform(
        &self,
        original: &[u8],
        spec: &OutputSpec,
    ) -> Result<Vec<u8>, PipelineError> {
        let original = original.to_vec();
        let spec_owned = spec.clone();
        let max_dim = self.limits.max_image_dimension;

        tokio::task::spawn_blocking(move || Self::transform_sync(&original, &spec_owned, max_dim))
            .await
            .map_err(|e| PipelineError::Transform {
                spec: spec.to_string(),
                message: format!("Task join error: {e}"),
            })?
    }
}

/// Output size for a geometry applied to a `src_w`×`src_h` source.
///
/// Fails with `ImageTooLarge` when either side exceeds `max_dim`, including
/// a scaled height that does not fit in `u32`.
pub fn target_dimensions(
    geometry: Geometry,
    src_w: u32,
    src_h: u32,
    max_dim: u32,
) -> Result<(u32, u32), PipelineError> {
    let (width, height) = match geometry {
        Geometry::FullSize => (src_w, src_h),
        Geometry::Square(n) => (n, n),
        Geometry::Width(w) => {
            let h = (u64::from(src_h) * u64::from(w) + u64::from(src_w) / 2) / u64::from(src_w.max(1));
            let h = u32::try_from(h).map_err(|_| PipelineError::ImageTooLarge {
                width: w,
                height: u32::MAX,
                max_dim,
            })?;
            (w, h.max(1))
        }
        Geometry::Exact { width, height } => (width, height),
    };
    if width > max_dim || height > max_dim {
        return Err(PipelineError::ImageTooLarge {
            width,
            height,
            max_dim,
        });
    }
    Ok((width, height))
}

fn encode(
    image: &DynamicImage,
    format: DerivativeFormat,
    quality: Option<u8>,
) -> Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        DerivativeFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder =
                JpegEncoder::new_with_quality(&mut buffer, quality.unwrap_or(DEFAULT_JPEG_QUALITY));
            rgb.write_with_encoder(encoder).map_err(|e| e.to_string())?;
        }
        DerivativeFormat::Webp => {
            // The lossless WebP encoder only takes 8-bit RGB/RGBA
            let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            rgba.write_to(&mut buffer, format.image_format())
                .map_err(|e| e.to_string())?;
        }
        DerivativeFormat::Png | DerivativeFormat::Gif => {
            image
                .write_to(&mut buffer, format.image_format())
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::encode_fixture;
    use image::ImageFormat;

    fn transformer() -> ImageTransformer {
        ImageTransformer::new(LimitsConfig::default())
    }

    fn decoded_dimensions(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn test_target_dimensions() {
        let dims = |g, w, h| target_dimensions(g, w, h, 10_000).unwrap();
        assert_eq!(dims(Geometry::FullSize, 574, 496), (574, 496));
        assert_eq!(dims(Geometry::Square(100), 574, 496), (100, 100));
        assert_eq!(dims(Geometry::Width(287), 574, 496), (287, 248));
        assert_eq!(
            dims(
                Geometry::Exact {
                    width: 30,
                    height: 20
                },
                574,
                496
            ),
            (30, 20)
        );
        assert_eq!(dims(Geometry::Width(1), 1000, 1), (1, 1));
    }

    #[test]
    fn test_target_dimensions_over_limit() {
        let err = target_dimensions(Geometry::Width(500), 100, 4000, 10_000).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ImageTooLarge {
                width: 500,
                height: 20_000,
                max_dim: 10_000
            }
        ));
    }

    #[test]
    fn test_target_height_overflowing_u32_is_too_large() {
        // 1 x u32::MAX source widened to u32::MAX: the scaled height needs 64 bits
        let err =
            target_dimensions(Geometry::Width(u32::MAX), 1, u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ImageTooLarge {
                width: u32::MAX,
                height: u32::MAX,
                max_dim: u32::MAX
            }
        ));
    }

    #[tokio::test]
    async fn test_square_jpeg() {
        let original = encode_fixture(ImageFormat::Png, 120, 80);
        let spec = OutputSpec::parse("x40.jpg").unwrap();
        let out = transformer().transform(&original, &spec).await.unwrap();
        assert_eq!(&out[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(decoded_dimensions(&out), (40, 40));
    }

    #[tokio::test]
    async fn test_width_webp_keeps_aspect() {
        let original = encode_fixture(ImageFormat::Jpeg, 200, 100);
        let spec = OutputSpec::parse("w50.webp").unwrap();
        let out = transformer().transform(&original, &spec).await.unwrap();
        assert_eq!(&out[0..4], b"RIFF");
        assert_eq!(decoded_dimensions(&out), (50, 25));
    }

    #[tokio::test]
    async fn test_full_size_png_and_gif() {
        let original = encode_fixture(ImageFormat::WebP, 64, 48);
        for token in ["full_size.png", "full_size.gif"] {
            let spec = OutputSpec::parse(token).unwrap();
            let out = transformer().transform(&original, &spec).await.unwrap();
            assert_eq!(decoded_dimensions(&out), (64, 48), "{token}");
        }
    }

    #[tokio::test]
    async fn test_deterministic_output() {
        let original = encode_fixture(ImageFormat::Png, 90, 60);
        let spec = OutputSpec::parse("30x20-q70.jpg").unwrap();
        let a = transformer().transform(&original, &spec).await.unwrap();
        let b = transformer().transform(&original, &spec).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_non_image_original_fails() {
        let spec = OutputSpec::parse("x40.jpg").unwrap();
        let err = transformer()
            .transform(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>", &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_rejects_oversized_target() {
        let limits = LimitsConfig {
            max_image_dimension: 100,
            ..LimitsConfig::default()
        };
        let original = encode_fixture(ImageFormat::Png, 50, 50);
        let spec = OutputSpec::parse("x500.png").unwrap();
        let err = ImageTransformer::new(limits)
            .transform(&original, &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ImageTooLarge { .. }));
    }
}
