//! Image preparation
//!
//! Backends cap attachments by encoded size and, for some, by pixel count.
//! [`Image::prepare`] shrinks an image until it satisfies both, never scaling
//! it up.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::debug;

use crate::error::{ImageError, Result};
use crate::types::ImageMimeType;

const JPEG_QUALITIES: [u8; 3] = [90, 80, 70];
const SCALE_STEP: f64 = 0.8;
const MAX_SCALE_STEPS: usize = 12;

/// An image attachment held in memory
#[derive(Clone)]
pub struct Image {
    pub data: Vec<u8>,
    /// Alt text
    pub description: String,
    pub mime_type: ImageMimeType,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("bytes", &self.data.len())
            .field("description", &self.description)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Encoding {
    Png,
    Jpeg(u8),
}

impl Image {
    pub fn new(data: Vec<u8>, description: impl Into<String>, mime_type: ImageMimeType) -> Self {
        Self {
            data,
            description: description.into(),
            mime_type,
        }
    }

    /// Pixel dimensions, read from the image header
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let reader = ImageReader::new(Cursor::new(&self.data))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;
        Ok(reader.into_dimensions().map_err(ImageError::Decode)?)
    }

    /// Shrink the image in place to at most `max_bytes` encoded bytes and,
    /// when `max_pixels` is set, at most `max_pixels` pixels.
    ///
    /// An image already inside both limits is left untouched. Otherwise the
    /// image is downscaled to the pixel budget and re-encoded, first in its
    /// own format (PNG only), then as JPEG at decreasing quality, shrinking
    /// further between rounds until the byte budget is met.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Decode` if the data is not a readable image and
    /// `ImageError::CannotFit` if no attempt fits in `max_bytes`.
    pub fn prepare(&mut self, max_bytes: usize, max_pixels: Option<u64>) -> Result<()> {
        let (width, height) = self.dimensions()?;
        let pixels = u64::from(width) * u64::from(height);
        let pixel_budget = max_pixels.unwrap_or(u64::MAX);

        if self.data.len() <= max_bytes && pixels <= pixel_budget {
            return Ok(());
        }

        let source = image::load_from_memory(&self.data).map_err(ImageError::Decode)?;

        let mut scale = if pixels > pixel_budget {
            (pixel_budget as f64 / pixels as f64).sqrt()
        } else {
            1.0
        };
        let mut smallest = usize::MAX;

        for _ in 0..MAX_SCALE_STEPS {
            let candidate = scaled(&source, scale, pixel_budget);

            for encoding in self.encodings() {
                let encoded = encode(&candidate, encoding)?;
                if encoded.len() <= max_bytes {
                    debug!(
                        from_bytes = self.data.len(),
                        to_bytes = encoded.len(),
                        width = candidate.width(),
                        height = candidate.height(),
                        "Resized image"
                    );
                    self.data = encoded;
                    self.mime_type = match encoding {
                        Encoding::Png => ImageMimeType::Png,
                        Encoding::Jpeg(_) => ImageMimeType::Jpeg,
                    };
                    return Ok(());
                }
                smallest = smallest.min(encoded.len());
            }

            scale *= SCALE_STEP;
        }

        Err(ImageError::CannotFit {
            max_bytes,
            smallest,
        }
        .into())
    }

    fn encodings(&self) -> Vec<Encoding> {
        let mut encodings = Vec::with_capacity(JPEG_QUALITIES.len() + 1);
        if self.mime_type == ImageMimeType::Png {
            encodings.push(Encoding::Png);
        }
        encodings.extend(JPEG_QUALITIES.iter().map(|q| Encoding::Jpeg(*q)));
        encodings
    }
}

/// Keep the first `max_count` images and prepare each one for the given limits
pub fn prepare_all(
    images: &[Image],
    max_count: usize,
    max_bytes: usize,
    max_pixels: Option<u64>,
) -> Result<Vec<Image>> {
    images
        .iter()
        .take(max_count)
        .map(|image| {
            let mut image = image.clone();
            image.prepare(max_bytes, max_pixels)?;
            Ok(image)
        })
        .collect()
}

fn scaled(source: &DynamicImage, scale: f64, pixel_budget: u64) -> DynamicImage {
    if scale >= 1.0 {
        return source.clone();
    }

    let mut width = ((f64::from(source.width()) * scale).floor() as u32).max(1);
    let mut height = ((f64::from(source.height()) * scale).floor() as u32).max(1);

    // Float rounding can land one row or column over budget
    while u64::from(width) * u64::from(height) > pixel_budget && (width > 1 || height > 1) {
        if width >= height {
            width -= 1;
        } else {
            height -= 1;
        }
    }

    source.resize_exact(width, height, FilterType::Lanczos3)
}

fn encode(image: &DynamicImage, encoding: Encoding) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match encoding {
        Encoding::Png => image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(ImageError::Encode)?,
        Encoding::Jpeg(quality) => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
                .map_err(ImageError::Encode)?
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChorusError;
    use image::{Rgb, RgbImage};

    fn noisy_png(width: u32, height: u32) -> Image {
        let pixels = RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ x.wrapping_mul(y);
            Rgb([(v % 251) as u8, (v % 241) as u8, (v % 239) as u8])
        });
        let mut data = Vec::new();
        DynamicImage::ImageRgb8(pixels)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        Image::new(data, "noise", ImageMimeType::Png)
    }

    #[test]
    fn test_image_within_limits_is_untouched() {
        let mut image = noisy_png(16, 16);
        let original = image.data.clone();

        image.prepare(10_000_000, Some(1_000_000)).unwrap();

        assert_eq!(image.data, original);
        assert_eq!(image.mime_type, ImageMimeType::Png);
    }

    #[test]
    fn test_pixel_budget_is_enforced() {
        let mut image = noisy_png(200, 100);

        image.prepare(10_000_000, Some(5_000)).unwrap();

        let (width, height) = image.dimensions().unwrap();
        assert!(u64::from(width) * u64::from(height) <= 5_000);
        assert!(width < 200 && height < 100);
        assert_eq!(image.description, "noise");
    }

    #[test]
    fn test_byte_budget_is_enforced() {
        let mut image = noisy_png(256, 256);
        assert!(image.data.len() > 20_000);

        image.prepare(20_000, None).unwrap();

        assert!(image.data.len() <= 20_000);
        let (width, height) = image.dimensions().unwrap();
        assert!(width <= 256 && height <= 256);
    }

    #[test]
    fn test_never_upscales() {
        let mut image = noisy_png(64, 32);

        // Pixel budget well above the image, byte budget forces a re-encode
        image.prepare(image.data.len() - 1, Some(1_000_000)).unwrap();

        let (width, height) = image.dimensions().unwrap();
        assert!(width <= 64);
        assert!(height <= 32);
    }

    #[test]
    fn test_garbage_data_is_a_decode_error() {
        let mut image = Image::new(vec![1, 2, 3, 4], "junk", ImageMimeType::Jpeg);
        let result = image.prepare(10, None);
        assert!(matches!(result, Err(ChorusError::Image(ImageError::Decode(_)))));
    }

    #[test]
    fn test_prepare_all_drops_excess_images() {
        let images: Vec<Image> = (0..6).map(|_| noisy_png(8, 8)).collect();

        let prepared = prepare_all(&images, 4, 10_000_000, None).unwrap();

        assert_eq!(prepared.len(), 4);
    }
}
