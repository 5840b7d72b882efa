use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pixel::PixelBuffer;
use crate::record::{Payload, Record};

/// Error type for image decoding and encoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The bytes are not a supported image.
    #[error("decode error: `{0}`")]
    Decode(String),

    /// The image could not be encoded.
    #[error("encode error: `{0}`")]
    Encode(String),

    /// The pixel layout has a channel count the codec does not handle.
    #[error("unsupported channel count: `{0}`")]
    UnsupportedChannels(usize),

    /// The pixel data does not match its declared shape.
    #[error("invalid shape: `{0}`")]
    Shape(String),
}

/// Channel layout requested when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMode {
    /// Three channels (RGB).
    #[default]
    Color,
    /// One channel (luma).
    Gray,
}

impl ColorMode {
    /// Channels produced by this mode.
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Color => 3,
            ColorMode::Gray => 1,
        }
    }
}

impl From<bool> for ColorMode {
    fn from(is_color: bool) -> Self {
        if is_color {
            ColorMode::Color
        } else {
            ColorMode::Gray
        }
    }
}

/// Image container used for encoded payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG.
    Jpeg,
    /// Lossless BMP.
    Bmp,
}

impl ImageEncoding {
    /// Encoding matching a file extension, case insensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Whether the path's extension names this encoding.
    pub fn matches_path<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            == Some(*self)
    }

    fn format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Size and color requested when decoding an image.
///
/// A resize happens only when both `height` and `width` are non-zero.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageOptions {
    /// Target height, 0 keeps the native height.
    pub height: u32,
    /// Target width, 0 keeps the native width.
    pub width: u32,
    /// Target color mode.
    pub color: ColorMode,
}

impl ImageOptions {
    /// Native size with the given color mode.
    pub fn native(color: ColorMode) -> Self {
        Self::new(0, 0, color)
    }

    /// `(height, width)` to resize to, if any.
    pub fn resize_target(&self) -> Option<(u32, u32)> {
        (self.height > 0 && self.width > 0).then_some((self.height, self.width))
    }
}

pub(crate) fn decode_dynamic_image(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    image::load_from_memory(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

/// Force the color mode, then resize.
pub(crate) fn conform_image(image: DynamicImage, options: &ImageOptions) -> PixelBuffer {
    let image = match options.color {
        ColorMode::Color => DynamicImage::ImageRgb8(image.into_rgb8()),
        ColorMode::Gray => DynamicImage::ImageLuma8(image.into_luma8()),
    };
    let image = match options.resize_target() {
        Some((height, width)) => image.resize_exact(width, height, FilterType::Triangle),
        None => image,
    };

    PixelBuffer::from_dynamic_image(image, options.color)
}

/// Decode image bytes into a pixel buffer, resizing when the options ask for it.
pub fn decode_bytes_to_pixel_buffer(
    bytes: &[u8],
    options: &ImageOptions,
) -> Result<PixelBuffer, CodecError> {
    let image = decode_dynamic_image(bytes)?;
    Ok(conform_image(image, options))
}

/// Encode a pixel buffer.
///
/// PNG and BMP reproduce the samples exactly. JPEG is lossy: decoded samples of smooth images
/// stay close to the input but are not exact.
pub fn encode_pixel_buffer_to_bytes(
    buffer: &PixelBuffer,
    encoding: ImageEncoding,
) -> Result<Vec<u8>, CodecError> {
    let image = buffer.to_dynamic_image()?;
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, encoding.format())
        .map_err(|err| CodecError::Encode(err.to_string()))?;

    Ok(bytes.into_inner())
}

/// Decode an encoded record in place at its native size.
///
/// See [decode_record_in_place_with].
pub fn decode_record_in_place(record: &mut Record, color: ColorMode) -> Result<bool, CodecError> {
    decode_record_in_place_with(record, &ImageOptions::native(color))
}

/// Decode an encoded record in place.
///
/// Returns `Ok(false)` without touching the record when it is already decoded, so calling it
/// repeatedly decodes at most once. On success the record holds raw channel-major pixels, its
/// shape is updated, the label is kept and `Ok(true)` is returned. On failure the record is left
/// encoded.
///
/// This is the only place an encoded record becomes decoded. It is not synchronized.
pub fn decode_record_in_place_with(
    record: &mut Record,
    options: &ImageOptions,
) -> Result<bool, CodecError> {
    let Payload::Encoded(bytes) = record.payload() else {
        return Ok(false);
    };

    let buffer = decode_bytes_to_pixel_buffer(bytes, options)?;
    pixel_buffer_to_record(&buffer, record);
    debug!(
        "Decoded record to {}x{}x{}",
        buffer.channels(),
        buffer.height(),
        buffer.width()
    );

    Ok(true)
}

/// Pixel buffer of a record, without modifying it.
///
/// Encoded records are decoded with `options`; raw records are returned as stored and the options
/// are ignored. The result is always packed: a buffer stored through [pixel_buffer_to_record]
/// comes back with the same pixels but without its row padding.
pub fn decode_record_to_pixel_buffer(
    record: &Record,
    options: &ImageOptions,
) -> Result<PixelBuffer, CodecError> {
    match record.payload() {
        Payload::Encoded(bytes) => decode_bytes_to_pixel_buffer(bytes, options),
        Payload::Raw(data) => {
            PixelBuffer::from_planar(record.channels(), record.height(), record.width(), data)
        }
    }
}

/// Copy a pixel buffer into a record as raw channel-major pixels.
///
/// Any previous payload is replaced; the label is kept. Row padding is dropped.
pub fn pixel_buffer_to_record(buffer: &PixelBuffer, record: &mut Record) {
    record.set_raw(
        buffer.channels(),
        buffer.height(),
        buffer.width(),
        buffer.to_planar(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> PixelBuffer {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128]);
            }
        }
        PixelBuffer::new(width, height, 3, data).unwrap()
    }

    fn max_diff(a: &[u8], b: &[u8]) -> u8 {
        a.iter()
            .zip(b)
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn png_round_trip_is_exact() {
        let buffer = gradient(6, 4);
        let bytes = encode_pixel_buffer_to_bytes(&buffer, ImageEncoding::Png).unwrap();
        let decoded =
            decode_bytes_to_pixel_buffer(&bytes, &ImageOptions::native(ColorMode::Color)).unwrap();

        assert_eq!(decoded, buffer);
    }

    #[test]
    fn jpeg_round_trip_keeps_shape() {
        let buffer = gradient(16, 16);
        let bytes = encode_pixel_buffer_to_bytes(&buffer, ImageEncoding::Jpeg).unwrap();
        let decoded =
            decode_bytes_to_pixel_buffer(&bytes, &ImageOptions::native(ColorMode::Color)).unwrap();

        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 16);
        assert_eq!(decoded.channels(), 3);
        assert!(max_diff(decoded.as_bytes(), buffer.as_bytes()) <= 32);
    }

    #[test]
    fn decode_resizes_and_converts() {
        let bytes = encode_pixel_buffer_to_bytes(&gradient(8, 6), ImageEncoding::Png).unwrap();
        let decoded =
            decode_bytes_to_pixel_buffer(&bytes, &ImageOptions::new(3, 5, ColorMode::Gray))
                .unwrap();

        assert_eq!(decoded.height(), 3);
        assert_eq!(decoded.width(), 5);
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.as_bytes().len(), 15);
    }

    #[test]
    fn resize_needs_both_dimensions() {
        assert_eq!(ImageOptions::new(10, 0, ColorMode::Color).resize_target(), None);
        assert_eq!(
            ImageOptions::new(10, 20, ColorMode::Color).resize_target(),
            Some((10, 20))
        );
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        let result = decode_bytes_to_pixel_buffer(b"not an image", &ImageOptions::default());
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn decode_in_place_is_idempotent() {
        let buffer = gradient(4, 3);
        let bytes = encode_pixel_buffer_to_bytes(&buffer, ImageEncoding::Png).unwrap();
        let mut record = Record::encoded(bytes).with_label(3);

        assert!(decode_record_in_place(&mut record, ColorMode::Color).unwrap());
        let first = record.clone();
        assert!(!record.is_encoded());
        assert_eq!(record.shape(), [3, 3, 4]);
        assert_eq!(record.label(), Some(3));
        assert_eq!(record.data().unwrap(), buffer.to_planar().as_slice());

        assert!(!decode_record_in_place(&mut record, ColorMode::Color).unwrap());
        assert_eq!(record, first);
    }

    #[test]
    fn failed_decode_leaves_record_encoded() {
        let mut record = Record::encoded(vec![0, 1, 2]);
        assert!(decode_record_in_place(&mut record, ColorMode::Gray).is_err());
        assert!(record.is_encoded());
        assert_eq!(record.encoded_data(), Some(&[0, 1, 2][..]));
    }

    #[test]
    fn raw_record_returns_buffer_unchanged() {
        let buffer = gradient(5, 2);
        let mut record = Record::default().with_label(1);
        pixel_buffer_to_record(&buffer, &mut record);
        assert_eq!(record.label(), Some(1));

        assert!(!decode_record_in_place(&mut record, ColorMode::Color).unwrap());
        let restored = decode_record_to_pixel_buffer(&record, &ImageOptions::default()).unwrap();
        assert_eq!(restored, buffer);
    }

    #[test]
    fn strided_buffer_comes_back_packed() {
        // 2x2 gray with 2 bytes of padding per row.
        let data = vec![1, 2, 0, 0, 3, 4, 0, 0];
        let buffer = PixelBuffer::with_stride(2, 2, 1, 4, data).unwrap();
        let mut record = Record::default();
        pixel_buffer_to_record(&buffer, &mut record);
        assert_eq!(record.data().unwrap(), &[1, 2, 3, 4]);

        let restored = decode_record_to_pixel_buffer(&record, &ImageOptions::default()).unwrap();
        assert_eq!(restored.stride(), 2);
        for y in 0..2 {
            assert_eq!(restored.row(y), buffer.row(y));
        }
        assert_ne!(restored, buffer);
    }

    #[test]
    fn decode_with_resize_updates_shape() {
        let bytes = encode_pixel_buffer_to_bytes(&gradient(8, 8), ImageEncoding::Bmp).unwrap();
        let mut record = Record::encoded(bytes);

        let options = ImageOptions::new(4, 2, ColorMode::Gray);
        assert!(decode_record_in_place_with(&mut record, &options).unwrap());
        assert_eq!(record.shape(), [1, 4, 2]);
        assert_eq!(record.data().unwrap().len(), 8);
    }

    #[test]
    fn color_mode_from_flag() {
        assert_eq!(ColorMode::from(true), ColorMode::Color);
        assert_eq!(ColorMode::from(false).channels(), 1);
    }

    #[test]
    fn encoding_from_extension() {
        assert_eq!(ImageEncoding::from_extension("JPG"), Some(ImageEncoding::Jpeg));
        assert_eq!(ImageEncoding::from_extension("png"), Some(ImageEncoding::Png));
        assert_eq!(ImageEncoding::from_extension("tiff"), None);
        assert!(ImageEncoding::Png.matches_path("a/b/c.PNG"));
        assert!(!ImageEncoding::Png.matches_path("a/b/c.jpg"));
        assert!(!ImageEncoding::Png.matches_path("no_extension"));
    }
}
