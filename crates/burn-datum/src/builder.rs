use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{
    conform_image, decode_dynamic_image, encode_pixel_buffer_to_bytes, pixel_buffer_to_record,
    CodecError, ColorMode, ImageEncoding, ImageOptions,
};
use crate::config::Config;
use crate::pixel::PixelBuffer;
use crate::record::Record;

/// Error type for building records from files.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// The file could not be read.
    #[error("I/O error on `{path}`: {source}")]
    IOError {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be decoded or re-encoded.
    #[error("image error on `{path}`: {source}")]
    ImageError {
        /// File being converted.
        path: PathBuf,
        /// Underlying error.
        source: CodecError,
    },
}

/// How an image file becomes a [Record].
///
/// `height` and `width` of 0 keep the native size. When `encoding` is set the record keeps an
/// encoded payload instead of raw pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReadConfig {
    /// Label attached to the record.
    #[serde(default)]
    pub label: Option<i32>,
    /// Target height, 0 keeps the native height.
    #[serde(default)]
    pub height: u32,
    /// Target width, 0 keeps the native width.
    #[serde(default)]
    pub width: u32,
    /// Color mode of the decoded pixels.
    #[serde(default)]
    pub color: ColorMode,
    /// Store the image encoded with this container.
    #[serde(default)]
    pub encoding: Option<ImageEncoding>,
}

impl Config for ImageReadConfig {}

impl Default for ImageReadConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReadConfig {
    /// No label, native size, color, raw pixels.
    pub fn new() -> Self {
        Self {
            label: None,
            height: 0,
            width: 0,
            color: ColorMode::Color,
            encoding: None,
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: i32) -> Self {
        self.label = Some(label);
        self
    }

    /// Set the target size.
    pub fn with_size(mut self, height: u32, width: u32) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    /// Set the color mode.
    pub fn with_color(mut self, color: ColorMode) -> Self {
        self.color = color;
        self
    }

    /// Keep the payload encoded.
    pub fn with_encoding(mut self, encoding: ImageEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Decode options derived from this config.
    pub fn image_options(&self) -> ImageOptions {
        ImageOptions::new(self.height, self.width, self.color)
    }
}

fn read_file_bytes(path: &Path) -> Result<Vec<u8>, BuilderError> {
    std::fs::read(path).map_err(|source| BuilderError::IOError {
        path: path.to_path_buf(),
        source,
    })
}

fn image_error(path: &Path) -> impl FnOnce(CodecError) -> BuilderError + '_ {
    move |source| BuilderError::ImageError {
        path: path.to_path_buf(),
        source,
    }
}

/// Read and decode an image file into a pixel buffer.
pub fn read_image_to_pixel_buffer<P: AsRef<Path>>(
    path: P,
    options: &ImageOptions,
) -> Result<PixelBuffer, BuilderError> {
    let path = path.as_ref();
    let bytes = read_file_bytes(path)?;
    let image = decode_dynamic_image(&bytes).map_err(image_error(path))?;

    Ok(conform_image(image, options))
}

/// Build a record from an image file.
///
/// Without an encoding the record holds decoded channel-major pixels. With an encoding the file
/// bytes are stored as they are when no resize is requested, the extension names the encoding
/// and the image already has the requested channel count; otherwise the decoded image is
/// re-encoded. The file is not referenced after return.
pub fn build_from_image_file<P: AsRef<Path>>(
    path: P,
    config: &ImageReadConfig,
) -> Result<Record, BuilderError> {
    let path = path.as_ref();
    let options = config.image_options();
    let bytes = read_file_bytes(path)?;
    let image = decode_dynamic_image(&bytes).map_err(image_error(path))?;
    let native_channels = image.color().channel_count() as usize;
    let buffer = conform_image(image, &options);

    let mut record = match config.encoding {
        Some(encoding) => {
            let payload = if options.resize_target().is_none()
                && encoding.matches_path(path)
                && native_channels == options.color.channels()
            {
                bytes
            } else {
                encode_pixel_buffer_to_bytes(&buffer, encoding).map_err(image_error(path))?
            };

            Record::encoded_with_shape(
                buffer.channels(),
                buffer.height(),
                buffer.width(),
                payload,
            )
        }
        None => {
            let mut record = Record::default();
            pixel_buffer_to_record(&buffer, &mut record);
            record
        }
    };
    record.set_label(config.label);

    debug!(
        "Built record from {} ({}x{}x{}, encoded: {})",
        path.display(),
        record.channels(),
        record.height(),
        record.width(),
        record.is_encoded()
    );

    Ok(record)
}

/// Build a raw record at native size in color.
pub fn read_image_to_record<P: AsRef<Path>>(
    path: P,
    label: Option<i32>,
) -> Result<Record, BuilderError> {
    build_from_image_file(path, &config_with_label(label))
}

/// Build a raw record resized to `height` x `width` in color.
pub fn read_image_to_record_resized<P: AsRef<Path>>(
    path: P,
    label: Option<i32>,
    height: u32,
    width: u32,
) -> Result<Record, BuilderError> {
    build_from_image_file(path, &config_with_label(label).with_size(height, width))
}

/// Build a raw record at native size with the given color mode.
pub fn read_image_to_record_color<P: AsRef<Path>>(
    path: P,
    label: Option<i32>,
    color: ColorMode,
) -> Result<Record, BuilderError> {
    build_from_image_file(path, &config_with_label(label).with_color(color))
}

fn config_with_label(label: Option<i32>) -> ImageReadConfig {
    ImageReadConfig {
        label,
        ..ImageReadConfig::new()
    }
}

/// Build a record from the bytes of any file, without decoding.
///
/// The record is raw with an unknown shape; set it with [Record::with_shape].
pub fn build_from_file<P: AsRef<Path>>(
    path: P,
    label: Option<i32>,
) -> Result<Record, BuilderError> {
    let bytes = read_file_bytes(path.as_ref())?;
    let mut record = Record::from_bytes(bytes);
    record.set_label(label);

    Ok(record)
}
