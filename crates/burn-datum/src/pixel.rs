use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::codec::{CodecError, ColorMode};

/// Dense 8-bit image with interleaved channels.
///
/// Rows are `stride` bytes apart; the first `width * channels` bytes of each row are pixels and
/// the rest is padding. The buffer owns its storage and is copied, never aliased, into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    channels: usize,
    stride: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a tightly packed buffer.
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        Self::with_stride(width, height, channels, width * channels, data)
    }

    /// Create a buffer whose rows are `stride` bytes apart.
    pub fn with_stride(
        width: usize,
        height: usize,
        channels: usize,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        if channels == 0 {
            return Err(CodecError::UnsupportedChannels(channels));
        }
        if stride < width * channels || data.len() != stride * height {
            return Err(CodecError::Shape(format!(
                "{width}x{height}x{channels} with stride {stride} cannot hold {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            stride,
            data,
        })
    }

    /// Build a packed buffer from channel-major (planar) bytes.
    pub fn from_planar(
        channels: usize,
        height: usize,
        width: usize,
        planar: &[u8],
    ) -> Result<Self, CodecError> {
        if planar.len() != channels * height * width {
            return Err(CodecError::Shape(format!(
                "planar payload of {} bytes does not match {channels}x{height}x{width}",
                planar.len()
            )));
        }

        let mut data = vec![0u8; planar.len()];
        for c in 0..channels {
            for h in 0..height {
                for w in 0..width {
                    data[(h * width + w) * channels + c] = planar[(c * height + h) * width + w];
                }
            }
        }

        Self::new(width, height, channels, data)
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Channels per pixel.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Bytes between the start of two consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Backing storage, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel samples of row `y`, padding excluded.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width * self.channels]
    }

    /// Samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = y * self.stride + x * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Copy the samples into channel-major (planar) order.
    pub fn to_planar(&self) -> Vec<u8> {
        let (channels, height, width) = (self.channels, self.height, self.width);
        let mut planar = vec![0u8; channels * height * width];

        for h in 0..height {
            let row = self.row(h);
            for w in 0..width {
                for c in 0..channels {
                    planar[(c * height + h) * width + w] = row[w * channels + c];
                }
            }
        }

        planar
    }

    /// Rows without padding.
    fn packed(&self) -> Vec<u8> {
        if self.stride == self.width * self.channels {
            return self.data.clone();
        }

        (0..self.height).flat_map(|y| self.row(y).to_vec()).collect()
    }

    /// Convert a decoded image, forcing it to the requested color mode.
    pub(crate) fn from_dynamic_image(image: DynamicImage, color: ColorMode) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let data = match color {
            ColorMode::Color => image.into_rgb8().into_raw(),
            ColorMode::Gray => image.into_luma8().into_raw(),
        };

        Self {
            width,
            height,
            channels: color.channels(),
            stride: width * color.channels(),
            data,
        }
    }

    pub(crate) fn to_dynamic_image(&self) -> Result<DynamicImage, CodecError> {
        let (width, height) = (self.width as u32, self.height as u32);
        let data = self.packed();
        let invalid = || CodecError::Shape(format!("{width}x{height}x{}", self.channels));

        let image = match self.channels {
            1 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, data).ok_or_else(invalid)?,
            ),
            3 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, data).ok_or_else(invalid)?,
            ),
            4 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(width, height, data).ok_or_else(invalid)?,
            ),
            channels => return Err(CodecError::UnsupportedChannels(channels)),
        };

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_round_trip() {
        // 2x2 RGB, interleaved
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let buffer = PixelBuffer::new(2, 2, 3, data).unwrap();

        let planar = buffer.to_planar();
        assert_eq!(planar, vec![1, 4, 7, 10, 2, 5, 8, 11, 3, 6, 9, 12]);
        assert_eq!(PixelBuffer::from_planar(3, 2, 2, &planar).unwrap(), buffer);
    }

    #[test]
    fn stride_padding_is_skipped() {
        // 2x2 gray with one padding byte per row
        let buffer = PixelBuffer::with_stride(2, 2, 1, 3, vec![1, 2, 0, 3, 4, 0]).unwrap();
        assert_eq!(buffer.row(1), &[3, 4]);
        assert_eq!(buffer.pixel(1, 0), &[2]);
        assert_eq!(buffer.to_planar(), vec![1, 2, 3, 4]);

        let image = buffer.to_dynamic_image().unwrap();
        assert_eq!(image.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(PixelBuffer::new(2, 2, 3, vec![0; 11]).is_err());
        assert!(PixelBuffer::with_stride(2, 2, 3, 5, vec![0; 10]).is_err());
        assert!(matches!(
            PixelBuffer::new(1, 1, 0, vec![]),
            Err(CodecError::UnsupportedChannels(0))
        ));
        assert!(matches!(
            PixelBuffer::new(1, 1, 2, vec![0, 0]).unwrap().to_dynamic_image(),
            Err(CodecError::UnsupportedChannels(2))
        ));
    }
}
