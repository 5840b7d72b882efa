use std::path::Path;

use thiserror::Error;

use crate::proto_io::{self, ProtoIoError};
use crate::protos::datum::Datum;

/// Label value used by serialized records to say "no label".
pub const NO_LABEL: i32 = -1;

/// Pixel payload of a [Record].
///
/// A record holds exactly one representation at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw pixel bytes in channel-major order: `(c * height + h) * width + w`.
    Raw(Vec<u8>),
    /// Encoded image bytes (PNG, JPEG, ...) waiting to be decoded.
    Encoded(Vec<u8>),
}

/// Error type for [Record] construction and conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The raw payload length disagrees with the declared shape.
    #[error(
        "raw payload holds {actual} bytes but shape {channels}x{height}x{width} needs {expected}"
    )]
    ShapeMismatch {
        /// Declared channels.
        channels: usize,
        /// Declared height.
        height: usize,
        /// Declared width.
        width: usize,
        /// Bytes required by the shape.
        expected: usize,
        /// Bytes present in the payload.
        actual: usize,
    },

    /// A serialized datum carries a negative dimension.
    #[error("negative dimension in serialized datum: `{0}`")]
    NegativeDimension(i32),

    /// The byte count of the shape does not fit in `usize`.
    #[error("shape {channels}x{height}x{width} overflows the addressable size")]
    ShapeOverflow {
        /// Declared channels.
        channels: usize,
        /// Declared height.
        height: usize,
        /// Declared width.
        width: usize,
    },

    /// A dimension is too large for a serialized datum.
    #[error("dimension `{0}` does not fit in a serialized datum")]
    DimensionTooLarge(usize),
}

/// On-disk representation used by [Record::save] and [Record::load].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Protobuf text format, human diffable.
    Text,
    /// Protobuf binary format.
    Binary,
}

/// One labeled sample: a shape, a pixel payload and an optional label.
///
/// An encoded record may report a zero shape until it is decoded. Decoding is done in place by
/// [decode_record_in_place](crate::decode_record_in_place), which is not synchronized: callers
/// sharing a record between threads must synchronize decode calls themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    channels: usize,
    height: usize,
    width: usize,
    payload: Payload,
    label: Option<i32>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            channels: 0,
            height: 0,
            width: 0,
            payload: Payload::Raw(Vec::new()),
            label: None,
        }
    }
}

impl Record {
    /// Create a decoded record from channel-major pixel bytes.
    pub fn raw(
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<u8>,
    ) -> Result<Self, RecordError> {
        check_raw_len(channels, height, width, data.len())?;

        Ok(Self {
            channels,
            height,
            width,
            payload: Payload::Raw(data),
            label: None,
        })
    }

    /// Create a record holding arbitrary bytes with no declared shape.
    ///
    /// Use [with_shape](Self::with_shape) once the layout is known.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            payload: Payload::Raw(data),
            ..Self::default()
        }
    }

    /// Create a record holding an encoded image of unknown shape.
    pub fn encoded(data: Vec<u8>) -> Self {
        Self {
            payload: Payload::Encoded(data),
            ..Self::default()
        }
    }

    /// Create a record holding an encoded image whose decoded shape is already known.
    pub fn encoded_with_shape(channels: usize, height: usize, width: usize, data: Vec<u8>) -> Self {
        Self {
            channels,
            height,
            width,
            payload: Payload::Encoded(data),
            label: None,
        }
    }

    /// Attach a label.
    pub fn with_label(mut self, label: i32) -> Self {
        self.set_label(Some(label));
        self
    }

    /// Declare the shape of the record.
    ///
    /// For a raw record the payload length must match `channels * height * width`.
    pub fn with_shape(
        mut self,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self, RecordError> {
        if let Payload::Raw(data) = &self.payload {
            check_raw_len(channels, height, width, data.len())?;
        }
        self.channels = channels;
        self.height = height;
        self.width = width;

        Ok(self)
    }

    /// Replace the label. The legacy [NO_LABEL] value is stored as `None`.
    pub fn set_label(&mut self, label: Option<i32>) {
        self.label = label.filter(|label| *label != NO_LABEL);
    }

    /// Number of channels, zero when unknown.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Height in pixels, zero when unknown.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width in pixels, zero when unknown.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Shape as `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Label, if any.
    pub fn label(&self) -> Option<i32> {
        self.label
    }

    /// Current payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Whether the payload is still encoded.
    pub fn is_encoded(&self) -> bool {
        matches!(self.payload, Payload::Encoded(_))
    }

    /// Raw pixel bytes, `None` while the record is encoded.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Raw(data) => Some(data),
            Payload::Encoded(_) => None,
        }
    }

    /// Encoded image bytes, `None` once the record is decoded.
    pub fn encoded_data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Encoded(data) => Some(data),
            Payload::Raw(_) => None,
        }
    }

    /// Overwrite shape and payload with decoded pixels.
    ///
    /// Callers guarantee `data.len() == channels * height * width`.
    pub(crate) fn set_raw(&mut self, channels: usize, height: usize, width: usize, data: Vec<u8>) {
        debug_assert_eq!(data.len(), channels * height * width);
        self.channels = channels;
        self.height = height;
        self.width = width;
        self.payload = Payload::Raw(data);
    }

    /// Write the record as a [Datum] message.
    pub fn save<P: AsRef<Path>>(&self, path: P, format: RecordFormat) -> Result<(), ProtoIoError> {
        let datum = Datum::try_from(self)?;
        match format {
            RecordFormat::Text => proto_io::try_write_text(&datum, path),
            RecordFormat::Binary => proto_io::try_write_binary(&datum, path),
        }
    }

    /// Read a record written as a [Datum] message.
    pub fn load<P: AsRef<Path>>(path: P, format: RecordFormat) -> Result<Self, ProtoIoError> {
        let datum: Datum = match format {
            RecordFormat::Text => proto_io::try_read_text(path)?,
            RecordFormat::Binary => proto_io::try_read_binary(path)?,
        };

        Ok(Self::try_from(datum)?)
    }
}

fn check_raw_len(
    channels: usize,
    height: usize,
    width: usize,
    actual: usize,
) -> Result<(), RecordError> {
    let expected = channels
        .checked_mul(height)
        .and_then(|size| size.checked_mul(width))
        .ok_or(RecordError::ShapeOverflow {
            channels,
            height,
            width,
        })?;

    // A fully unknown shape is allowed for opaque byte payloads.
    if expected == actual || (channels == 0 && height == 0 && width == 0) {
        Ok(())
    } else {
        Err(RecordError::ShapeMismatch {
            channels,
            height,
            width,
            expected,
            actual,
        })
    }
}

impl TryFrom<&Record> for Datum {
    type Error = RecordError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let dim = |value: usize| {
            i32::try_from(value).map_err(|_| RecordError::DimensionTooLarge(value))
        };

        let mut datum = Datum::new();
        datum.set_channels(dim(record.channels)?);
        datum.set_height(dim(record.height)?);
        datum.set_width(dim(record.width)?);

        match &record.payload {
            Payload::Raw(data) => {
                datum.set_data(data.clone());
                datum.set_encoded(false);
            }
            Payload::Encoded(data) => {
                datum.set_data(data.clone());
                datum.set_encoded(true);
            }
        }

        if let Some(label) = record.label {
            datum.set_label(label);
        }

        Ok(datum)
    }
}

impl TryFrom<Datum> for Record {
    type Error = RecordError;

    fn try_from(mut datum: Datum) -> Result<Self, Self::Error> {
        let dim = |value: i32| {
            usize::try_from(value).map_err(|_| RecordError::NegativeDimension(value))
        };
        let (channels, height, width) = (
            dim(datum.channels())?,
            dim(datum.height())?,
            dim(datum.width())?,
        );
        let label = datum.label.filter(|label| *label != NO_LABEL);
        let data = datum.take_data();

        let record = if datum.encoded() {
            Self {
                channels,
                height,
                width,
                payload: Payload::Encoded(data),
                label,
            }
        } else {
            check_raw_len(channels, height, width, data.len())?;
            Self {
                channels,
                height,
                width,
                payload: Payload::Raw(data),
                label,
            }
        };

        Ok(record)
    }
}
