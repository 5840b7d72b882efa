use core::fmt::Debug;

use thiserror::Error;

use crate::array_file::DatasetDtype;
use crate::record::Record;

/// Numeric element stored in a [Blob].
pub trait Element: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Dtype used when the element is written to an array file.
    const DTYPE: DatasetDtype;

    /// Convert from a double, rounding when the element is narrower.
    fn from_f64(value: f64) -> Self;

    /// Append the little-endian bytes of the element.
    fn write_le(self, out: &mut Vec<u8>);
}

impl Element for f32 {
    const DTYPE: DatasetDtype = DatasetDtype::F32;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Element for f64 {
    const DTYPE: DatasetDtype = DatasetDtype::F64;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Number of elements of `shape`, `None` when it overflows `usize`.
pub(crate) fn checked_num_elements(shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |count, &size| count.checked_mul(size))
}

/// Error type for [Blob] construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// The data length disagrees with the shape.
    #[error("shape {shape:?} needs {expected} elements, got {actual}")]
    ShapeMismatch {
        /// Requested shape.
        shape: Vec<usize>,
        /// Elements required by the shape.
        expected: usize,
        /// Elements provided.
        actual: usize,
    },

    /// The element count of the shape overflows `usize`.
    #[error("shape {0:?} has too many elements")]
    ShapeOverflow(Vec<usize>),

    /// The record is still encoded.
    #[error("record is encoded, decode it before converting to a blob")]
    EncodedRecord,
}

/// N-dimensional array: a shape and its elements in row-major order.
///
/// Only the shape and storage are handled here; computation happens downstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blob<E: Element> {
    shape: Vec<usize>,
    data: Vec<E>,
}

impl<E: Element> Blob<E> {
    /// Zero-filled blob with the given shape.
    pub fn new(shape: &[usize]) -> Self {
        let mut blob = Self {
            shape: Vec::new(),
            data: Vec::new(),
        };
        blob.reshape(shape);
        blob
    }

    /// Blob with the given shape and elements.
    pub fn from_data(shape: &[usize], data: Vec<E>) -> Result<Self, BlobError> {
        let expected = checked_num_elements(shape)
            .ok_or_else(|| BlobError::ShapeOverflow(shape.to_vec()))?;
        if expected != data.len() {
            return Err(BlobError::ShapeMismatch {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Blob of shape `[channels, height, width]` from a decoded record.
    pub fn from_record(record: &Record) -> Result<Self, BlobError> {
        let data = record.data().ok_or(BlobError::EncodedRecord)?;
        let values = data.iter().map(|&v| E::from_f64(v as f64)).collect();

        Self::from_data(&record.shape(), values)
    }

    /// Change the shape. Storage is resized, new elements are zero.
    ///
    /// # Panics
    ///
    /// If the element count of `shape` overflows `usize`.
    pub fn reshape(&mut self, shape: &[usize]) {
        let Some(count) = checked_num_elements(shape) else {
            panic!("Shape {shape:?} has too many elements");
        };
        self.shape = shape.to_vec();
        self.data.resize(count, E::default());
    }

    /// Shape of the blob.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of axes.
    pub fn num_axes(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[E] {
        &self.data
    }

    /// Mutable elements in row-major order.
    pub fn data_mut(&mut self) -> &mut [E] {
        &mut self.data
    }

    /// Size of axis `index` in the legacy four-axis view; missing trailing axes are 1.
    pub fn legacy_shape(&self, index: usize) -> usize {
        self.shape.get(index).copied().unwrap_or(1)
    }

    /// Legacy batch axis.
    pub fn num(&self) -> usize {
        self.legacy_shape(0)
    }

    /// Legacy channel axis.
    pub fn channels(&self) -> usize {
        self.legacy_shape(1)
    }

    /// Legacy height axis.
    pub fn height(&self) -> usize {
        self.legacy_shape(2)
    }

    /// Legacy width axis.
    pub fn width(&self) -> usize {
        self.legacy_shape(3)
    }
}
