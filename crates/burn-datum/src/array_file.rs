use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, error};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use thiserror::Error;

use crate::blob::{checked_num_elements, Element};

/// Element type of a dataset stored in an array file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetDtype {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
}

impl DatasetDtype {
    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
            Self::U8 => 1,
        }
    }

    /// Whether the dtype is a floating point type.
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    fn to_safetensors(self) -> Dtype {
        match self {
            Self::F32 => Dtype::F32,
            Self::F64 => Dtype::F64,
            Self::I32 => Dtype::I32,
            Self::I64 => Dtype::I64,
            Self::U8 => Dtype::U8,
        }
    }

    fn from_safetensors(dtype: Dtype) -> Option<Self> {
        match dtype {
            Dtype::F32 => Some(Self::F32),
            Dtype::F64 => Some(Self::F64),
            Dtype::I32 => Some(Self::I32),
            Dtype::I64 => Some(Self::I64),
            Dtype::U8 => Some(Self::U8),
            _ => None,
        }
    }
}

/// Error type for array file access.
#[derive(Error, Debug)]
pub enum ArrayFileError {
    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No dataset with that name.
    #[error("dataset `{0}` not found")]
    DatasetNotFound(String),

    /// A dataset with that name already exists.
    #[error("dataset `{0}` already exists")]
    DatasetExists(String),

    /// The file stores a dtype this crate does not read.
    #[error("unsupported dtype: `{0}`")]
    UnsupportedDtype(String),

    /// The element count of the shape overflows `usize`.
    #[error("shape {0:?} has too many elements")]
    ShapeOverflow(Vec<usize>),

    /// The dataset bytes do not match its shape and dtype.
    #[error("dataset holds {actual} bytes, shape and dtype need {expected}")]
    SizeMismatch {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// The file is not a valid array file.
    #[error("invalid array file: `{0}`")]
    Format(String),
}

/// One named N-dimensional array, read or written as a whole.
#[derive(new, Debug, Clone, PartialEq)]
pub struct ArrayDataset {
    /// Size of each axis.
    pub shape: Vec<usize>,
    /// Element type.
    pub dtype: DatasetDtype,
    /// Little-endian elements in row-major order.
    pub bytes: Vec<u8>,
}

impl ArrayDataset {
    /// Dataset holding the elements of a slice.
    pub fn from_elements<E: Element>(shape: &[usize], values: &[E]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * E::DTYPE.size());
        for value in values {
            value.write_le(&mut bytes);
        }

        Self::new(shape.to_vec(), E::DTYPE, bytes)
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements, `None` when the shape overflows `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        checked_num_elements(&self.shape)
    }

    /// Check that the byte length matches the shape and dtype.
    pub fn validate(&self) -> Result<(), ArrayFileError> {
        let expected = self
            .num_elements()
            .and_then(|count| count.checked_mul(self.dtype.size()))
            .ok_or_else(|| ArrayFileError::ShapeOverflow(self.shape.clone()))?;
        if expected != self.bytes.len() {
            return Err(ArrayFileError::SizeMismatch {
                expected,
                actual: self.bytes.len(),
            });
        }

        Ok(())
    }

    /// Elements converted to `E`.
    pub fn to_elements<E: Element>(&self) -> Result<Vec<E>, ArrayFileError> {
        self.validate()?;

        let chunks = self.bytes.chunks_exact(self.dtype.size());
        let values: Vec<E> = match self.dtype {
            DatasetDtype::F32 => chunks
                .map(|b| E::from_f64(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64))
                .collect(),
            DatasetDtype::F64 => chunks
                .map(|b| E::from_f64(f64::from_le_bytes(le_bytes_8(b))))
                .collect(),
            DatasetDtype::I32 => chunks
                .map(|b| E::from_f64(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64))
                .collect(),
            DatasetDtype::I64 => chunks
                .map(|b| E::from_f64(i64::from_le_bytes(le_bytes_8(b)) as f64))
                .collect(),
            DatasetDtype::U8 => chunks.map(|b| E::from_f64(b[0] as f64)).collect(),
        };

        Ok(values)
    }
}

fn le_bytes_8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

/// File holding named N-dimensional datasets.
///
/// Datasets are read and written whole. Writing a name that already exists is an error: there is
/// no in-place update. Handles are not meant to be shared between threads.
pub trait ArrayFile {
    /// Read the dataset called `name`.
    fn read_dataset(&self, name: &str) -> Result<ArrayDataset, ArrayFileError>;

    /// Add a new dataset called `name`.
    fn write_dataset(&mut self, name: &str, dataset: ArrayDataset) -> Result<(), ArrayFileError>;

    /// Whether a dataset called `name` exists.
    fn contains(&self, name: &str) -> bool;

    /// Names of all datasets, sorted.
    fn dataset_names(&self) -> Vec<String>;
}

/// Store mode for [SafetensorsArrayFile].
enum StoreMode {
    File(PathBuf),
    Memory,
}

/// [ArrayFile] backed by the safetensors format.
///
/// The whole file is parsed on open. New datasets are kept in memory until [flush](Self::flush);
/// a file-backed handle with unflushed datasets also flushes when dropped.
pub struct SafetensorsArrayFile {
    mode: StoreMode,
    datasets: BTreeMap<String, ArrayDataset>,
    dirty: bool,
}

impl SafetensorsArrayFile {
    /// Open an existing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArrayFileError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let datasets = parse(&bytes)?;
        debug!("Opened {} with {} datasets", path.display(), datasets.len());

        Ok(Self {
            mode: StoreMode::File(path.to_path_buf()),
            datasets,
            dirty: false,
        })
    }

    /// Start a new, empty file at `path`, replacing any existing one on flush.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self {
            mode: StoreMode::File(path.as_ref().to_path_buf()),
            datasets: BTreeMap::new(),
            // An empty file is still written on flush.
            dirty: true,
        }
    }

    /// Parse an in-memory file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArrayFileError> {
        Ok(Self {
            mode: StoreMode::Memory,
            datasets: parse(bytes)?,
            dirty: false,
        })
    }

    /// Empty in-memory file.
    pub fn in_memory() -> Self {
        Self {
            mode: StoreMode::Memory,
            datasets: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Serialize all datasets.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArrayFileError> {
        let views = self
            .datasets
            .iter()
            .map(|(name, dataset)| {
                TensorView::new(
                    dataset.dtype.to_safetensors(),
                    dataset.shape.clone(),
                    &dataset.bytes,
                )
                .map(|view| (name.clone(), view))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ArrayFileError::Format(format!("{err:?}")))?;

        safetensors::serialize(views, &None)
            .map_err(|err| ArrayFileError::Format(format!("{err:?}")))
    }

    /// Write pending datasets to disk. In-memory files have nothing to flush.
    pub fn flush(&mut self) -> Result<(), ArrayFileError> {
        if !self.dirty {
            return Ok(());
        }
        if let StoreMode::File(path) = &self.mode {
            std::fs::write(path, self.to_bytes()?)?;
            debug!("Flushed {} datasets to {}", self.datasets.len(), path.display());
        }
        self.dirty = false;

        Ok(())
    }
}

impl ArrayFile for SafetensorsArrayFile {
    fn read_dataset(&self, name: &str) -> Result<ArrayDataset, ArrayFileError> {
        self.datasets
            .get(name)
            .cloned()
            .ok_or_else(|| ArrayFileError::DatasetNotFound(name.to_string()))
    }

    fn write_dataset(&mut self, name: &str, dataset: ArrayDataset) -> Result<(), ArrayFileError> {
        if self.datasets.contains_key(name) {
            return Err(ArrayFileError::DatasetExists(name.to_string()));
        }
        dataset.validate()?;

        self.datasets.insert(name.to_string(), dataset);
        self.dirty = true;

        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    fn dataset_names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }
}

impl Drop for SafetensorsArrayFile {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!("Failed to flush array file on drop: {err}");
        }
    }
}

fn parse(bytes: &[u8]) -> Result<BTreeMap<String, ArrayDataset>, ArrayFileError> {
    let tensors =
        SafeTensors::deserialize(bytes).map_err(|err| ArrayFileError::Format(format!("{err:?}")))?;

    tensors
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            let dtype = DatasetDtype::from_safetensors(view.dtype())
                .ok_or_else(|| ArrayFileError::UnsupportedDtype(format!("{:?}", view.dtype())))?;
            let dataset = ArrayDataset::new(view.shape().to_vec(), dtype, view.data().to_vec());

            Ok((name, dataset))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_in_memory() {
        let mut file = SafetensorsArrayFile::in_memory();
        let dataset = ArrayDataset::from_elements(&[2, 2], &[1.0f32, 2.0, 3.0, 4.0]);

        file.write_dataset("data", dataset.clone()).unwrap();
        assert!(file.contains("data"));
        assert_eq!(file.read_dataset("data").unwrap(), dataset);
        assert_eq!(file.dataset_names(), vec!["data".to_string()]);
    }

    #[test]
    fn existing_dataset_is_not_overwritten() {
        let mut file = SafetensorsArrayFile::in_memory();
        let dataset = ArrayDataset::from_elements(&[1], &[1.0f64]);
        file.write_dataset("label", dataset.clone()).unwrap();

        let result = file.write_dataset("label", dataset);
        assert!(matches!(result, Err(ArrayFileError::DatasetExists(name)) if name == "label"));
    }

    #[test]
    fn missing_dataset_is_reported() {
        let file = SafetensorsArrayFile::in_memory();
        assert!(matches!(
            file.read_dataset("nope"),
            Err(ArrayFileError::DatasetNotFound(_))
        ));
    }

    #[test]
    fn inconsistent_dataset_is_rejected() {
        let mut file = SafetensorsArrayFile::in_memory();
        let dataset = ArrayDataset::new(vec![2, 2], DatasetDtype::F32, vec![0; 15]);
        assert!(matches!(
            file.write_dataset("data", dataset),
            Err(ArrayFileError::SizeMismatch {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let shape = vec![usize::MAX, usize::MAX];
        let dataset = ArrayDataset::new(shape.clone(), DatasetDtype::F64, vec![0; 8]);
        assert_eq!(dataset.num_elements(), None);

        let mut file = SafetensorsArrayFile::in_memory();
        assert!(matches!(
            file.write_dataset("data", dataset.clone()),
            Err(ArrayFileError::ShapeOverflow(s)) if s == shape
        ));
        assert!(matches!(
            dataset.to_elements::<f32>(),
            Err(ArrayFileError::ShapeOverflow(_))
        ));
    }

    #[test]
    fn bytes_round_trip_keeps_every_dtype() {
        let mut file = SafetensorsArrayFile::in_memory();
        file.write_dataset("f32", ArrayDataset::from_elements(&[3], &[0.5f32, 1.5, -2.0]))
            .unwrap();
        file.write_dataset("f64", ArrayDataset::from_elements(&[1, 2], &[0.25f64, 8.0]))
            .unwrap();
        let ints = [-3i32, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        file.write_dataset("i32", ArrayDataset::new(vec![2], DatasetDtype::I32, ints))
            .unwrap();
        file.write_dataset("u8", ArrayDataset::new(vec![2], DatasetDtype::U8, vec![4, 200]))
            .unwrap();

        let restored = SafetensorsArrayFile::from_bytes(&file.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.dataset_names(), file.dataset_names());
        for name in file.dataset_names() {
            assert_eq!(
                restored.read_dataset(&name).unwrap(),
                file.read_dataset(&name).unwrap()
            );
        }

        let ints = restored.read_dataset("i32").unwrap();
        assert_eq!(ints.to_elements::<f32>().unwrap(), vec![-3.0, 7.0]);
        let bytes = restored.read_dataset("u8").unwrap();
        assert_eq!(bytes.to_elements::<f64>().unwrap(), vec![4.0, 200.0]);
    }

    #[test]
    fn file_is_written_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.safetensors");

        let mut file = SafetensorsArrayFile::create(&path);
        file.write_dataset("x", ArrayDataset::from_elements(&[2], &[1.0f32, 2.0]))
            .unwrap();
        file.flush().unwrap();
        assert!(path.exists());

        let reopened = SafetensorsArrayFile::open(&path).unwrap();
        assert_eq!(
            reopened.read_dataset("x").unwrap().to_elements::<f32>().unwrap(),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn file_is_written_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.safetensors");

        {
            let mut file = SafetensorsArrayFile::create(&path);
            file.write_dataset("y", ArrayDataset::from_elements(&[1], &[3.0f64]))
                .unwrap();
        }

        assert!(SafetensorsArrayFile::open(&path).unwrap().contains("y"));
    }

    #[test]
    fn garbage_is_not_an_array_file() {
        assert!(matches!(
            SafetensorsArrayFile::from_bytes(b"garbage"),
            Err(ArrayFileError::Format(_))
        ));
    }
}
