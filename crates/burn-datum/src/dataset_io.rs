use log::{debug, error, warn};
use thiserror::Error;

use crate::array_file::{ArrayDataset, ArrayFile, ArrayFileError};
use crate::blob::{Blob, Element};

/// Maximum number of axes of a dataset loaded into or saved from a [Blob].
pub const MAX_AXES: usize = 4;

/// Error type for dataset loading and saving.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The requested rank window is empty or exceeds [MAX_AXES].
    #[error("invalid rank window [{min_dims}, {max_dims}], at most {MAX_AXES} axes are supported")]
    InvalidRankWindow {
        /// Smallest accepted rank.
        min_dims: usize,
        /// Largest accepted rank.
        max_dims: usize,
    },

    /// The dataset rank is outside the accepted window.
    #[error("dataset `{name}` has rank {rank}, expected between {min_dims} and {max_dims}")]
    RankOutOfRange {
        /// Dataset name.
        name: String,
        /// Dataset rank.
        rank: usize,
        /// Smallest accepted rank.
        min_dims: usize,
        /// Largest accepted rank.
        max_dims: usize,
    },

    /// The blob has more axes than an array dataset may hold.
    #[error("blob has {0} axes, at most {MAX_AXES} are supported")]
    TooManyAxes(usize),

    /// The array file failed.
    #[error(transparent)]
    ArrayFile(#[from] ArrayFileError),
}

/// Load the dataset `name` into `blob`.
///
/// The dataset rank must lie in `min_dims..=max_dims`, and `max_dims` may not exceed
/// [MAX_AXES]. On success the blob takes the dataset's exact shape and contents. Integer datasets
/// are converted to the blob's element type.
pub fn try_load_dataset<E: Element, F: ArrayFile + ?Sized>(
    file: &F,
    name: &str,
    min_dims: usize,
    max_dims: usize,
    blob: &mut Blob<E>,
) -> Result<(), DatasetError> {
    if min_dims > max_dims || max_dims > MAX_AXES {
        return Err(DatasetError::InvalidRankWindow { min_dims, max_dims });
    }

    let dataset = file.read_dataset(name)?;
    let rank = dataset.rank();
    if rank < min_dims || rank > max_dims {
        return Err(DatasetError::RankOutOfRange {
            name: name.to_string(),
            rank,
            min_dims,
            max_dims,
        });
    }

    if !dataset.dtype.is_float() {
        warn!(
            "Dataset `{name}` stores {:?} values, converting them to {:?}",
            dataset.dtype,
            E::DTYPE
        );
    }
    let values = dataset.to_elements::<E>()?;

    blob.reshape(&dataset.shape);
    blob.data_mut().copy_from_slice(&values);
    debug!("Loaded dataset `{name}` with shape {:?}", dataset.shape);

    Ok(())
}

/// Load the dataset `name` into `blob`, panicking on failure.
///
/// See [try_load_dataset]. A missing dataset or a rank outside the window means the input data
/// is unusable, so the error is logged and the process panics.
pub fn load_dataset<E: Element, F: ArrayFile + ?Sized>(
    file: &F,
    name: &str,
    min_dims: usize,
    max_dims: usize,
    blob: &mut Blob<E>,
) {
    if let Err(err) = try_load_dataset(file, name, min_dims, max_dims, blob) {
        error!("Failed to load dataset `{name}`: {err}");
        panic!("Failed to load dataset `{name}`: {err}");
    }
}

/// Save `blob` as a new dataset `name`.
///
/// Fails if the blob has more than [MAX_AXES] axes or the name is already taken.
pub fn try_save_dataset<E: Element, F: ArrayFile + ?Sized>(
    file: &mut F,
    name: &str,
    blob: &Blob<E>,
) -> Result<(), DatasetError> {
    if blob.num_axes() > MAX_AXES {
        return Err(DatasetError::TooManyAxes(blob.num_axes()));
    }

    file.write_dataset(name, ArrayDataset::from_elements(blob.shape(), blob.data()))?;
    debug!("Saved dataset `{name}` with shape {:?}", blob.shape());

    Ok(())
}

/// Save `blob` as a new dataset `name`, panicking on failure.
pub fn save_dataset<E: Element, F: ArrayFile + ?Sized>(file: &mut F, name: &str, blob: &Blob<E>) {
    if let Err(err) = try_save_dataset(file, name, blob) {
        error!("Failed to save dataset `{name}`: {err}");
        panic!("Failed to save dataset `{name}`: {err}");
    }
}
