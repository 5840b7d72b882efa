//! Read and write protobuf messages as text or binary files.
//!
//! Readers come in three flavors: `try_*` returns a typed error, the plain form returns `false`
//! and logs, and `*_or_die` panics. Writers panic on failure unless the `try_*` form is used.

use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use protobuf::{text_format, MessageFull};
use thiserror::Error;

use crate::record::RecordError;

/// Largest binary message accepted by the readers.
pub const BINARY_READ_LIMIT: u64 = i32::MAX as u64;

/// Error type for protobuf file I/O.
#[derive(Error, Debug)]
pub enum ProtoIoError {
    /// The file could not be read or written.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The content is not a valid message.
    #[error("could not parse `{path}`: {reason}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// The binary file exceeds [BINARY_READ_LIMIT].
    #[error("`{path}` is {size} bytes, above the {BINARY_READ_LIMIT} byte limit")]
    TooLarge {
        /// File being read.
        path: PathBuf,
        /// File size.
        size: u64,
    },

    /// The message could not be serialized.
    #[error("could not serialize message: {0}")]
    Serialize(String),

    /// The message is not a valid record.
    #[error(transparent)]
    Record(#[from] RecordError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProtoIoError + '_ {
    move |source| ProtoIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse a text-format message from `path`.
pub fn try_read_text<M: MessageFull, P: AsRef<Path>>(path: P) -> Result<M, ProtoIoError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(io_error(path))?;

    text_format::parse_from_str::<M>(&content).map_err(|err| ProtoIoError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Parse a binary message from `path`.
pub fn try_read_binary<M: MessageFull, P: AsRef<Path>>(path: P) -> Result<M, ProtoIoError> {
    let path = path.as_ref();
    let size = std::fs::metadata(path).map_err(io_error(path))?.len();
    if size > BINARY_READ_LIMIT {
        return Err(ProtoIoError::TooLarge {
            path: path.to_path_buf(),
            size,
        });
    }
    let bytes = std::fs::read(path).map_err(io_error(path))?;

    M::parse_from_bytes(&bytes).map_err(|err| ProtoIoError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn replace_or_warn<M>(message: &mut M, result: Result<M, ProtoIoError>) -> bool {
    match result {
        Ok(parsed) => {
            *message = parsed;
            true
        }
        Err(err) => {
            warn!("{err}");
            false
        }
    }
}

/// Parse a text-format message from `path` into `message`.
///
/// Returns `false` on a missing file or malformed content; `message` is then left unchanged.
pub fn read_text<M: MessageFull, P: AsRef<Path>>(path: P, message: &mut M) -> bool {
    replace_or_warn(message, try_read_text(path))
}

/// Parse a binary message from `path` into `message`.
///
/// Returns `false` on a missing file or malformed content; `message` is then left unchanged.
pub fn read_binary<M: MessageFull, P: AsRef<Path>>(path: P, message: &mut M) -> bool {
    replace_or_warn(message, try_read_binary(path))
}

/// Like [read_text], panicking on failure.
pub fn read_text_or_die<M: MessageFull, P: AsRef<Path>>(path: P, message: &mut M) {
    let path = path.as_ref();
    if !read_text(path, message) {
        error!("Failed to read text message from {}", path.display());
        panic!("Failed to read text message from {}", path.display());
    }
}

/// Like [read_binary], panicking on failure.
pub fn read_binary_or_die<M: MessageFull, P: AsRef<Path>>(path: P, message: &mut M) {
    let path = path.as_ref();
    if !read_binary(path, message) {
        error!("Failed to read binary message from {}", path.display());
        panic!("Failed to read binary message from {}", path.display());
    }
}

/// Write `message` to `path` in text format.
pub fn try_write_text<M: MessageFull, P: AsRef<Path>>(
    message: &M,
    path: P,
) -> Result<(), ProtoIoError> {
    let path = path.as_ref();
    std::fs::write(path, text_format::print_to_string_pretty(message)).map_err(io_error(path))?;
    debug!("Wrote text message to {}", path.display());

    Ok(())
}

/// Write `message` to `path` in binary format.
pub fn try_write_binary<M: MessageFull, P: AsRef<Path>>(
    message: &M,
    path: P,
) -> Result<(), ProtoIoError> {
    let path = path.as_ref();
    let bytes = message
        .write_to_bytes()
        .map_err(|err| ProtoIoError::Serialize(err.to_string()))?;
    std::fs::write(path, bytes).map_err(io_error(path))?;
    debug!("Wrote binary message to {}", path.display());

    Ok(())
}

/// Write `message` to `path` in text format, panicking on failure.
pub fn write_text<M: MessageFull, P: AsRef<Path>>(message: &M, path: P) {
    if let Err(err) = try_write_text(message, path) {
        error!("{err}");
        panic!("Failed to write text message: {err}");
    }
}

/// Write `message` to `path` in binary format, panicking on failure.
pub fn write_binary<M: MessageFull, P: AsRef<Path>>(message: &M, path: P) {
    if let Err(err) = try_write_binary(message, path) {
        error!("{err}");
        panic!("Failed to write binary message: {err}");
    }
}
