#![warn(missing_docs)]

//! # Burn Datum
//!
//! `burn-datum` turns heterogeneous on-disk sources into tensors and back:
//!
//! - image files become [Record]s, either decoded into raw channel-major pixels or kept as an
//!   encoded payload that is decoded lazily with [decode_record_in_place];
//! - records and any other protobuf [Message](protobuf::Message) are read and written in text or
//!   binary form with the [proto_io] helpers;
//! - named N-dimensional datasets inside an [ArrayFile] are loaded into and saved from a [Blob]
//!   with [load_dataset] and [save_dataset].
//!
//! Every fallible operation has a recoverable form returning a `Result` (or a `bool` for the
//! protobuf readers) and, where the failure means the environment is broken, a fatal form that
//! logs the diagnostic and panics.
//!
//! ```rust,no_run
//! use burn_datum::{ImageReadConfig, build_from_image_file, decode_record_in_place, ColorMode};
//!
//! let config = ImageReadConfig::new().with_label(7).with_size(32, 32);
//! let mut record = build_from_image_file("cat.png", &config).unwrap();
//!
//! // Already decoded, nothing to do.
//! assert!(!decode_record_in_place(&mut record, ColorMode::Color).unwrap());
//! assert_eq!(record.data().unwrap().len(), 3 * 32 * 32);
//! ```

#[macro_use]
extern crate derive_new;

mod array_file;
mod blob;
mod builder;
mod codec;
mod config;
mod dataset_io;
mod pixel;
mod record;

/// Text and binary protobuf file helpers.
pub mod proto_io;

/// Generated protobuf messages.
pub mod protos;

/// Unique temporary paths.
pub mod temp;

pub use array_file::*;
pub use blob::*;
pub use builder::*;
pub use codec::*;
pub use config::*;
pub use dataset_io::*;
pub use pixel::*;
pub use record::*;

pub use protos::datum::Datum;
