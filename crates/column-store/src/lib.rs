//! Persistent chunked column store for forecast time series.
//!
//! Two on-disk artifact families:
//!
//! - **Space files** (`<name>_<hour>[_<member>].fpg`): per forecast hour
//!   staging frames written by the download scheduler, one compressed 2-D
//!   frame shaped `(1, nx·ny)` with per-location-chunk random access.
//! - **Om files** (`<name>_<chunk>.om`): the time-oriented store, one file
//!   per time chunk holding `(locations, time)` with per-location-chunk
//!   compressed blocks. Filled by the transposer.
//!
//! Values are quantised by a per-variable scale factor and compressed per
//! chunk, so a single location chunk can be read without touching the rest
//! of the file.

pub mod codec;
pub mod elevation;
pub mod error;
pub mod space;
pub mod store;

pub use error::{Result, StoreError};
pub use space::{space_file_name, FpgReader};
pub use store::{OmStore, StoreLayout};
