//! GRIB index client.
//!
//! NOAA publishes a `.idx` sidecar next to every GRIB2 file: one
//! colon-delimited record per message with its byte offset, short name,
//! level and step. The client fetches the sidecar, matches the caller's
//! selectors against it, issues ranged GETs for the matched messages and
//! decodes them into dense 2-D frames.
//!
//! Bit-unpacking of the GRIB2 payload is delegated to the `grib` crate.

pub mod client;
pub mod decode;
pub mod error;
pub mod index;

pub use client::{FetchPolicy, GribIndexClient, IndexedMessage, Selector};
pub use error::{GribIndexError, Result};
pub use index::{IndexRecord, MessageAttributes, StepType};
