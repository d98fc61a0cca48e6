//! Part 10 codec and the natural/raw conversions.
//!
//! The pipeline only needs two things from a codec: turn file bytes into a
//! [`DicomFile`] and turn a [`DicomFile`] back into bytes. [`Part10Codec`]
//! is the built-in implementation; tests and embedders can plug their own
//! through [`DicomCodec`].

pub mod dictionary;
mod natural;
mod part10;

use crate::dataset::DicomFile;
use crate::error::Result;

pub use natural::{denaturalize, naturalize, value_to_element};
pub use part10::{
    Part10Codec, DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN, EXPLICIT_VR_BIG_ENDIAN,
    EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN, MAGIC, MIN_PART10_SIZE, PREAMBLE_LEN,
};

/// Reads and writes DICOM Part 10 files.
pub trait DicomCodec: Send + Sync {
    /// Parse file bytes.
    fn decode(&self, bytes: &[u8]) -> Result<DicomFile>;

    /// Serialize a file, including preamble and meta group.
    fn encode(&self, file: &DicomFile) -> Result<Vec<u8>>;
}
