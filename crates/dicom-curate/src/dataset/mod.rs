//! Dataset models.
//!
//! Two representations are used side by side:
//!
//! - the raw model ([`RawDataset`]): tag-keyed elements with a VR, which
//!   is what the codec reads and writes;
//! - the natural model ([`NaturalDataset`]): keyword-keyed values, which
//!   is what specifications and the resolver work with.

mod raw;
mod value;

pub use raw::{DicomFile, RawDataset, RawElement, RawValue, Tag, Vr, VrKind};
pub use value::{NaturalDataset, Value};
