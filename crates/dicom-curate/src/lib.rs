//! dicom-curate: reorganize and de-identify large DICOM collections.
//!
//! A run is driven by a curation specification: header edits, an output
//! path layout and a PS3.15 de-identification profile. Files are scanned
//! from a directory, a directory handle, an object store, URLs or memory,
//! curated by a pool of workers and written to the chosen destination.
//!
//! # Core Principles
//!
//! - **Non-destructive**: Sources are only read; curated copies are written
//! - **Incremental**: Files unchanged since a prior run are skipped
//! - **One result per file**: Failures are recorded, never fatal to the run
//!
//! # Example
//!
//! ```no_run
//! use dicom_curate::{curate_many, InputSource, OrganizeOptions, OutputTarget, PartialSpec};
//!
//! # async fn run() -> dicom_curate::Result<()> {
//! let options = OrganizeOptions::new(InputSource::Directory("incoming".into()))
//!     .with_output(OutputTarget::Directory("curated".into()))
//!     .with_spec_layer(PartialSpec::new().with_input_path_pattern("patient/study/series/file"));
//!
//! let summary = curate_many(options, |_| {}).await?;
//! println!("Curated {} files", summary.processed_files);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod curate;
pub mod dataset;
pub mod deid;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod lookup;
pub mod mapping;
pub mod resolve;
pub mod scan;
pub mod spec;
pub mod transport;

pub use codec::{DicomCodec, Part10Codec};
pub use curate::{
    curate_one, CurateOptions, Destination, FileDescriptor, FileInfoIndex, FileSource, MapResults,
};
pub use dataset::{DicomFile, NaturalDataset, Tag, Value};
pub use deid::{BasicProfile, DateOffset, DeidPolicy, Ps315Options};
pub use dispatch::{
    curate_many, InputFile, InputSource, OrganizeOptions, OutputTarget, ProgressEvent, RunSummary,
};
pub use error::{CurateError, Result};
pub use hash::HashMethod;
pub use mapping::{curate_dataset, MappingOptions};
pub use resolve::Resolver;
pub use spec::{compose_specs, CurationSpecification, PartialSpec, SpecDocument, SpecLayer};
