//! Curation specifications.
//!
//! A run is described by an ordered list of [`SpecLayer`]s, folded by
//! [`compose_specs`] into one [`CurationSpecification`]:
//!
//! | Field | Rule |
//! |-------|------|
//! | `input_path_pattern`, `output_path_components` | last defined wins |
//! | `modify_header` | `{...prior(r), ...next(r)}` |
//! | `errors` | `prior(r) ++ next(r)` |
//! | `excluded_filetypes` | concatenated, duplicates kept |
//! | `additional_data` | last defined wins |
//! | `host_props` | objects deep-merge, arrays and scalars replace |
//! | `deid` | chained merge, see [`DeidOption::merge`](crate::deid::DeidOption::merge) |

mod compose;
mod document;
mod layer;
mod model;

pub use compose::{compose_specs, merge_host_props};
pub use document::{AdditionalDataDocument, LookupDocument, SpecDocument, Template};
pub use layer::{Context, ContextFn, ContextLayer, PartialSpec, SpecLayer};
pub use model::{
    AdditionalData, CurationSpecification, ErrorsFn, HeaderEdits, HeaderFn, HostProps,
    LookupEntry, OutputPathFn, SpecSummary, ValueFn, SPEC_VERSION,
};
