//! CLI command implementations.

pub mod compose;
pub mod curate;
pub mod inspect;

use std::path::PathBuf;

use dicom_curate::{PartialSpec, SpecDocument, SpecLayer};
use tracing::debug;

/// Load specification files as layers, in order.
pub fn load_layers(specs: &[PathBuf]) -> Result<Vec<SpecLayer>, Box<dyn std::error::Error>> {
    let mut layers = Vec::with_capacity(specs.len());
    for path in specs {
        if !path.exists() {
            return Err(format!("Specification not found: {}", path.display()).into());
        }
        let partial: PartialSpec = SpecDocument::from_file(path)?.into_partial()?;
        debug!(spec = %path.display(), "loaded specification layer");
        layers.push(partial.into());
    }
    Ok(layers)
}
