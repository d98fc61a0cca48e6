//! Compose command - fold specification files and show the result.

use std::path::PathBuf;

use colored::Colorize;
use dicom_curate::compose_specs;

use super::load_layers;

pub fn run(specs: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let layers = load_layers(&specs)?;
    let spec = compose_specs(&layers)?;

    eprintln!(
        "{} {} layer(s)",
        "Composed".green().bold(),
        layers.len().to_string().white()
    );
    println!("{}", serde_json::to_string_pretty(&spec.summary())?);
    Ok(())
}
