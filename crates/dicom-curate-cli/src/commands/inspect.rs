//! Inspect command - print the attributes of one DICOM file.

use std::path::PathBuf;

use colored::Colorize;
use dicom_curate::codec::naturalize;
use dicom_curate::{DicomCodec, Part10Codec, Value};

pub fn run(file: PathBuf, list: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let bytes = std::fs::read(&file)?;
    let dicom = Part10Codec::new().decode(&bytes)?;
    let natural = naturalize(&dicom.dict);

    if !list {
        println!("{}", serde_json::to_string_pretty(&natural)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "File".cyan().bold(),
        file.display().to_string().white()
    );
    if let Some(syntax) = dicom.transfer_syntax() {
        println!("Transfer syntax: {}", syntax);
    }
    println!();

    for (key, value) in &natural {
        match value {
            Value::Raw(element) => println!(
                "  {} {}",
                format!("{:40}", key).yellow(),
                format!("<{}>", element.vr).dimmed()
            ),
            Value::Sequence(items) => {
                println!("  {:40} {}", key, format!("[{} item(s)]", items.len()).blue())
            }
            other => println!("  {:40} {}", key, other),
        }
    }

    println!();
    println!("{} attributes", natural.len().to_string().white().bold());
    Ok(())
}
