//! Curate command - scan a directory and curate every DICOM file in it.

use std::io::Write;
use std::path::PathBuf;

use colored::Colorize;
use dicom_curate::transport::Headers;
use dicom_curate::{
    curate_many, FileInfoIndex, HashMethod, InputSource, OrganizeOptions, OutputTarget, PartialSpec,
    ProgressEvent,
};
use tokio::sync::watch;
use tracing::{info, warn};

use super::load_layers;

pub struct CurateArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub specs: Vec<PathBuf>,
    pub table: Option<PathBuf>,
    pub date_offset: Option<String>,
    pub cache: Option<PathBuf>,
    pub write_cache: bool,
    pub output_mappings: Option<PathBuf>,
    pub hash: HashMethod,
    pub workers: Option<usize>,
    pub dry_run: bool,
    pub upload_url: Option<String>,
    pub headers: Vec<String>,
}

fn parse_headers(raw: &[String]) -> Result<Headers, Box<dyn std::error::Error>> {
    let mut headers = Headers::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| format!("Header must be NAME:VALUE, got '{}'", entry))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

pub async fn run(args: CurateArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.is_dir() {
        return Err(format!("Input directory not found: {}", args.input.display()).into());
    }

    let output = match (&args.output, &args.upload_url, args.dry_run) {
        (Some(dir), _, _) => OutputTarget::Directory(dir.clone()),
        (None, Some(url), _) => OutputTarget::Http {
            url: url.clone(),
            headers: parse_headers(&args.headers)?.into(),
        },
        (None, None, true) => OutputTarget::None,
        (None, None, false) => {
            return Err("Specify an OUTPUT directory, --upload-url, or --dry-run".into());
        }
    };

    let mut layers = load_layers(&args.specs)?;
    if layers.is_empty() {
        layers.push(PartialSpec::new().into());
    }

    let mut options = OrganizeOptions::new(InputSource::Directory(args.input.clone()))
        .with_output(output)
        .with_spec_layers(layers)
        .with_hash_method(args.hash)
        .with_skip_write(args.dry_run)
        .with_skip_collecting_mappings(args.output_mappings.is_none() && !args.write_cache);

    if let Some(table) = &args.table {
        let text = std::fs::read_to_string(table)
            .map_err(|e| format!("Could not read table {}: {}", table.display(), e))?;
        options = options.with_table(text);
    }
    if let Some(offset) = &args.date_offset {
        options = options.with_date_offset(offset.clone());
    }
    if let Some(workers) = args.workers {
        options = options.with_worker_count(workers);
    }

    let mut index = match &args.cache {
        Some(path) if path.exists() => FileInfoIndex::from_file(path)?,
        _ => FileInfoIndex::new(),
    };
    if !index.is_empty() {
        info!(entries = index.len(), "using prior-run cache");
        options = options.with_file_info_index(index.clone());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        warn!("interrupt received; finishing files already in progress");
        let _ = stop_tx.send(true);
    })?;
    options = options.with_stop(stop_rx);

    println!(
        "{} {}",
        "Curating".cyan().bold(),
        args.input.display().to_string().white()
    );

    let mut mapped = 0usize;
    let mut unchanged = 0usize;
    let mut failed = 0usize;
    let summary = curate_many(options, |event| match event {
        ProgressEvent::Progress {
            map_results,
            processed_files,
            total_files,
        } => {
            if map_results.has_errors() {
                failed += 1;
                if verbose {
                    for error in &map_results.errors {
                        eprintln!("\n  {} {}", "error:".red(), error);
                    }
                }
            } else if map_results.mapping_required == Some(false) {
                unchanged += 1;
            } else {
                mapped += 1;
            }
            print!("\r  {} / {} files", processed_files, total_files);
            let _ = std::io::stdout().flush();
        }
        ProgressEvent::Done(_) => println!(),
    })
    .await?;

    println!(
        "Processed {} files ({} curated, {} unchanged, {} failed)",
        summary.processed_files.to_string().white().bold(),
        mapped.to_string().green(),
        unchanged.to_string().blue(),
        failed.to_string().red()
    );

    if let Some(path) = &args.output_mappings {
        std::fs::write(path, serde_json::to_string_pretty(&summary.map_results)?)?;
        println!(
            "{} {}",
            "Results written to".green().bold(),
            path.display().to_string().white()
        );
    }

    if let (true, Some(path)) = (args.write_cache && !args.dry_run, &args.cache) {
        index.update_from_results(&summary.map_results);
        std::fs::write(path, index.to_json()?)?;
        println!(
            "{} {} ({} entries)",
            "Cache updated".green().bold(),
            path.display().to_string().white(),
            index.len()
        );
    }

    if failed > 0 {
        println!(
            "Run with {} to see per-file errors",
            "--verbose".cyan().bold()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&["Authorization: Bearer x".to_string()]).unwrap();
        assert_eq!(headers["Authorization"], "Bearer x");
        assert!(parse_headers(&["no-colon".to_string()]).is_err());
    }
}
