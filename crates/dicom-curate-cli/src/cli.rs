//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dicom_curate::HashMethod;

/// dicom-curate: reorganize and de-identify DICOM collections
#[derive(Parser)]
#[command(name = "dicom-curate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Curate every file below a directory
    Curate {
        /// Directory to scan
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory for curated files (omit with --upload-url or --dry-run)
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Specification file; repeat to layer several, later ones win
        #[arg(short, long = "spec", value_name = "SPEC")]
        specs: Vec<PathBuf>,

        /// CSV table for auxiliary lookups
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// ISO-8601 duration for shifting dates (e.g. "-P30D" or "P1Y2M")
        #[arg(long, allow_hyphen_values = true)]
        date_offset: Option<String>,

        /// Prior-run cache; unchanged files are skipped
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Update the cache file after the run
        #[arg(long, requires = "cache")]
        write_cache: bool,

        /// Write per-file results as JSON
        #[arg(long)]
        output_mappings: Option<PathBuf>,

        /// Content hash used for change detection
        #[arg(long, default_value = "crc64")]
        hash: HashMethod,

        /// Number of mapping workers (default: available cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Map only; write nothing
        #[arg(long)]
        dry_run: bool,

        /// Upload curated files with HTTP PUT below this URL
        #[arg(long, conflicts_with = "output")]
        upload_url: Option<String>,

        /// Extra upload header as NAME:VALUE; repeatable
        #[arg(long = "header", value_name = "NAME:VALUE", requires = "upload_url")]
        headers: Vec<String>,
    },

    /// Print the attributes of one DICOM file
    Inspect {
        /// Path to the DICOM file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print a colored attribute listing instead of JSON
        #[arg(long)]
        list: bool,
    },

    /// Compose specification files and print the effective settings
    Compose {
        /// Specification file; repeat to layer several
        #[arg(short, long = "spec", value_name = "SPEC", required = true)]
        specs: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_curate::DateOffset;

    #[test]
    fn test_negative_date_offset_parses() {
        let cli = Cli::try_parse_from(["dicom-curate", "curate", "in", "out", "--date-offset", "-P30D"]).unwrap();
        let Commands::Curate { date_offset, .. } = cli.command else {
            panic!("expected curate");
        };
        let offset = date_offset.unwrap();
        assert_eq!(offset, "-P30D");
        assert!(DateOffset::parse(&offset).is_ok());
        assert!(DateOffset::parse("P1Y2M").is_ok());
    }
}
