//! dicom-curate CLI - curate DICOM collections from the command line.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let result = match cli.command {
        Commands::Curate {
            input,
            output,
            specs,
            table,
            date_offset,
            cache,
            write_cache,
            output_mappings,
            hash,
            workers,
            dry_run,
            upload_url,
            headers,
        } => {
            commands::curate::run(
                commands::curate::CurateArgs {
                    input,
                    output,
                    specs,
                    table,
                    date_offset,
                    cache,
                    write_cache,
                    output_mappings,
                    hash,
                    workers,
                    dry_run,
                    upload_url,
                    headers,
                },
                cli.verbose,
            )
            .await
        }

        Commands::Inspect { file, list } => commands::inspect::run(file, list),

        Commands::Compose { specs } => commands::compose::run(specs),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
