//! Labpresence CLI entry point.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() {
    labpresence_client::logging::init_tracing(labpresence_client::logging::DEFAULT_FILTER);

    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
