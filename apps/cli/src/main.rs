//! FOA Intel CLI: ingest funding opportunity announcements from public
//! grant sources, tag them against a research ontology, and export
//! JSON and CSV.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
