//! bitfunnel CLI — video comment curation funnel.
//!
//! Plans search terms, screens the videos found, and turns the comments of
//! the survivors into quality-checked comedy bits.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
