//! chartsync CLI: chart a Notion database onto a Notion page.
//!
//! Queries the database, renders the scores through QuickChart, rehosts the
//! image on Imgur, and swaps it into the page's image blocks.

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
