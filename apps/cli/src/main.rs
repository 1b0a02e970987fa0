//! QuestionHub CLI — question storage and answering orchestration.
//!
//! Stores graph-shaped questions, enqueues answering jobs with a
//! refresh-then-retry recovery chain, and reports live job status per
//! question hash.

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
