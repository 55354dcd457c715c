use anyhow::Result;
use clap::Parser;
use filepipe_main::{init_tracing, run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    run(cli).await
}
