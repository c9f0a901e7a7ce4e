use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::from(euets::commands::exit_code(&err));
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = euets::cli::Cli::parse();
    euets::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    euets::commands::run(cli).await
}
