use anyhow::Result;
use clap::Parser;
use sdk6_runner::cli::{Cli, Command};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Run(args) => args.verbose,
        Command::Report(args) => args.verbose,
        Command::Publish(args) => args.verbose,
    };
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Command::Run(args) => {
            let failed = sdk6_runner::batch::run(&args).await?;
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Report(args) => sdk6_runner::batch::report(&args).await?,
        Command::Publish(args) => sdk6_runner::publish::publish(&args).await?,
    }
    Ok(())
}
