use clap::Parser;
use memocache::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Key(args) => cli::key::run(args).await,
        Command::Probe(args) => cli::probe::run(args).await,
        Command::Clear(args) => cli::clear::run(args).await,
    }
}
