use clap::Parser;
use forum_query_cache::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Key(args) => cli::inspect::run_key(args).await,
        Command::Normalize(args) => cli::inspect::run_normalize(args).await,
        Command::Invalidate(args) => cli::invalidate::run(args).await,
        Command::Demo(args) => cli::demo::run(args).await,
    }
}
