/*!

This is the command line interface for running the hosted-provider end-to-end scenarios.

!*/

mod create_token;
mod list;
mod run;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

/// Runs end-to-end scenarios against hosted Kubernetes clusters managed through a Rancher-style
/// management API.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// List the registered scenarios.
    List(list::List),
    /// Run scenarios and report their outcome.
    Run(run::Run),
    /// Create an API token on the management API.
    CreateToken(create_token::CreateToken),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    hosted_harness::init_logger(env!("CARGO_CRATE_NAME"), Some(args.log_level));
    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::List(list) => list.run(),
        Command::Run(run) => run.run().await,
        Command::CreateToken(create_token) => create_token.run().await,
    }
}
