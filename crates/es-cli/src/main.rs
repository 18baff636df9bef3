//! EchoSphere CLI - SQL data-quality tests for Snowflake, Postgres and Databricks

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

mod cli;
mod commands;

use cli::Cli;
use commands::common::FAILURE_EXIT_CODE;
use commands::{run, setup, view};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if let Err(err) = dispatch(&cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(FAILURE_EXIT_CODE);
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        cli::Commands::Run(args) => run::execute(args, &cli.global).await,
        cli::Commands::View(args) => view::execute(args, &cli.global).await,
        cli::Commands::Setup(args) => setup::execute(args, &cli.global).await,
    }
}
