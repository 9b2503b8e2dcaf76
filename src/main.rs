mod aggregate;
mod cache;
mod cli;
mod constants;
mod ctgov;
mod error;
mod export;
mod filter;
mod finder;
mod geo;
mod http;
mod lookup;
mod map;
mod model;
mod nppes;
mod panel;
mod proximity;
mod selector;
mod server;
mod source;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Lookup(cmd) => lookup::run(cmd).await.context("lookup failed"),
    }
}
