#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod search;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries translations; all logging goes to stderr
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("rnnsearch=info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Cli::parse_and_run()
}
