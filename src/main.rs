#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod config;
mod core;
mod logging;
mod metrics;
mod prelude;
mod quantity;
mod supervisor;
mod tables;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command},
    config::Config,
    prelude::*,
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = Config::read(&args.config)?;
    config.env.init_tracing();
    info!(
        version = crate_version!(),
        config = %args.config.display(),
        env = %config.env,
        "starting…",
    );
    debug!("debug messages enabled");

    match args.command {
        Command::Run => supervisor::run(&config).await?,
        Command::Status => supervisor::probe(&config).await?,
    }

    info!("done!");
    Ok(())
}
