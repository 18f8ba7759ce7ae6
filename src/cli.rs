use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// TOML configuration file.
    #[clap(long = "config", env = "DUSK_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Subcommand)]
pub enum Command {
    /// Main command: poll the enabled batteries and discharge them until interrupted.
    #[clap(name = "run")]
    Run,

    /// Poll the enabled batteries once and show whether they would discharge right now.
    #[clap(name = "status")]
    Status,
}
