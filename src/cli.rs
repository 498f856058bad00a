//! Command-line entry point: `init` writes a default genesis and config to
//! a data directory, `start` boots the node, optionally as a block
//! producer.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pixelzx-node", version, about = "PIXELZX proof-of-stake node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a default genesis.json and config.yaml to a data directory.
    Init {
        #[arg(long, default_value = "/data")]
        data_dir: String,
    },
    /// Boot the node, optionally as a block producer.
    Start {
        #[arg(long, default_value = "/data")]
        data_dir: String,
        #[arg(long)]
        validator: Option<String>,
    },
}
