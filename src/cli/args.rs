//! CLI argument definitions using clap
//!
//! Commands:
//! - entiq run --descriptors <path> --data <path> --query <path> [--config <path>]
//! - entiq explain --descriptors <path> --query <path> [--config <path>]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// entiq - lazy entity cursors with remote query pushdown
#[derive(Parser, Debug)]
#[command(name = "entiq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Inputs shared by every command
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Entity descriptor file, or a directory of `*.json` descriptor files
    #[arg(long)]
    pub descriptors: PathBuf,

    /// Query script (JSON)
    #[arg(long)]
    pub query: PathBuf,

    /// Engine configuration file; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a query script against rows held in memory
    Run {
        #[command(flatten)]
        query: QueryArgs,

        /// Rows per entity: `{"Entity": [row, ...]}`
        #[arg(long)]
        data: PathBuf,
    },

    /// Print the remote/local split of a query script without running it
    Explain {
        #[command(flatten)]
        query: QueryArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
