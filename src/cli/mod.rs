//! CLI module for entiq
//!
//! Provides command-line interface for:
//! - run: evaluate a query script against rows loaded from a JSON file
//! - explain: print the remote/local split of a query script

mod args;
mod commands;
mod errors;
mod io;
mod script;

pub use args::{Cli, Command, QueryArgs};
pub use commands::{explain, run, run_command, run_script};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
pub use script::{QueryScript, Step, Terminal};
