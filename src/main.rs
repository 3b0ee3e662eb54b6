//! entiq CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and exits non-zero on
//! failure. The error response itself is written to stdout by the command.

use entiq::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}: {}", e.code(), e);
        std::process::exit(1);
    }
}
