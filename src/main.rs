#![forbid(unsafe_code)]

//! fch — Flow Conformance Harness CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("fch: {e}");
        std::process::exit(e.exit_code());
    }
}
