//! Entry point of the sentinel daemon.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use sentineld::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match sentineld::run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "sentineld: {error}");
            error.exit_code()
        }
    }
}
