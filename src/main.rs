//! odometer - atomically update a counter file shared between processes.
//!
//! # Usage
//!
//! ```bash
//! odometer counter.txt          # increment
//! odometer -p counter.txt       # increment and print the new count
//! odometer -s 41 counter.txt    # set
//! odometer -r counter.txt       # reset to 0
//! odometer -c counter.txt       # print without changing
//! ```

mod cli;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing on stderr so stdout only ever carries the count.
///
/// - `quiet`: suppress all logging output
/// - `verbose`: enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let config = cli.into_config(program_name());
    match odometer::run(&config) {
        Ok(Some(value)) => match writeln!(io::stdout().lock(), "{value}") {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{}: write stdout: {err}", config.program);
                ExitCode::FAILURE
            }
        },
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {err}", config.program);
            ExitCode::FAILURE
        }
    }
}
