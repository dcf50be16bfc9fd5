//! Command-line surface: flags resolved into an [`odometer::Config`].

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use odometer::{Config, Operation};

/// Atomically update a counter file shared between processes.
#[derive(Debug, Parser)]
#[command(name = "odometer", version, about)]
#[command(group(ArgGroup::new("operation").args(["increment", "reset", "set", "cat"])))]
pub struct Cli {
    /// Increment the counter (default)
    #[arg(short, long)]
    pub increment: bool,

    /// Reset the counter to 0
    #[arg(short, long)]
    pub reset: bool,

    /// Set the counter to a specific value
    #[arg(short, long, value_name = "COUNT")]
    pub set: Option<u64>,

    /// Print the counter without changing it
    #[arg(short, long)]
    pub cat: bool,

    /// Print the count after the update
    #[arg(short, long)]
    pub print: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress all logging
    #[arg(short, long)]
    pub quiet: bool,

    /// Counter file, created if missing
    #[arg(value_name = "FILE", env = "ODOMETER_FILE")]
    pub file: PathBuf,
}

impl Cli {
    pub fn operation(&self) -> Operation {
        if self.reset {
            Operation::Set(0)
        } else if let Some(value) = self.set {
            Operation::Set(value)
        } else if self.cat {
            Operation::Read
        } else {
            Operation::Increment
        }
    }

    pub fn into_config(self, program: String) -> Config {
        let operation = self.operation();
        Config::new(self.file, operation)
            .with_print(self.print)
            .with_program(program)
    }
}
