use std::path::PathBuf;

/// What to do with the counter once it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    /// Advance the stored value by exactly one.
    #[default]
    Increment,
    /// Replace the stored value.
    Set(u64),
    /// Report the stored value without modifying it.
    Read,
}

/// A resolved invocation, handed from the command line to [`crate::run`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Name the program was invoked as, used to prefix diagnostics.
    pub program: String,
    pub path: PathBuf,
    pub operation: Operation,
    /// Report the resulting value even for mutating operations.
    pub print: bool,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>, operation: Operation) -> Self {
        Config {
            program: env!("CARGO_PKG_NAME").to_string(),
            path: path.into(),
            operation,
            print: false,
        }
    }

    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Whether `run` hands a value back for printing.
    pub fn wants_output(&self) -> bool {
        self.print || self.operation == Operation::Read
    }
}
