//! Lock-free cross-process counter stored in a text file.
//!
//! A counter file holds `W` zero-padded ASCII digits and a trailing newline.
//! Processes map it shared and update it with a single compare-and-swap over
//! the digit bytes, so concurrent increments are never lost and readers never
//! see a half-written value.

mod config;
mod error;
pub mod layout;
pub mod word;

#[cfg(not(target_os = "windows"))]
mod shm;

#[cfg(target_os = "windows")]
mod shm_stub;

pub use config::{Config, Operation};
pub use error::{CounterError, FormatIssue, Result};
pub use word::{CounterWord, NativeWord};

#[cfg(not(target_os = "windows"))]
pub use shm::{region::MAX_ACQUIRE_ATTEMPTS, Counter, InitOutcome};

#[cfg(target_os = "windows")]
pub use shm_stub::{Counter, InitOutcome};

/// Open the configured counter, apply its operation and close it again.
///
/// Returns the resulting value when the configuration asks for output.
pub fn run(config: &Config) -> Result<Option<u64>> {
    let counter: Counter = Counter::open(&config.path)?;
    let value = counter.apply(config.operation)?;
    counter.close()?;
    tracing::debug!(
        path = %config.path.display(),
        operation = ?config.operation,
        value,
        "counter updated"
    );
    Ok(config.wants_output().then_some(value))
}
