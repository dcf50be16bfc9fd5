use std::marker::PhantomData;
use std::path::Path;

use crate::config::Operation;
use crate::error::{CounterError, Result};
use crate::word::{CounterWord, NativeWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Initialized,
    AlreadyInitialized,
    Skipped,
}

/// Stub Counter for Windows: `open` always fails.
pub struct Counter<W: CounterWord = NativeWord> {
    _word: PhantomData<W>,
}

impl<W: CounterWord> Counter<W> {
    pub fn open(_path: impl AsRef<Path>) -> Result<Self> {
        Err(CounterError::Unsupported)
    }

    pub fn path(&self) -> &Path {
        Path::new("")
    }

    pub fn init_outcome(&self) -> InitOutcome {
        InitOutcome::AlreadyInitialized
    }

    pub const fn max_value(&self) -> u64 {
        W::MAX_VALUE
    }

    pub fn read(&self) -> Result<u64> {
        Err(CounterError::Unsupported)
    }

    pub fn increment(&self) -> Result<u64> {
        Err(CounterError::Unsupported)
    }

    pub fn set(&self, _value: u64) -> Result<u64> {
        Err(CounterError::Unsupported)
    }

    pub fn apply(&self, _operation: Operation) -> Result<u64> {
        Err(CounterError::Unsupported)
    }

    pub fn close(self) -> Result<()> {
        Err(CounterError::Unsupported)
    }
}
