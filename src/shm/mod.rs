/// Shared-memory counter backend.
///
/// Provides `Counter`, a cross-process counter backed by a `W + 1` byte
/// text file. Every process maps the file shared; updates are whole-word
/// CAS on the mapped digits, so there is no lock to clean up and no torn
/// value to observe.
pub mod init;
pub mod region;
pub mod update;

use std::marker::PhantomData;
use std::path::Path;

use tracing::debug;

use crate::config::Operation;
use crate::error::{CounterError, FormatIssue, Result};
use crate::layout::{file_len, validate_layout, MAX_WIDTH};
use crate::word::{CounterWord, NativeWord, SharedWord};

pub use init::InitOutcome;
use region::CounterRegion;

/// An open counter file.
///
/// Multiple processes (or independent handles in one process) opening the
/// same path share the same counter word.
pub struct Counter<W: CounterWord = NativeWord> {
    region: CounterRegion,
    init: InitOutcome,
    _word: PhantomData<W>,
}

impl<W: CounterWord> Counter<W> {
    /// Open `path` as a counter, creating and initializing it to zero if it
    /// does not exist yet.
    ///
    /// Fails with `Format` if the file is not a valid counter file. Nothing
    /// is ever written to such a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let region = CounterRegion::open(path, file_len::<W>())?;
        let init = init::resolve(&Self::shared_in(&region))?;

        let counter = Counter {
            region,
            init,
            _word: PhantomData,
        };
        if !validate_layout(&counter.snapshot()) {
            return Err(CounterError::Format(FormatIssue::Layout));
        }
        debug!(path = %path.display(), width = W::WIDTH, ?init, "opened counter");
        Ok(counter)
    }

    fn shared_in(region: &CounterRegion) -> SharedWord<'_, W> {
        // Safety: the region is `W::WIDTH + 1` bytes, page aligned, and only
        // ever accessed atomically.
        unsafe { SharedWord::from_ptr(region.base_ptr()) }
    }

    fn shared(&self) -> SharedWord<'_, W> {
        Self::shared_in(&self.region)
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut buf = [0u8; MAX_WIDTH + 1];
        let layout = &mut buf[..file_len::<W>()];
        self.shared().snapshot(layout);
        layout.to_vec()
    }

    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Whether this handle performed the one-time initialization.
    pub fn init_outcome(&self) -> InitOutcome {
        self.init
    }

    /// Largest value this counter can hold.
    pub const fn max_value(&self) -> u64 {
        W::MAX_VALUE
    }

    pub fn read(&self) -> Result<u64> {
        update::read(&self.shared())
    }

    /// Add one and return the value this call committed.
    pub fn increment(&self) -> Result<u64> {
        update::increment(&self.shared())
    }

    /// Store `value` and return it.
    pub fn set(&self, value: u64) -> Result<u64> {
        update::set(&self.shared(), value)
    }

    pub fn apply(&self, operation: Operation) -> Result<u64> {
        match operation {
            Operation::Increment => self.increment(),
            Operation::Set(value) => self.set(value),
            Operation::Read => self.read(),
        }
    }

    /// Unmap and close the file, reporting any failure.
    pub fn close(self) -> Result<()> {
        self.region.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn increment_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let counter = Counter::<u32>::open(&path).unwrap();
        assert_eq!(counter.path(), path.as_path());
        assert_eq!(counter.init_outcome(), InitOutcome::Initialized);
        assert_eq!(counter.increment().unwrap(), 1);
        counter.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"0001\n");
    }

    #[test]
    fn set_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, b"0041\n").unwrap();

        let counter = Counter::<u32>::open(&path).unwrap();
        assert_eq!(counter.init_outcome(), InitOutcome::AlreadyInitialized);
        assert_eq!(counter.set(0).unwrap(), 0);
        assert_eq!(counter.read().unwrap(), 0);
        counter.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"0000\n");
    }

    #[test]
    fn overflow_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, b"9999\n").unwrap();

        let counter = Counter::<u32>::open(&path).unwrap();
        assert!(matches!(
            counter.increment(),
            Err(CounterError::Overflow { .. })
        ));
        counter.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"9999\n");
    }

    #[test]
    fn rejects_malformed_files_before_any_update() {
        let dir = tempfile::tempdir().unwrap();
        let cases: [&[u8]; 7] = [
            b"12a4\n",
            b"00120",
            b"0012\r",
            b"001\n",
            b"1234\0",
            b"\0\0\0\0x",
            b"0000\0",
        ];

        for (i, content) in cases.into_iter().enumerate() {
            let path = dir.path().join(format!("bad-{i}.txt"));
            fs::write(&path, content).unwrap();

            let err = Counter::<u32>::open(&path).err().expect("must be rejected");
            assert!(
                matches!(err, CounterError::Format(_)),
                "{content:?} gave {err}"
            );
            assert_eq!(fs::read(&path).unwrap(), content);
        }
    }

    #[test]
    fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let first = Counter::<u64>::open(&path).unwrap();
        first.set(1234).unwrap();
        first.close().unwrap();

        for _ in 0..3 {
            let again = Counter::<u64>::open(&path).unwrap();
            assert_eq!(again.init_outcome(), InitOutcome::AlreadyInitialized);
            assert_eq!(again.read().unwrap(), 1234);
            again.close().unwrap();
        }
        assert_eq!(fs::read(&path).unwrap(), b"00001234\n");
    }

    #[test]
    fn native_width_matches_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let counter: Counter = Counter::open(&path).unwrap();
        assert_eq!(counter.max_value(), NativeWord::MAX_VALUE);
        assert_eq!(counter.apply(Operation::Increment).unwrap(), 1);
        assert_eq!(counter.apply(Operation::Set(5)).unwrap(), 5);
        assert_eq!(counter.apply(Operation::Read).unwrap(), 5);
        counter.close().unwrap();

        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            file_len::<NativeWord>() as u64
        );
    }

    #[test]
    fn concurrent_first_touch_and_increments_lose_nothing() {
        const HANDLES: usize = 8;
        const PER_HANDLE: u64 = 250;

        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("counter.txt"));
        let barrier = Arc::new(Barrier::new(HANDLES));

        let workers: Vec<_> = (0..HANDLES)
            .map(|_| {
                let path = Arc::clone(&path);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let counter = Counter::<u32>::open(path.as_path()).unwrap();
                    let mut committed = Vec::new();
                    for _ in 0..PER_HANDLE {
                        committed.push(counter.increment().unwrap());
                    }
                    let outcome = counter.init_outcome();
                    counter.close().unwrap();
                    (outcome, committed)
                })
            })
            .collect();

        let mut initializers = 0;
        let mut all = Vec::new();
        for worker in workers {
            let (outcome, committed) = worker.join().unwrap();
            if outcome == InitOutcome::Initialized {
                initializers += 1;
            }
            all.extend(committed);
        }

        let total = HANDLES as u64 * PER_HANDLE;
        assert_eq!(initializers, 1);
        all.sort_unstable();
        assert_eq!(all, (1..=total).collect::<Vec<_>>());
        assert_eq!(
            fs::read_to_string(path.as_path()).unwrap(),
            format!("{total:04}\n")
        );
    }
}
