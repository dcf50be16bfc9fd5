/// Counter file acquisition and the shared mapping over it.
///
/// Opens the counter file, or creates it exclusively when it does not
/// exist yet, then maps its `W + 1` bytes shared so every process mapping
/// the same file mutates the same page-cache bytes.
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::IntoRawFd;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::error::{CounterError, FormatIssue, Result};

/// Upper bound on Opening/Creating transitions before giving up. File
/// existence only changes under external deletion, so in practice one
/// extra round trip settles the race.
pub const MAX_ACQUIRE_ATTEMPTS: usize = 64;

const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquire {
    Opening,
    Creating,
}

fn open_existing(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(FILE_MODE)
        .open(path)
}

/// Resolve the open/create race for `path`.
///
/// `Opening` moves to `Creating` when the file is missing; `Creating`
/// moves back to `Opening` when another process created it first. Any
/// other failure is reported immediately.
fn acquire_handle<O, C>(
    path: &Path,
    max_attempts: usize,
    mut open: O,
    mut create: C,
) -> Result<File>
where
    O: FnMut(&Path) -> io::Result<File>,
    C: FnMut(&Path) -> io::Result<File>,
{
    let mut state = Acquire::Opening;
    for attempt in 0..max_attempts {
        match state {
            Acquire::Opening => match open(path) {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), attempt, "counter file missing, creating");
                    state = Acquire::Creating;
                }
                Err(e) => return Err(CounterError::io("open", path, e)),
            },
            Acquire::Creating => match create(path) {
                Ok(file) => {
                    debug!(path = %path.display(), "created counter file");
                    return Ok(file);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), attempt, "lost create race, reopening");
                    state = Acquire::Opening;
                }
                Err(e) => return Err(CounterError::io("create", path, e)),
            },
        }
    }
    Err(CounterError::io(
        "acquire",
        path,
        io::Error::other(format!("gave up after {max_attempts} open/create attempts")),
    ))
}

/// Bring a freshly created (empty) file to `expected` bytes; accept a file
/// already at that size; reject anything else.
///
/// Extension is safe to race: every caller grows the file to the same size
/// and `set_len` to the current size leaves the contents alone.
fn ensure_len(file: &File, path: &Path, expected: u64) -> Result<()> {
    let actual = file
        .metadata()
        .map_err(|e| CounterError::io("stat", path, e))?
        .len();
    match actual {
        0 => {
            file.set_len(expected)
                .map_err(|e| CounterError::io("truncate", path, e))?;
            debug!(path = %path.display(), len = expected, "extended counter file");
            Ok(())
        }
        n if n == expected => Ok(()),
        n => Err(CounterError::Format(FormatIssue::Length {
            expected,
            actual: n,
        })),
    }
}

/// Open or create `path` and make sure it is exactly `len` bytes long.
pub fn acquire_file(path: &Path, len: u64) -> Result<File> {
    let file = acquire_handle(path, MAX_ACQUIRE_ATTEMPTS, open_existing, create_exclusive)?;
    ensure_len(&file, path, len)?;
    Ok(file)
}

/// A counter file together with its shared, writable mapping.
pub struct CounterRegion {
    mmap: MmapMut,
    file: File,
    path: PathBuf,
}

impl CounterRegion {
    /// Acquire `path` as a `len`-byte counter file and map all of it.
    pub fn open(path: &Path, len: usize) -> Result<Self> {
        let file = acquire_file(path, len as u64)?;

        // Safety: the mapping is shared with other processes by design. Every
        // access to these bytes goes through atomics in `SharedWord`.
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| CounterError::io("mmap", path, e))?;

        Ok(CounterRegion {
            mmap,
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Base of the mapping. Page aligned, so aligned for any counter word.
    pub fn base_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    /// Unmap and close, reporting either failure instead of losing it in
    /// `Drop`. The descriptor is closed even when unmapping fails.
    pub fn close(self) -> Result<()> {
        let CounterRegion { mmap, file, path } = self;
        let (ptr, len) = (mmap.as_ptr() as *mut libc::c_void, mmap.len());
        // Mapped from offset 0, so the mapping is exactly `len` bytes at `ptr`.
        // The handle is forgotten so it does not unmap a second time.
        std::mem::forget(mmap);
        let unmap_err =
            (unsafe { libc::munmap(ptr, len) } == -1).then(io::Error::last_os_error);

        let fd = file.into_raw_fd();
        let close_err = (unsafe { libc::close(fd) } == -1).then(io::Error::last_os_error);

        match (unmap_err, close_err) {
            (Some(e), _) => Err(CounterError::io("munmap", path, e)),
            (None, Some(e)) => Err(CounterError::io("close", path, e)),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;

    #[test]
    fn creates_missing_file_at_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let file = acquire_file(&path, 5).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 5);
        assert_eq!(fs::read(&path).unwrap(), vec![0u8; 5]);
    }

    #[test]
    fn reopens_existing_file_without_touching_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, b"0041\n").unwrap();

        acquire_file(&path, 5).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"0041\n");
    }

    #[test]
    fn extends_empty_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, b"").unwrap();

        acquire_file(&path, 9).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 9);
    }

    #[test]
    fn rejects_unexpected_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, b"00041\n").unwrap();

        let err = acquire_file(&path, 5).unwrap_err();
        assert!(matches!(
            err,
            CounterError::Format(FormatIssue::Length {
                expected: 5,
                actual: 6
            })
        ));
        assert_eq!(fs::read(&path).unwrap(), b"00041\n");
    }

    #[test]
    fn lost_create_race_falls_back_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, b"").unwrap();

        let opens = Cell::new(0);
        let file = acquire_handle(
            &path,
            MAX_ACQUIRE_ATTEMPTS,
            |p| {
                opens.set(opens.get() + 1);
                if opens.get() == 1 {
                    Err(io::Error::from(io::ErrorKind::NotFound))
                } else {
                    open_existing(p)
                }
            },
            create_exclusive,
        );
        assert!(file.is_ok());
        assert_eq!(opens.get(), 2);
    }

    #[test]
    fn acquisition_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let calls = Cell::new(0usize);
        let err = acquire_handle(
            &path,
            MAX_ACQUIRE_ATTEMPTS,
            |_| {
                calls.set(calls.get() + 1);
                Err(io::Error::from(io::ErrorKind::NotFound))
            },
            |_| {
                calls.set(calls.get() + 1);
                Err(io::Error::from(io::ErrorKind::AlreadyExists))
            },
        )
        .unwrap_err();

        assert_eq!(calls.get(), MAX_ACQUIRE_ATTEMPTS);
        assert!(matches!(err, CounterError::Io { op: "acquire", .. }));
    }

    #[test]
    fn other_open_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let calls = Cell::new(0usize);
        let err = acquire_handle(
            &path,
            MAX_ACQUIRE_ATTEMPTS,
            |_| {
                calls.set(calls.get() + 1);
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            },
            create_exclusive,
        )
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, CounterError::Io { op: "open", .. }));
        assert!(!path.exists());
    }

    #[test]
    fn mappings_of_one_file_share_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let a = CounterRegion::open(&path, 5).unwrap();
        let b = CounterRegion::open(&path, 5).unwrap();
        assert_eq!(a.len(), 5);

        unsafe { *a.base_ptr() = b'7' };
        assert_eq!(unsafe { *b.base_ptr() }, b'7');

        a.close().unwrap();
        b.close().unwrap();
        assert_eq!(fs::read(&path).unwrap()[0], b'7');
    }

    #[test]
    fn closing_one_mapping_leaves_the_other_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.txt");

        let a = CounterRegion::open(&path, 9).unwrap();
        let b = CounterRegion::open(&path, 9).unwrap();
        a.close().unwrap();

        unsafe { *b.base_ptr().add(8) = b'\n' };
        b.close().unwrap();

        let reopened = CounterRegion::open(&path, 9).unwrap();
        assert_eq!(unsafe { *reopened.base_ptr().add(8) }, b'\n');
        reopened.close().unwrap();
    }
}
