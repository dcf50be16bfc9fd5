/// Fixed-width counter words and the atomic view over mapped bytes.
///
/// The counter word is compared byte-for-byte by CAS, so it is carried as
/// a native-endian integer whose in-memory bytes are the ASCII digits.
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::layout::DELIMITER;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// An integer type wide enough to hold `WIDTH` digit bytes and swappable
/// with a single hardware CAS.
pub trait CounterWord: sealed::Sealed + Copy + Eq + Debug + Send + Sync + 'static {
    /// Number of digit bytes, `W`.
    const WIDTH: usize;

    /// Largest value representable in `WIDTH` decimal digits.
    const MAX_VALUE: u64;

    /// All bytes zero: the state of a freshly extended file.
    const UNINIT: Self;

    /// Reinterpret `WIDTH` bytes as a word, keeping their memory order.
    fn from_digits(digits: &[u8]) -> Self;

    /// Write the word's `WIDTH` bytes into `out` in memory order.
    fn write_digits(self, out: &mut [u8]);

    /// # Safety
    /// `ptr` must be valid for reads of `WIDTH` bytes and aligned to `WIDTH`.
    unsafe fn atomic_load(ptr: *const u8) -> Self;

    /// # Safety
    /// `ptr` must be valid for writes of `WIDTH` bytes and aligned to `WIDTH`.
    unsafe fn atomic_compare_exchange(ptr: *mut u8, current: Self, new: Self)
        -> Result<Self, Self>;
}

macro_rules! impl_counter_word {
    ($word:ty, $atomic:ty, $width:expr) => {
        impl CounterWord for $word {
            const WIDTH: usize = $width;
            const MAX_VALUE: u64 = 10u64.pow($width) - 1;
            const UNINIT: Self = 0;

            #[inline]
            fn from_digits(digits: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&digits[..$width]);
                <$word>::from_ne_bytes(raw)
            }

            #[inline]
            fn write_digits(self, out: &mut [u8]) {
                out[..$width].copy_from_slice(&self.to_ne_bytes());
            }

            #[inline]
            unsafe fn atomic_load(ptr: *const u8) -> Self {
                (*(ptr as *const $atomic)).load(Ordering::Acquire)
            }

            #[inline]
            unsafe fn atomic_compare_exchange(
                ptr: *mut u8,
                current: Self,
                new: Self,
            ) -> Result<Self, Self> {
                (*(ptr as *const $atomic)).compare_exchange(
                    current,
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
            }
        }
    };
}

impl_counter_word!(u32, AtomicU32, 4);
impl_counter_word!(u64, AtomicU64, 8);

const _: () = assert!(<u32 as CounterWord>::MAX_VALUE == 9_999);
const _: () = assert!(<u64 as CounterWord>::MAX_VALUE == 99_999_999);

/// The widest word this build can CAS in one instruction.
#[cfg(all(target_has_atomic = "64", not(feature = "narrow-word")))]
pub type NativeWord = u64;

/// The widest word this build can CAS in one instruction.
#[cfg(any(not(target_has_atomic = "64"), feature = "narrow-word"))]
pub type NativeWord = u32;

/// Typed view over the `W + 1` shared bytes of a counter file: the word
/// followed by the delimiter byte.
///
/// Every access is atomic. The word is only ever replaced as a whole.
pub struct SharedWord<'a, W: CounterWord> {
    ptr: *mut u8,
    _marker: PhantomData<&'a W>,
}

impl<'a, W: CounterWord> SharedWord<'a, W> {
    /// # Safety
    /// `ptr` must stay valid for reads and writes of `W::WIDTH + 1` bytes for
    /// `'a` and be aligned to `W::WIDTH`. Other writers may only touch those
    /// bytes atomically.
    pub unsafe fn from_ptr(ptr: *mut u8) -> Self {
        debug_assert_eq!(ptr as usize % W::WIDTH, 0);
        SharedWord {
            ptr,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn load(&self) -> W {
        unsafe { W::atomic_load(self.ptr) }
    }

    /// Replace `current` with `new`. On failure returns the word actually
    /// found.
    #[inline]
    pub fn compare_exchange(&self, current: W, new: W) -> Result<W, W> {
        unsafe { W::atomic_compare_exchange(self.ptr, current, new) }
    }

    #[inline]
    pub fn is_uninit(&self) -> bool {
        self.load() == W::UNINIT
    }

    #[inline]
    fn delimiter(&self) -> &AtomicU8 {
        unsafe { &*(self.ptr.add(W::WIDTH) as *const AtomicU8) }
    }

    /// Move the delimiter byte from `0` to `'\n'`. Any other byte is left
    /// as is so that validation still sees it. Returns true if the byte is
    /// the delimiter afterwards, whoever wrote it.
    pub fn claim_delimiter(&self) -> bool {
        match self.delimiter().compare_exchange(
            0,
            DELIMITER,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(found) => found == DELIMITER,
        }
    }

    /// Copy the full `W + 1` byte layout into `out`.
    pub fn snapshot(&self, out: &mut [u8]) {
        self.load().write_digits(out);
        out[W::WIDTH] = self.delimiter().load(Ordering::Acquire);
    }
}
