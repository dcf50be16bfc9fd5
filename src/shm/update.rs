/// Optimistic read-compute-CAS loop over the shared counter word.
///
/// Each attempt captures the word, decodes it, derives the next value and
/// swaps the whole word. A failed CAS means another writer got in first and
/// the attempt starts over. Decode and encode failures end the loop.
use tracing::trace;

use crate::error::Result;
use crate::layout::{decode_word, encode};
use crate::word::{CounterWord, SharedWord};

/// Run `next` against the current value until its result is committed.
/// Returns the committed value.
///
/// `next` sees the decoded value of the word it is about to replace and
/// may run several times under contention.
pub fn update<W, F>(shared: &SharedWord<'_, W>, mut next: F) -> Result<u64>
where
    W: CounterWord,
    F: FnMut(u64) -> Result<u64>,
{
    let mut retries = 0u64;
    loop {
        let current = shared.load();
        let old = decode_word(current)?;
        let new = next(old)?;
        let new_word = encode::<W>(new)?;

        match shared.compare_exchange(current, new_word) {
            Ok(_) => {
                if retries > 0 {
                    trace!(retries, value = new, "counter update committed after retries");
                }
                return Ok(new);
            }
            Err(_) => {
                retries += 1;
                trace!(retries, "counter word changed underneath, retrying");
            }
        }
    }
}

/// Current value. A single atomic load, not ordered against writers.
pub fn read<W: CounterWord>(shared: &SharedWord<'_, W>) -> Result<u64> {
    decode_word(shared.load())
}

/// Add one. Overflowing the width is an error, never a wrap.
pub fn increment<W: CounterWord>(shared: &SharedWord<'_, W>) -> Result<u64> {
    update(shared, |old| Ok(old + 1))
}

/// Store `value`. The old word is still decoded on every attempt so a
/// corrupt file is reported rather than overwritten.
pub fn set<W: CounterWord>(shared: &SharedWord<'_, W>, value: u64) -> Result<u64> {
    update(shared, |_| Ok(value))
}
