/// Moves a freshly extended counter from all-zero bytes to formatted zero.
///
/// Racing processes all run this; exactly one CAS from the all-zero word
/// succeeds. The all-zero state is never re-entered, so losers only need
/// to observe that it is gone.
use tracing::debug;

use crate::error::Result;
use crate::layout::encode;
use crate::word::{CounterWord, SharedWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// This call wrote the formatted zero.
    Initialized,
    /// The word was already past the all-zero state.
    AlreadyInitialized,
    /// The word is all-zero but the delimiter byte is neither `0` nor
    /// `'\n'`. Nothing was written; validation rejects the file.
    Skipped,
}

/// Initialize the word if nobody has.
///
/// Only a still all-zero word gets its delimiter claimed, and the claim is
/// sequenced before the word CAS: any process that observes an initialized
/// word also observes the delimiter. An initialized word is never paired
/// with a repaired delimiter.
pub fn resolve<W: CounterWord>(shared: &SharedWord<'_, W>) -> Result<InitOutcome> {
    let zero = encode::<W>(0)?;
    while shared.is_uninit() {
        if !shared.claim_delimiter() {
            debug!("all-zero counter word with corrupt delimiter, not initializing");
            return Ok(InitOutcome::Skipped);
        }
        match shared.compare_exchange(W::UNINIT, zero) {
            Ok(_) => {
                debug!("initialized counter word");
                return Ok(InitOutcome::Initialized);
            }
            Err(found) if found != W::UNINIT => break,
            Err(_) => std::hint::spin_loop(),
        }
    }
    debug!("counter word already initialized");
    Ok(InitOutcome::AlreadyInitialized)
}
