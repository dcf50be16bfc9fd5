/// On-disk layout of a counter file and the decimal codec for its word.
///
/// A counter file is exactly `W + 1` bytes: `W` zero-padded ASCII digits
/// followed by `'\n'`. `W` is the width of the counter word (4 or 8).
use crate::error::{CounterError, FormatIssue, Result};
use crate::word::CounterWord;

/// Trailing byte of every counter file.
pub const DELIMITER: u8 = b'\n';

/// Widest supported word, used to size stack buffers.
pub(crate) const MAX_WIDTH: usize = 8;

/// Exact length of a counter file for word type `W`.
pub const fn file_len<W: CounterWord>() -> usize {
    W::WIDTH + 1
}

/// Parse `digits` as an unsigned base-10 integer.
///
/// Every byte must be an ASCII digit. Anything else is a format violation,
/// never a silent zero.
pub fn decode(digits: &[u8]) -> Result<u64> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(CounterError::Format(FormatIssue::Digits));
    }
    digits.iter().try_fold(0u64, |acc, &b| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| CounterError::Parse {
                digits: String::from_utf8_lossy(digits).into_owned(),
            })
    })
}

/// Decode a counter word read from the mapping.
pub fn decode_word<W: CounterWord>(word: W) -> Result<u64> {
    let mut buf = [0u8; MAX_WIDTH];
    word.write_digits(&mut buf);
    decode(&buf[..W::WIDTH])
}

/// Render `value` zero-padded into all of `out`.
///
/// Fails with `Overflow` when the value needs more digits than `out` holds.
pub fn encode_into(value: u64, out: &mut [u8]) -> Result<()> {
    let width = out.len();
    let max = 10u64
        .checked_pow(width as u32)
        .map_or(u64::MAX, |limit| limit - 1);
    if value > max {
        return Err(CounterError::Overflow { value, max });
    }
    let mut rest = value;
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
    Ok(())
}

/// Encode `value` as a counter word of type `W`.
pub fn encode<W: CounterWord>(value: u64) -> Result<W> {
    let mut buf = [0u8; MAX_WIDTH];
    encode_into(value, &mut buf[..W::WIDTH])?;
    Ok(W::from_digits(&buf[..W::WIDTH]))
}

/// True iff `bytes` is a well-formed `W + 1` byte counter layout: `W` digits
/// then the delimiter.
pub fn validate_layout(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        Some((&DELIMITER, digits)) => {
            !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
        }
        _ => false,
    }
}
