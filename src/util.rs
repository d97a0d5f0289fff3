//! Shared internal helpers.

use crate::Error;
use bytes::Buf;

/// Returns an error if the buffer has fewer than `needed` bytes remaining.
///
/// Checking before any read guarantees that a failed fixed-width decode
/// consumes nothing.
#[inline]
pub fn at_least(buf: &impl Buf, needed: usize) -> Result<(), Error> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(Error::UnexpectedEndOfInput { needed, remaining });
    }
    Ok(())
}
