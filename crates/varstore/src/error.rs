//! Error taxonomy surfaced by the public API.
//!
//! Mirrors `stm32_hal::flash::FlashError`'s plain hand-rolled enum: no
//! `thiserror`, since nothing downstream of this crate has `std`.

use core::fmt;

/// Errors reported by [`crate::VariableStore`] operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error<E> {
    /// `write` was called for a `(id, size)` that was never `get`.
    NotFound,
    /// `get` needed to roll the block to make room and even a fully
    /// compacted block would not fit the new record.
    OutOfSpace,
    /// The underlying flash HAL reported a failure.
    Hal(E),
    /// A record header before the tail could not be trusted (its declared
    /// size runs past the page's usable region).
    Corruption,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "variable not found; call get() before write()"),
            Error::OutOfSpace => write!(f, "no space left even after compaction"),
            Error::Hal(e) => write!(f, "flash HAL error: {:?}", e),
            Error::Corruption => write!(f, "record header is inconsistent with page bounds"),
        }
    }
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Hal(e)
    }
}
