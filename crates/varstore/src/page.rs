//! Linear walk of the records in one page.
//!
//! Iterative by construction: a recursive walk would track stack depth
//! against record count, so this walks the page with a plain loop instead.

use crate::error::Error;
use crate::hal::Flash;
use crate::record::{self, header_size, Header};
use crate::word::Word;

/// Walks one page's records from `base` up to `usable_end` (exclusive of
/// the trailing page-status slot).
pub(crate) struct Scan<'a, W, F> {
    hal: &'a F,
    base: usize,
    usable_end: usize,
    offset: usize,
    done: bool,
    _word: core::marker::PhantomData<W>,
}

impl<'a, W: Word, F: Flash<W>> Scan<'a, W, F> {
    pub fn new(hal: &'a F, base: usize, usable_size: usize) -> Self {
        Scan {
            hal,
            base,
            usable_end: base + usable_size,
            offset: base,
            done: false,
            _word: core::marker::PhantomData,
        }
    }
}

impl<'a, W: Word, F: Flash<W>> Iterator for Scan<'a, W, F> {
    /// `Ok(header)` for a record before the tail, or `Err(Error::Corruption)`
    /// once a header's declared size would overrun the page. The iterator
    /// yields nothing further after either the tail or an error.
    type Item = Result<Header<W>, Error<F::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.offset + header_size::<W>() > self.usable_end {
            self.done = true;
            return Some(Err(Error::Corruption));
        }
        let header = record::read_header(self.hal, self.offset);
        if header.is_end_of_log() {
            self.done = true;
            return None;
        }
        if header.next_offset() > self.usable_end {
            self.done = true;
            return Some(Err(Error::Corruption));
        }
        self.offset = header.next_offset();
        Some(Ok(header))
    }
}

/// Find the first record matching `(id, size)`, live or reserved.
pub(crate) fn find<W: Word, F: Flash<W>>(
    hal: &F,
    base: usize,
    usable_size: usize,
    id: W,
    size: usize,
) -> Result<Option<Header<W>>, Error<F::Error>> {
    for item in Scan::new(hal, base, usable_size) {
        let header = item?;
        if header.id == id && header.size == size && !header.is_tombstone() {
            return Ok(Some(header));
        }
    }
    Ok(None)
}

/// Offset of the tail: the first header slot whose `id == ~0` (or the
/// conservative half-staged-header case, see [`Header::is_end_of_log`]).
pub(crate) fn tail<W: Word, F: Flash<W>>(
    hal: &F,
    base: usize,
    usable_size: usize,
) -> Result<usize, Error<F::Error>> {
    let mut offset = base;
    for item in Scan::new(hal, base, usable_size) {
        offset = item?.next_offset();
    }
    Ok(offset)
}

/// Sum of live record payload sizes (`used_bytes` in the public API).
pub(crate) fn used_bytes<W: Word, F: Flash<W>>(
    hal: &F,
    base: usize,
    usable_size: usize,
) -> Result<usize, Error<F::Error>> {
    let mut sum = 0;
    for item in Scan::new(hal, base, usable_size) {
        let header = item?;
        if header.is_live() {
            sum += header.size;
        }
    }
    Ok(sum)
}

/// Sum of live record sizes including headers; used to predict whether a
/// roll will free enough room.
pub(crate) fn live_bytes_including_headers<W: Word, F: Flash<W>>(
    hal: &F,
    base: usize,
    usable_size: usize,
) -> Result<usize, Error<F::Error>> {
    let mut sum = 0;
    for item in Scan::new(hal, base, usable_size) {
        let header = item?;
        if header.is_live() {
            sum += header.record_size();
        }
    }
    Ok(sum)
}
