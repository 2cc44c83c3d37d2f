//! Active-page selection and the write engine, plus the public
//! [`VariableStore`] surface.

use core::marker::PhantomData;

use crate::error::Error;
use crate::hal::Flash;
use crate::log::vs_log;
use crate::page::{find, live_bytes_including_headers, tail, used_bytes as page_used_bytes};
use crate::record::{self, header_size};
use crate::roll;
use crate::word::Word;

/// A durable reference to one record's payload, returned by
/// [`VariableStore::get`]. Reading it goes back through the same HAL the
/// store was constructed with.
#[derive(Debug, Copy, Clone)]
pub struct Handle {
    offset: usize,
    size: usize,
}

impl Handle {
    /// Payload length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read the payload's current bytes into `buf`. `buf.len()` must equal
    /// [`Handle::size`].
    pub fn read<W: Word, F: Flash<W>>(&self, hal: &F, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.size);
        hal.read_bytes(self.offset, buf);
    }
}

/// Owns one block (two flash pages) and the HAL used to manipulate it.
///
/// Public operations must not overlap on the same store; nothing here
/// suspends or yields, so ordinary `&mut self` exclusivity is sufficient to
/// enforce that at compile time.
pub struct VariableStore<W, F> {
    hal: F,
    page_base: [usize; 2],
    usable_size: usize,
    _word: PhantomData<W>,
}

fn page_status_offset(base: usize, usable_size: usize) -> usize {
    base + usable_size
}

impl<W: Word, F: Flash<W>> VariableStore<W, F> {
    /// Bind a store to two equally-sized flash pages of `page_size` bytes
    /// each. The usable record region is `page_size - header_size::<W>()`:
    /// the trailing header-sized slot holds the page-status word. Fails if
    /// `page_size` cannot even hold that reserved slot.
    pub fn new(
        hal: F,
        page0_base: usize,
        page1_base: usize,
        page_size: usize,
    ) -> Result<Self, Error<F::Error>> {
        let header = header_size::<W>();
        if page_size <= header {
            return Err(Error::Corruption);
        }
        Ok(VariableStore {
            hal,
            page_base: [page0_base, page1_base],
            usable_size: page_size - header,
            _word: PhantomData,
        })
    }

    /// Borrow the underlying HAL, e.g. to pass to [`Handle::read`].
    pub fn hal_ref(&self) -> &F {
        &self.hal
    }

    fn page_status(&self, index: usize) -> W {
        self.hal
            .read_word(page_status_offset(self.page_base[index], self.usable_size))
    }

    fn mark_active(&mut self, index: usize) -> Result<(), Error<F::Error>> {
        let base = self.page_base[index];
        let offset = page_status_offset(base, self.usable_size);
        self.hal.begin_write(base)?;
        self.hal.program_word(offset, W::WRITTEN)?;
        self.hal.end_write(base)?;
        Ok(())
    }

    /// Which page currently holds the live log, without touching flash.
    /// Returns `None` if neither page has ever been activated. If both pages
    /// read active (a roll crashed after marking its destination active but
    /// before erasing its source), the page whose live-byte sum is greater
    /// or equal wins; the loser is left as-is here and is only erased by the
    /// mutating recovery path in [`Self::ensure_active`].
    fn find_active(&self) -> Result<Option<usize>, Error<F::Error>> {
        let active0 = self.page_status(0) == W::WRITTEN;
        let active1 = self.page_status(1) == W::WRITTEN;
        match (active0, active1) {
            (true, false) => Ok(Some(0)),
            (false, true) => Ok(Some(1)),
            (false, false) => Ok(None),
            (true, true) => {
                let sum0 = live_bytes_including_headers(&self.hal, self.page_base[0], self.usable_size)?;
                let sum1 = live_bytes_including_headers(&self.hal, self.page_base[1], self.usable_size)?;
                Ok(Some(if sum0 >= sum1 { 0 } else { 1 }))
            }
        }
    }

    /// Active-page selector, folding in the "no active page yet" bootstrap
    /// (marks page 0 active) and the dual-active crash recovery (erases the
    /// losing page once a winner has been picked by [`Self::find_active`]).
    fn ensure_active(&mut self) -> Result<usize, Error<F::Error>> {
        match self.find_active()? {
            Some(active) => {
                if self.page_status(0) == W::WRITTEN && self.page_status(1) == W::WRITTEN {
                    vs_log!("varstore: dual-active pages detected, recovering");
                    self.hal.erase_page(self.page_base[self.spare_of(active)])?;
                }
                Ok(active)
            }
            None => {
                self.mark_active(0)?;
                Ok(0)
            }
        }
    }

    fn spare_of(&self, active: usize) -> usize {
        1 - active
    }

    /// Sum of live payload bytes in the active page; `0` if there is none
    /// yet. A read-only query: it never marks a page active.
    pub fn used_bytes(&self) -> Result<usize, Error<F::Error>> {
        match self.find_active()? {
            Some(active) => page_used_bytes(&self.hal, self.page_base[active], self.usable_size),
            None => Ok(0),
        }
    }

    /// Whether either page has ever been activated.
    pub fn is_used(&self) -> bool {
        self.page_status(0) == W::WRITTEN || self.page_status(1) == W::WRITTEN
    }

    /// Allocate-or-find: return a handle to the record for `(id, size)`,
    /// reserving a fresh slot for it if one doesn't already exist.
    ///
    /// # Panics
    /// Debug builds assert `id` is outside the reserved `{0, ~0}` range.
    pub fn get(&mut self, id: W, size: usize) -> Result<Handle, Error<F::Error>> {
        debug_assert!(
            id != W::WRITTEN && id != W::ERASED,
            "id 0 and ~0 are reserved"
        );
        let active = self.ensure_active()?;
        self.get_on(active, id, size)
    }

    fn get_on(&mut self, active: usize, id: W, size: usize) -> Result<Handle, Error<F::Error>> {
        let base = self.page_base[active];

        if let Some(header) = find(&self.hal, base, self.usable_size, id, size)? {
            return Ok(Handle {
                offset: header.payload_offset(),
                size: header.size,
            });
        }

        let tail_offset = tail(&self.hal, base, self.usable_size)?;
        let needed = header_size::<W>() + size;
        if tail_offset + needed <= base + self.usable_size {
            record::stage_header(&mut self.hal, base, tail_offset, id, size)?;
            return Ok(Handle {
                offset: tail_offset + header_size::<W>(),
                size,
            });
        }

        let compacted = live_bytes_including_headers(&self.hal, base, self.usable_size)?;
        if compacted + needed > self.usable_size {
            return Err(Error::OutOfSpace);
        }

        let spare = self.spare_of(active);
        roll::roll(&mut self.hal, base, self.page_base[spare], self.usable_size, None)?;
        self.get_on(spare, id, size)
    }

    /// Update the record for `(id, size)`, which must already have been
    /// obtained via [`Self::get`].
    pub fn write(&mut self, id: W, size: usize, data: &[u8]) -> Result<(), Error<F::Error>> {
        debug_assert_eq!(data.len(), size);
        let active = self.ensure_active()?;
        self.write_on(active, id, size, data)
    }

    fn write_on(&mut self, active: usize, id: W, size: usize, data: &[u8]) -> Result<(), Error<F::Error>> {
        let base = self.page_base[active];
        let header = find(&self.hal, base, self.usable_size, id, size)?.ok_or(Error::NotFound)?;

        if header.is_reserved() {
            record::fill_and_commit(&mut self.hal, base, header.offset, data)?;
            return Ok(());
        }

        if payload_equals(&self.hal, header.payload_offset(), header.size, data) {
            return Ok(());
        }

        let tail_offset = tail(&self.hal, base, self.usable_size)?;
        let needed = header_size::<W>() + size;
        if tail_offset + needed <= base + self.usable_size {
            vs_log!("varstore: rewrite at tail for id {:?}", id);
            record::stage_header(&mut self.hal, base, tail_offset, id, size)?;
            record::fill_and_commit(&mut self.hal, base, tail_offset, data)?;
            record::tombstone(&mut self.hal, base, header.offset)?;
            return Ok(());
        }

        vs_log!("varstore: page full, rolling to make room for id {:?}", id);
        let spare = self.spare_of(active);
        roll::roll(
            &mut self.hal,
            base,
            self.page_base[spare],
            self.usable_size,
            Some((id, size, data)),
        )?;
        Ok(())
    }

    /// Tombstone the record for `(id, size)` if it exists. Idempotent.
    pub fn delete(&mut self, id: W, size: usize) -> Result<(), Error<F::Error>> {
        let active = self.ensure_active()?;
        let base = self.page_base[active];
        if let Some(header) = find(&self.hal, base, self.usable_size, id, size)? {
            record::tombstone(&mut self.hal, base, header.offset)?;
        }
        Ok(())
    }
}

/// Compare a committed payload against `data` without allocating a buffer
/// the size of the whole payload. Lets a repeated identical `write` skip
/// programming any flash at all.
fn payload_equals<W: Word, F: Flash<W>>(hal: &F, payload_offset: usize, size: usize, data: &[u8]) -> bool {
    const CHUNK: usize = 32;
    let mut buf = [0u8; CHUNK];
    let mut compared = 0;
    while compared < size {
        let n = core::cmp::min(CHUNK, size - compared);
        hal.read_bytes(payload_offset + compared, &mut buf[..n]);
        if buf[..n] != data[compared..compared + n] {
            return false;
        }
        compared += n;
    }
    true
}
