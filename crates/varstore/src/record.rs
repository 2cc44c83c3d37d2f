//! On-flash record header codec.
//!
//! Layout, in order: `id: W`, `size: W`, `status: W`, then `size` bytes of
//! payload. Programming order matters: a crash between any two header words
//! leaves a half-staged header that a later scan can always classify as
//! either end-of-log or corrupt (see [`crate::page`]'s bounds check).

use crate::hal::Flash;
use crate::word::Word;

/// Header fields read back from flash, plus the offset they live at.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Header<W> {
    /// Absolute byte offset of this header within the flash address space.
    pub offset: usize,
    pub id: W,
    /// Payload length in bytes, decoded from `size_word`.
    pub size: usize,
    /// The raw `size` word as read from flash, before decoding. Kept
    /// alongside `size` so the scanner can tell a fully-erased size
    /// (`~0`, meaning "header half-staged, crash before `size` was
    /// programmed") apart from a committed size of `0`.
    pub size_word: W,
    pub status: W,
}

/// Number of header words: `id`, `size`, `status`.
pub(crate) const HEADER_WORDS: usize = 3;

/// Header size in bytes for a given word width.
pub(crate) fn header_size<W: Word>() -> usize {
    HEADER_WORDS * W::SIZE
}

impl<W: Word> Header<W> {
    /// Total bytes this record occupies, header included.
    pub fn record_size(&self) -> usize {
        header_size::<W>() + self.size
    }

    /// Offset immediately past this record.
    pub fn next_offset(&self) -> usize {
        self.offset + self.record_size()
    }

    /// Offset of this record's payload.
    pub fn payload_offset(&self) -> usize {
        self.offset + header_size::<W>()
    }

    /// `id ∉ {0, ~0}` and `status == WRITTEN`.
    pub fn is_live(&self) -> bool {
        self.id != W::WRITTEN && self.id != W::ERASED && self.status == W::WRITTEN
    }

    /// `id == 0`.
    pub fn is_tombstone(&self) -> bool {
        self.id == W::WRITTEN
    }

    /// `id ∉ {0, ~0}` but `status == EMPTY` (header committed, payload not).
    pub fn is_reserved(&self) -> bool {
        self.id != W::WRITTEN && self.id != W::ERASED && self.status == W::ERASED
    }

    /// The implicit end-of-log sentinel: an untouched header slot, *or* a
    /// header whose `id` was programmed but crashed before `size` was. The
    /// latter is treated as the tail (conservative) rather than as
    /// corruption, since the whole tail region is erased and about to be
    /// overwritten anyway.
    pub fn is_end_of_log(&self) -> bool {
        self.id == W::ERASED || self.size_word == W::ERASED
    }
}

/// Read the header at `offset`. Does not validate bounds; callers check
/// `offset + header_size::<W>() <= usable_end` first.
pub(crate) fn read_header<W: Word, F: Flash<W>>(hal: &F, offset: usize) -> Header<W> {
    let word = W::SIZE;
    let id = hal.read_word(offset);
    let size_word = hal.read_word(offset + word);
    let status = hal.read_word(offset + 2 * word);
    Header {
        offset,
        id,
        size: size_to_bytes::<W>(size_word),
        size_word,
        status,
    }
}

fn size_to_bytes<W: Word>(size_word: W) -> usize {
    // `size` is itself a native word holding a byte count; widen through the
    // byte representation so this works uniformly for u16 and u32 words.
    let mut buf = [0u8; 4];
    size_word.to_le_bytes(&mut buf[..W::SIZE]);
    u32::from_le_bytes(buf) as usize
}

fn bytes_to_size_word<W: Word>(size: usize) -> W {
    let widened = (size as u32).to_le_bytes();
    W::from_le_bytes(&widened[..W::SIZE])
}

/// Stage a new header at `offset`: program `id`, then `size`, then
/// `status = EMPTY`, in that order, under one `begin_write`/`end_write`
/// envelope on `page_base`.
pub(crate) fn stage_header<W: Word, F: Flash<W>>(
    hal: &mut F,
    page_base: usize,
    offset: usize,
    id: W,
    size: usize,
) -> Result<(), F::Error> {
    hal.begin_write(page_base)?;
    hal.program_word(offset, id)?;
    hal.program_word(offset + W::SIZE, bytes_to_size_word::<W>(size))?;
    hal.program_word(offset + 2 * W::SIZE, W::ERASED)?;
    hal.end_write(page_base)
}

/// Program `status = WRITTEN` at `header_offset`, committing a
/// previously-staged header.
pub(crate) fn commit_header<W: Word, F: Flash<W>>(
    hal: &mut F,
    page_base: usize,
    header_offset: usize,
) -> Result<(), F::Error> {
    hal.begin_write(page_base)?;
    hal.program_word(header_offset + 2 * W::SIZE, W::WRITTEN)?;
    hal.end_write(page_base)
}

/// Program `id = 0` at `header_offset`, tombstoning a live record. Always
/// legal: any non-zero id has at least one `1` bit that can be driven to `0`.
pub(crate) fn tombstone<W: Word, F: Flash<W>>(
    hal: &mut F,
    page_base: usize,
    header_offset: usize,
) -> Result<(), F::Error> {
    hal.begin_write(page_base)?;
    hal.program_word(header_offset, W::WRITTEN)?;
    hal.end_write(page_base)
}

/// Stream `data` into the payload slot belonging to the header at
/// `header_offset`, then commit it.
pub(crate) fn fill_and_commit<W: Word, F: Flash<W>>(
    hal: &mut F,
    page_base: usize,
    header_offset: usize,
    data: &[u8],
) -> Result<(), F::Error> {
    hal.begin_write(page_base)?;
    hal.program_bytes(header_offset + header_size::<W>(), data)?;
    hal.program_word(header_offset + 2 * W::SIZE, W::WRITTEN)?;
    hal.end_write(page_base)
}
