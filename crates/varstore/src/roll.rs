//! Two-page rolling compaction.
//!
//! Precondition: `src_base` is active, `dst_base` is spare (fully erased).
//! Postcondition: `dst_base` holds a packed copy of `src_base`'s live
//! records in original order (barring `replace`, see below) and is marked
//! active; `src_base` is erased.
//!
//! `replace` lets a roll double as "compact and rewrite one record" in a
//! single pass: when given, the record matching `(id, size)` is left out of
//! the copy and a fresh record carrying `data` is appended to `dst_base`
//! instead, committed before `dst_base` is activated. This is what makes a
//! rewrite that needs a roll to free room crash-safe: `src_base` is never
//! touched until `dst_base` already holds the new value, so a crash at any
//! point before `dst_base` is activated leaves `src_base`'s original record
//! (old value, still live) as the sole readable copy, and a crash after
//! leaves `dst_base` (new value, fully committed) as a legitimate candidate
//! too. Tombstoning the old record before copying, by contrast, would throw
//! the old value away before the new one was durable anywhere.
//!
//! Crash atomicity: a crash before the destination's page-status word is
//! programmed leaves `src_base` still reading active, so the next
//! [`crate::VariableStore`] operation simply retries the roll from scratch.
//! A crash after it but before the erase leaves both pages reading active;
//! [`crate::block`]'s selector resolves that by preferring whichever page
//! has the larger live-byte sum, which is always the destination since it
//! holds a superset packed tighter than the source.

use crate::hal::Flash;
use crate::log::vs_log;
use crate::record::{self, header_size};
use crate::word::Word;

/// Bounded working buffer for streaming a payload from source to
/// destination during a roll. Keeps roll's stack usage independent of any
/// single record's payload size, with no heap allocation.
const COPY_CHUNK_BYTES: usize = 32;

pub(crate) fn roll<W: Word, F: Flash<W>>(
    hal: &mut F,
    src_base: usize,
    dst_base: usize,
    usable_size: usize,
    replace: Option<(W, usize, &[u8])>,
) -> Result<(), F::Error> {
    vs_log!("varstore: rolling 0x{:x} -> 0x{:x}", src_base, dst_base);

    // Walked by hand rather than through `page::Scan`: that iterator holds
    // an immutable borrow of `hal` for its own lifetime, but each live
    // record here needs a `&mut hal` to copy into the destination page in
    // between reads of the source.
    let mut dst_offset = dst_base;
    let mut src_offset = src_base;
    loop {
        let header = record::read_header(hal, src_offset);
        if header.is_end_of_log() {
            break;
        }
        let next = header.next_offset();
        let is_replaced = matches!(replace, Some((id, size, _)) if header.id == id && header.size == size);
        if header.is_live() && !is_replaced {
            copy_record(hal, dst_base, dst_offset, src_offset, header.size)?;
            dst_offset += header_size::<W>() + header.size;
        }
        src_offset = next;
    }

    if let Some((id, size, data)) = replace {
        record::stage_header(hal, dst_base, dst_offset, id, size)?;
        record::fill_and_commit(hal, dst_base, dst_offset, data)?;
    }

    let dst_status_offset = dst_base + usable_size;
    hal.begin_write(dst_base)?;
    hal.program_word(dst_status_offset, W::WRITTEN)?;
    hal.end_write(dst_base)?;

    hal.erase_page(src_base)?;
    vs_log!("varstore: roll complete, erased 0x{:x}", src_base);
    Ok(())
}

fn copy_record<W: Word, F: Flash<W>>(
    hal: &mut F,
    dst_base: usize,
    dst_offset: usize,
    src_offset: usize,
    size: usize,
) -> Result<(), F::Error> {
    let header = record::read_header(hal, src_offset);
    record::stage_header(hal, dst_base, dst_offset, header.id, size)?;

    let src_payload = src_offset + header_size::<W>();
    let dst_payload = dst_offset + header_size::<W>();

    hal.begin_write(dst_base)?;
    let mut buf = [0u8; COPY_CHUNK_BYTES];
    let mut copied = 0;
    while copied < size {
        let n = core::cmp::min(COPY_CHUNK_BYTES, size - copied);
        hal.read_bytes(src_payload + copied, &mut buf[..n]);
        hal.program_bytes(dst_payload + copied, &buf[..n])?;
        copied += n;
    }
    hal.end_write(dst_base)?;

    record::commit_header(hal, dst_base, dst_offset)
}
