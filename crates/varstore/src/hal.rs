//! The flash HAL boundary the core depends on.
//!
//! This crate never ships a concrete MCU backend. Binding a `Flash` impl to
//! real STM32/EFM32/etc. registers is explicitly out of scope, the same way
//! `stm32_hal::flash::Flash` is depended on without knowing about
//! `stm32f1::stm32f103::FLASH`'s register layout. Addresses here are plain
//! `usize` byte offsets rather than raw pointers, so a `Flash` impl can be
//! backed by a `Vec<u8>` on a host for testing just as well as by
//! memory-mapped flash on a target.

use crate::word::Word;

/// Four operations the write and roll engines consume, plus infallible
/// reads. Every fallible call is bracketed by a `begin_write`/`end_write`
/// envelope by the caller when it is about to `program_word`/`program_bytes`;
/// `erase_page` stands on its own.
pub trait Flash<W: Word> {
    /// HAL-specific failure (bus fault, programming rejected, timeout...).
    type Error: core::fmt::Debug;

    /// Enter programming mode for the page starting at `page_base`. Must be
    /// paired with a later [`Flash::end_write`] on the same `page_base`.
    fn begin_write(&mut self, page_base: usize) -> Result<(), Self::Error>;

    /// Leave programming mode for the page starting at `page_base`.
    fn end_write(&mut self, page_base: usize) -> Result<(), Self::Error>;

    /// Program one native word at `addr`. Must be called within a
    /// `begin_write`/`end_write` envelope. Implementations should reject the
    /// call if `W::can_program_to` would be violated.
    fn program_word(&mut self, addr: usize, value: W) -> Result<(), Self::Error>;

    /// Program `src.len()` bytes starting at `addr`; `src.len()` is always a
    /// multiple of `W::SIZE`. The default implementation is a sequence of
    /// [`Flash::program_word`] calls; a backend may override this with a
    /// real bulk-write call.
    fn program_bytes(&mut self, addr: usize, src: &[u8]) -> Result<(), Self::Error> {
        debug_assert_eq!(src.len() % W::SIZE, 0);
        for (i, chunk) in src.chunks(W::SIZE).enumerate() {
            let word = W::from_le_bytes(chunk);
            self.program_word(addr + i * W::SIZE, word)?;
        }
        Ok(())
    }

    /// Erase the whole page starting at `page_base` back to `~0`.
    fn erase_page(&mut self, page_base: usize) -> Result<(), Self::Error>;

    /// Read one native word at `addr`. Flash is memory-mapped and directly
    /// legible; this never fails and needs no programming envelope.
    fn read_word(&self, addr: usize) -> W;

    /// Read `dst.len()` bytes starting at `addr`.
    fn read_bytes(&self, addr: usize, dst: &mut [u8]);
}
