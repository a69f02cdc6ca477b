//! Flash device abstractions
//!
//! Provides the raw NOR flash interface that chip-specific HALs implement.
//!
//! # Flash Characteristics
//!
//! - Flash is organized in sectors (the erase unit) and pages (the program unit)
//! - Erasing sets every byte of a sector to [`ERASED_BYTE`]
//! - Programming can only clear bits; a programmed byte needs an erase to
//!   return to [`ERASED_BYTE`]
//! - The array is not readable while an erase or program is running

use crate::exec::Suspended;

/// Smallest region that can be erased in one operation
pub const SECTOR_SIZE: u32 = 4096;

/// Smallest region that can be written in one programming operation
pub const PAGE_SIZE: usize = 256;

/// Value of every byte in a freshly erased sector
pub const ERASED_BYTE: u8 = 0xFF;

/// Errors from flash device operations
///
/// None of these are transient. They describe a programming error or a
/// hardware defect, so callers are not expected to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Another flash operation is already in flight
    Busy,
    /// Offset is not aligned to the erase or program unit
    Misaligned,
    /// Access extends past the end of the flash array
    OutOfBounds,
    /// Program data is not exactly one page
    InvalidLength,
    /// Program target contains bytes that are not erased
    NotErased,
    /// The device reported a fault
    Hardware,
}

// A page never straddles two sectors
const _: () = assert!(SECTOR_SIZE as usize % PAGE_SIZE == 0);

/// Check whether `offset` is a multiple of `unit`
pub const fn is_aligned(offset: u32, unit: usize) -> bool {
    offset as usize % unit == 0
}

/// Round `offset` down to the start of its `unit`
pub const fn align_down(offset: u32, unit: usize) -> u32 {
    offset - (offset as usize % unit) as u32
}

/// Raw flash device
///
/// Offsets are relative to the start of the flash array, not to the
/// memory-mapped address. Implementations handle the translation.
///
/// Erase and program take a [`Suspended`] token. The token only exists
/// inside a [`SafeExecution`](crate::exec::SafeExecution) scope, so a
/// mutating call cannot be made while other contexts are still running.
pub trait FlashDevice {
    /// Program granularity; `program_page` takes exactly this many bytes
    const WRITE_SIZE: usize;

    /// Erase granularity
    const ERASE_SIZE: usize;

    /// Total size of the flash array in bytes
    fn capacity(&self) -> u32;

    /// Whether the controller is currently executing an operation
    fn is_busy(&self) -> bool;

    /// Read `buf.len()` bytes starting at `offset`
    ///
    /// No alignment constraints.
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Erase the sector starting at `offset`
    ///
    /// `offset` must be aligned to [`ERASE_SIZE`](Self::ERASE_SIZE).
    fn erase_sector(&mut self, cx: &Suspended, offset: u32) -> Result<(), FlashError>;

    /// Program one page at `offset`
    ///
    /// `offset` must be aligned to [`WRITE_SIZE`](Self::WRITE_SIZE) and
    /// `data` exactly that long.
    /// The target bytes must be erased.
    fn program_page(
        &mut self,
        cx: &Suspended,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError>;

    /// Check that `len` bytes at `offset` lie inside the array
    fn check_bounds(&self, offset: u32, len: usize) -> Result<(), FlashError> {
        let end = offset as u64 + len as u64;
        if end > self.capacity() as u64 {
            return Err(FlashError::OutOfBounds);
        }
        Ok(())
    }
}

impl<T: FlashDevice + ?Sized> FlashDevice for &mut T {
    const WRITE_SIZE: usize = T::WRITE_SIZE;
    const ERASE_SIZE: usize = T::ERASE_SIZE;

    fn capacity(&self) -> u32 {
        T::capacity(self)
    }

    fn is_busy(&self) -> bool {
        T::is_busy(self)
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        T::read(self, offset, buf)
    }

    fn erase_sector(&mut self, cx: &Suspended, offset: u32) -> Result<(), FlashError> {
        T::erase_sector(self, cx, offset)
    }

    fn program_page(
        &mut self,
        cx: &Suspended,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError> {
        T::program_page(self, cx, offset, data)
    }
}
