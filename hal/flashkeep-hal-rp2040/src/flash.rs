//! Flash device for RP2040
//!
//! Reads go straight through the XIP window. Erase and program call the
//! boot ROM routines via `rp2040-flash`, which run the sequence from RAM
//! and re-enter XIP through boot2 before returning.
//!
//! Implements the `FlashDevice` trait from `flashkeep-hal`.

use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use portable_atomic::{AtomicBool, Ordering};

// Re-export shared types from flashkeep-hal
pub use flashkeep_hal::flash::{FlashDevice, FlashError, PAGE_SIZE, SECTOR_SIZE};
use flashkeep_hal::flash::is_aligned;
use flashkeep_hal::Suspended;

/// Flash size on the Pico board
pub const FLASH_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Base of the execute-in-place window
pub const XIP_BASE: usize = 0x1000_0000;

// The record store sizes its sector from the shared geometry
const _: () = assert!(embassy_rp::flash::ERASE_SIZE == SECTOR_SIZE as usize);

/// Set while an erase or program is running
///
/// There is one flash array per chip, so this is shared by every
/// `Rp2040Flash` instance.
static OPERATION_IN_FLIGHT: AtomicBool = AtomicBool::new(false);

/// RP2040 flash device
///
/// Holds the FLASH peripheral so no other driver can touch the array
/// while this one exists.
pub struct Rp2040Flash<'d> {
    _flash: Peri<'d, FLASH>,
}

impl<'d> Rp2040Flash<'d> {
    /// Claim the flash peripheral
    pub fn new(flash: Peri<'d, FLASH>) -> Self {
        Self { _flash: flash }
    }

    /// Mark an operation as started, or report that one already is
    fn begin(&self) -> Result<InFlight, FlashError> {
        if OPERATION_IN_FLIGHT.swap(true, Ordering::AcqRel) {
            return Err(FlashError::Busy);
        }
        Ok(InFlight)
    }
}

/// Clears the in-flight flag on drop
struct InFlight;

impl Drop for InFlight {
    fn drop(&mut self) {
        OPERATION_IN_FLIGHT.store(false, Ordering::Release);
    }
}

impl FlashDevice for Rp2040Flash<'_> {
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = embassy_rp::flash::ERASE_SIZE;

    fn capacity(&self) -> u32 {
        FLASH_SIZE as u32
    }

    fn is_busy(&self) -> bool {
        OPERATION_IN_FLIGHT.load(Ordering::Acquire)
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_bounds(offset, buf.len())?;

        let src = (XIP_BASE + offset as usize) as *const u8;

        // SAFETY: the range was bounds-checked against the array size, the
        // XIP window maps the whole array, and `&self` cannot coexist with
        // the `&mut self` held by an erase or program.
        unsafe {
            core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len());
        }

        Ok(())
    }

    fn erase_sector(&mut self, _cx: &Suspended, offset: u32) -> Result<(), FlashError> {
        if !is_aligned(offset, Self::ERASE_SIZE) {
            return Err(FlashError::Misaligned);
        }
        self.check_bounds(offset, Self::ERASE_SIZE)?;

        let _busy = self.begin()?;

        // SAFETY: `_cx` proves core1 is parked and interrupts are masked,
        // so nothing fetches from flash while XIP is down. The routine
        // itself executes from RAM.
        unsafe {
            rp2040_flash::flash::flash_range_erase(offset, Self::ERASE_SIZE as u32, true);
        }

        Ok(())
    }

    fn program_page(
        &mut self,
        _cx: &Suspended,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError> {
        if !is_aligned(offset, Self::WRITE_SIZE) {
            return Err(FlashError::Misaligned);
        }
        if data.len() != Self::WRITE_SIZE {
            return Err(FlashError::InvalidLength);
        }
        self.check_bounds(offset, Self::WRITE_SIZE)?;

        let _busy = self.begin()?;

        // SAFETY: as for erase. `data` lives in RAM (it is a stack buffer
        // in the caller), never in the flash array being programmed.
        unsafe {
            rp2040_flash::flash::flash_range_program(offset, data, true);
        }

        Ok(())
    }
}
