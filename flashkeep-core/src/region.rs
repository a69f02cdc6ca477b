//! Flash region accessor
//!
//! Wraps a raw [`FlashDevice`] and a [`SafeExecution`] context. Reads go
//! straight to the device. Erase and program are checked up front and then
//! run with every other execution context suspended.

use flashkeep_hal::flash::is_aligned;
use flashkeep_hal::{FlashDevice, FlashError, SafeExecution};

/// Checked access to a flash array
///
/// Precondition failures (misalignment, out of range, busy controller) are
/// reported before the execution context is suspended.
pub struct FlashRegion<D, X> {
    device: D,
    exec: X,
}

impl<D: FlashDevice, X: SafeExecution> FlashRegion<D, X> {
    pub fn new(device: D, exec: X) -> Self {
        Self { device, exec }
    }

    /// Read `buf.len()` bytes at `offset`
    pub fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.device.read(offset, buf)
    }

    /// Erase the sector starting at `offset`
    ///
    /// `offset` must be aligned to the device's erase unit.
    ///
    /// Destroys the whole sector, not just the bytes a caller cares about.
    pub fn erase_sector(&mut self, offset: u32) -> Result<(), FlashError> {
        if !is_aligned(offset, D::ERASE_SIZE) {
            return Err(FlashError::Misaligned);
        }
        self.device.check_bounds(offset, D::ERASE_SIZE)?;
        self.ensure_idle()?;

        let Self { device, exec } = self;
        exec.run(|cx| device.erase_sector(cx, offset))
    }

    /// Program one write unit at `offset`
    ///
    /// The page must have been erased since it was last programmed.
    pub fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        if !is_aligned(offset, D::WRITE_SIZE) {
            return Err(FlashError::Misaligned);
        }
        if data.len() != D::WRITE_SIZE {
            return Err(FlashError::InvalidLength);
        }
        self.device.check_bounds(offset, D::WRITE_SIZE)?;
        self.ensure_idle()?;

        let Self { device, exec } = self;
        exec.run(|cx| device.program_page(cx, offset, data))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn exec(&self) -> &X {
        &self.exec
    }

    /// Give back the device and execution context
    pub fn into_parts(self) -> (D, X) {
        (self.device, self.exec)
    }

    fn ensure_idle(&self) -> Result<(), FlashError> {
        if self.device.is_busy() {
            return Err(FlashError::Busy);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimExecution, SimFlash, SimOp};
    use flashkeep_hal::{ERASED_BYTE, PAGE_SIZE};
    use proptest::prelude::*;

    const OFFSET: u32 = 0x80000;

    fn region() -> FlashRegion<SimFlash, SimExecution> {
        FlashRegion::new(SimFlash::new(), SimExecution::default())
    }

    #[test]
    fn test_read_is_unaligned() {
        let region = region();
        let mut buf = [0u8; 7];
        region.read(OFFSET + 3, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 7]);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let region = region();
        let capacity = region.device().capacity();
        let mut buf = [0u8; 4];
        assert_eq!(
            region.read(capacity - 2, &mut buf),
            Err(FlashError::OutOfBounds)
        );
    }

    #[test]
    fn test_erase_misaligned_does_not_suspend() {
        let mut region = region();
        assert_eq!(
            region.erase_sector(OFFSET + 0x100),
            Err(FlashError::Misaligned)
        );
        assert_eq!(region.exec().suspends(), 0);
        assert!(region.device().ops().is_empty());
    }

    #[test]
    fn test_geometry_follows_device() {
        assert_eq!(<SimFlash as FlashDevice>::ERASE_SIZE, 4096);
        assert_eq!(<&mut SimFlash as FlashDevice>::WRITE_SIZE, PAGE_SIZE);

        let mut region = region();
        // Write-aligned but not erase-aligned
        assert_eq!(
            region.erase_sector(OFFSET + SimFlash::WRITE_SIZE as u32),
            Err(FlashError::Misaligned)
        );
        assert!(region
            .program(OFFSET + SimFlash::WRITE_SIZE as u32, &[0u8; PAGE_SIZE])
            .is_ok());
    }

    #[test]
    fn test_erase_past_end() {
        let mut region = region();
        let capacity = region.device().capacity();
        assert_eq!(region.erase_sector(capacity), Err(FlashError::OutOfBounds));
    }

    #[test]
    fn test_program_misaligned() {
        let mut region = region();
        let page = [0u8; PAGE_SIZE];
        assert_eq!(region.program(OFFSET + 4, &page), Err(FlashError::Misaligned));
    }

    #[test]
    fn test_program_wrong_length() {
        let mut region = region();
        let short = [0u8; PAGE_SIZE - 1];
        assert_eq!(
            region.program(OFFSET, &short),
            Err(FlashError::InvalidLength)
        );
        assert_eq!(region.exec().suspends(), 0);
    }

    #[test]
    fn test_busy_controller_is_rejected() {
        let mut region = region();
        region.device_mut().set_busy(true);

        assert_eq!(region.erase_sector(OFFSET), Err(FlashError::Busy));
        assert_eq!(
            region.program(OFFSET, &[0u8; PAGE_SIZE]),
            Err(FlashError::Busy)
        );
        assert_eq!(region.exec().suspends(), 0);
    }

    #[test]
    fn test_erase_then_program_runs_suspended() {
        let mut region = region();
        let mut page = [ERASED_BYTE; PAGE_SIZE];
        page[..4].copy_from_slice(b"page");

        region.erase_sector(OFFSET).unwrap();
        region.program(OFFSET, &page).unwrap();

        assert_eq!(region.exec().suspends(), 2);
        assert!(region.exec().is_balanced());
        assert_eq!(
            region.device().ops(),
            &[SimOp::Erase(OFFSET), SimOp::Program(OFFSET)]
        );

        let mut back = [0u8; 4];
        region.read(OFFSET, &mut back).unwrap();
        assert_eq!(&back, b"page");
    }

    #[test]
    fn test_program_over_programmed_bytes_is_flagged() {
        let mut region = region();
        let page = [0x00; PAGE_SIZE];

        region.erase_sector(OFFSET).unwrap();
        region.program(OFFSET, &page).unwrap();

        assert_eq!(region.program(OFFSET, &page), Err(FlashError::NotErased));
        // The guard still restored execution on the error path
        assert!(region.exec().is_balanced());
        assert_eq!(region.exec().suspends(), 3);
    }

    #[test]
    fn test_erase_clears_whole_sector() {
        let mut region = region();
        region.device_mut().load(OFFSET + 0x800, &[0x12, 0x34]);

        region.erase_sector(OFFSET).unwrap();

        let mut buf = [0u8; 2];
        region.read(OFFSET + 0x800, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 2]);
    }

    #[test]
    fn test_hardware_fault_restores_execution() {
        let mut region = region();
        region.device_mut().fail_next_program();

        region.erase_sector(OFFSET).unwrap();
        assert_eq!(
            region.program(OFFSET, &[0u8; PAGE_SIZE]),
            Err(FlashError::Hardware)
        );
        assert!(region.exec().is_balanced());
    }

    proptest! {
        #[test]
        fn prop_program_read_round_trip(
            page_index in 0u32..16,
            data in proptest::collection::vec(any::<u8>(), PAGE_SIZE),
        ) {
            let mut region = region();
            let offset = OFFSET + page_index * PAGE_SIZE as u32;

            region.erase_sector(OFFSET).unwrap();
            region.program(offset, &data).unwrap();

            let mut back = [0u8; PAGE_SIZE];
            region.read(offset, &mut back).unwrap();
            prop_assert_eq!(&back[..], &data[..]);
        }
    }
}
