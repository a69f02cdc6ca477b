//! Flash simulator for host-side testing
//!
//! Models NOR flash closely enough to catch ordering bugs. Erase sets a
//! sector to `0xFF`, and programming a page that is not fully erased is
//! rejected instead of silently AND-ing bits together.
//!
//! Fault injection covers the failure modes the store has to survive:
//! a busy controller, a program that never lands (power loss after the
//! erase), and a program that lands with a flipped bit.

use std::vec;
use std::vec::Vec;

use flashkeep_hal::flash::is_aligned;
use flashkeep_hal::{
    FlashDevice, FlashError, SafeExecution, Suspended, ERASED_BYTE, PAGE_SIZE, SECTOR_SIZE,
};

/// Capacity of the simulated part (same as the Pico)
pub const SIM_CAPACITY: u32 = 2 * 1024 * 1024;

/// A mutating operation that reached the simulated array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    Erase(u32),
    Program(u32),
}

/// In-memory NOR flash
#[derive(Debug)]
pub struct SimFlash {
    data: Vec<u8>,
    ops: Vec<SimOp>,
    busy: bool,
    fail_next_program: bool,
    corrupt_next_program: Option<usize>,
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFlash {
    /// Fully erased part of [`SIM_CAPACITY`] bytes
    pub fn new() -> Self {
        Self::with_capacity(SIM_CAPACITY)
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            data: vec![ERASED_BYTE; capacity as usize],
            ops: Vec::new(),
            busy: false,
            fail_next_program: false,
            corrupt_next_program: None,
        }
    }

    /// Raw view of the array
    pub fn contents(&self, offset: u32, len: usize) -> &[u8] {
        &self.data[offset as usize..offset as usize + len]
    }

    /// Overwrite bytes directly, bypassing erase/program rules
    ///
    /// Used to seed garbage or records from a previous firmware.
    pub fn load(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Every erase and program that reached the array, in order
    pub fn ops(&self) -> &[SimOp] {
        &self.ops
    }

    pub fn erase_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SimOp::Erase(_)))
            .count()
    }

    pub fn program_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SimOp::Program(_)))
            .count()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Report the controller as busy until cleared
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Make the next program fail without writing anything
    pub fn fail_next_program(&mut self) {
        self.fail_next_program = true;
    }

    /// Flip the low bit of byte `index` of the next programmed page
    pub fn corrupt_next_program(&mut self, index: usize) {
        self.corrupt_next_program = Some(index);
    }
}

impl FlashDevice for SimFlash {
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = SECTOR_SIZE as usize;

    fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_bounds(offset, buf.len())?;
        buf.copy_from_slice(self.contents(offset, buf.len()));
        Ok(())
    }

    fn erase_sector(&mut self, _cx: &Suspended, offset: u32) -> Result<(), FlashError> {
        if self.busy {
            return Err(FlashError::Busy);
        }
        if !is_aligned(offset, Self::ERASE_SIZE) {
            return Err(FlashError::Misaligned);
        }
        self.check_bounds(offset, Self::ERASE_SIZE)?;

        let start = offset as usize;
        self.data[start..start + Self::ERASE_SIZE].fill(ERASED_BYTE);
        self.ops.push(SimOp::Erase(offset));
        Ok(())
    }

    fn program_page(
        &mut self,
        _cx: &Suspended,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError> {
        if self.busy {
            return Err(FlashError::Busy);
        }
        if !is_aligned(offset, Self::WRITE_SIZE) {
            return Err(FlashError::Misaligned);
        }
        if data.len() != Self::WRITE_SIZE {
            return Err(FlashError::InvalidLength);
        }
        self.check_bounds(offset, Self::WRITE_SIZE)?;

        if core::mem::take(&mut self.fail_next_program) {
            return Err(FlashError::Hardware);
        }

        let start = offset as usize;
        let target = &mut self.data[start..start + Self::WRITE_SIZE];
        if target.iter().any(|&b| b != ERASED_BYTE) {
            return Err(FlashError::NotErased);
        }

        target.copy_from_slice(data);
        if let Some(index) = self.corrupt_next_program.take() {
            target[index] ^= 0x01;
        }

        self.ops.push(SimOp::Program(offset));
        Ok(())
    }
}

/// Execution context that only counts
///
/// Lets tests check that every suspend was paired with a resume.
#[derive(Debug, Default)]
pub struct SimExecution {
    suspends: u32,
    resumes: u32,
    depth: u32,
}

impl SimExecution {
    pub fn suspends(&self) -> u32 {
        self.suspends
    }

    pub fn resumes(&self) -> u32 {
        self.resumes
    }

    /// Whether execution is currently suspended
    pub fn is_suspended(&self) -> bool {
        self.depth > 0
    }

    /// No suspension is outstanding
    pub fn is_balanced(&self) -> bool {
        self.suspends == self.resumes && self.depth == 0
    }
}

impl SafeExecution for SimExecution {
    /// Depth before this suspension
    type State = u32;

    fn suspend(&mut self) -> u32 {
        let previous = self.depth;
        self.suspends += 1;
        self.depth += 1;
        previous
    }

    fn resume(&mut self, state: u32) {
        self.resumes += 1;
        self.depth = state;
    }
}
