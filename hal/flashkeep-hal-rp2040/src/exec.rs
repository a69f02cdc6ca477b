//! Safe execution context for RP2040
//!
//! Core1 is parked through the embassy multicore FIFO handshake, then the
//! critical section masks interrupts on core0. Order is reversed on resume.

use critical_section::RestoreState;
use embassy_rp::multicore::{pause_core1, resume_core1};
use flashkeep_hal::SafeExecution;

/// Parks core1 and masks interrupts for the duration of a flash operation
///
/// If core1 was never started, the pause is a no-op and only the
/// interrupt mask applies. Must be used from core0.
#[derive(Debug, Default)]
pub struct Core1Parking {
    _private: (),
}

impl Core1Parking {
    /// Create the parking context
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl SafeExecution for Core1Parking {
    type State = RestoreState;

    fn suspend(&mut self) -> RestoreState {
        // Core1 needs interrupts to see the pause request, so park it first
        pause_core1();

        // SAFETY: paired with exactly one `release` in `resume`, which
        // `SuspendGuard` calls from `Drop`.
        unsafe { critical_section::acquire() }
    }

    fn resume(&mut self, state: RestoreState) {
        // SAFETY: `state` came from the matching `acquire` in `suspend`.
        unsafe { critical_section::release(state) };

        resume_core1();
    }
}
