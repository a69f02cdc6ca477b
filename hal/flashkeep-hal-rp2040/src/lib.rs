//! RP2040-specific HAL for Flashkeep
//!
//! This crate provides RP2040 implementations of the shared
//! `flashkeep-hal` traits:
//!
//! - Flash device over the XIP window and the boot ROM routines
//!   (implements `flashkeep_hal::FlashDevice`)
//! - Safe execution context that parks core1 and masks interrupts
//!   (implements `flashkeep_hal::SafeExecution`)

#![no_std]

pub mod exec;
pub mod flash;

pub use exec::Core1Parking;
pub use flash::Rp2040Flash;

// Re-export shared traits from flashkeep-hal for convenience
pub use flashkeep_hal::{FlashDevice, SafeExecution};
