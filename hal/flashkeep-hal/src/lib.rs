//! Flashkeep Hardware Abstraction Layer
//!
//! This crate defines the seams between the board-agnostic record store
//! and chip-specific flash drivers. The same store logic runs against the
//! RP2040 driver on target and against a simulator on the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  flashkeep-firmware / flashkeep-core    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  flashkeep-hal (this crate - traits)    │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ flashkeep-hal-│       │ flashkeep-core│
//! │    rp2040     │       │   ::sim       │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::FlashDevice`] - Raw NOR flash read / erase / program
//! - [`exec::SafeExecution`] - Suspending other execution contexts while
//!   the flash array is unavailable

#![no_std]
#![deny(unsafe_code)]

pub mod exec;
pub mod flash;

// Re-export key traits at crate root for convenience
pub use exec::{SafeExecution, SuspendGuard, Suspended};
pub use flash::{FlashDevice, FlashError, ERASED_BYTE, PAGE_SIZE, SECTOR_SIZE};
