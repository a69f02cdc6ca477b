//! Board-agnostic flash record store
//!
//! This crate contains everything about the persisted credentials record
//! that does not depend on a specific chip:
//!
//! - Record layout and sentinel validation
//! - Flash region accessor (alignment, busy checks, safe execution)
//! - Record store boot lifecycle (load, validate, initialize, verify)
//! - Flash simulator for host-side testing

#![no_std]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod record;
pub mod region;
#[cfg(any(test, feature = "std"))]
pub mod sim;
pub mod store;

pub use record::{BoundedText, LayoutError, Record, RECORD_MAGIC, RECORD_SIZE};
pub use region::FlashRegion;
pub use store::{BootOutcome, InitCause, RecordStore, StoreError};
