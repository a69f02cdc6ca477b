//! Record store boot lifecycle
//!
//! ```text
//!  Start ──read──▶ magic ok? ──yes──▶ Valid (Loaded)
//!                     │
//!                     no
//!                     ▼
//!               Initializing: erase ▶ program ▶ read back ▶ Valid (Initialized)
//! ```
//!
//! The sentinel is the only gate. A record that carries it is never
//! rewritten, even if its text fields are malformed; those are decoded
//! as far as they go.
//!
//! A failed persist leaves the sector erased, so the next boot lands in
//! `Initialized(Blank)` and tries again.

use flashkeep_hal::flash::{align_down, is_aligned};
use flashkeep_hal::{FlashDevice, FlashError, SafeExecution};

use crate::record::{self, Record, RECORD_MAGIC, RECORD_SIZE};
use crate::region::FlashRegion;

/// Why the store had to write a fresh record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitCause {
    /// Record area was fully erased (first boot or interrupted write)
    Blank,
    /// Something other than our sentinel was stored there
    MagicMismatch,
}

/// How the boot sequence reached the valid state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootOutcome {
    /// A valid record was already in flash
    Loaded,
    /// Defaults were written and verified
    Initialized(InitCause),
}

/// Record store errors
///
/// All of these are fatal for the boot sequence. A missing record is not
/// an error; it shows up as [`BootOutcome::Initialized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Flash accessor rejected or failed an operation
    Flash(FlashError),
    /// Read-back after persist did not match what was written
    VerifyMismatch,
}

impl From<FlashError> for StoreError {
    fn from(e: FlashError) -> Self {
        StoreError::Flash(e)
    }
}

/// Owner of the persisted record
///
/// Holds the only in-memory copy for the lifetime of the process.
pub struct RecordStore<D, X> {
    region: FlashRegion<D, X>,
    offset: u32,
    record: Record,
}

impl<D: FlashDevice, X: SafeExecution> RecordStore<D, X> {
    /// Load the record at `offset`, writing `defaults` if none is valid
    ///
    /// `offset` must be aligned to the device's write unit. `defaults` gets
    /// the sentinel regardless of its `magic`.
    pub fn boot(
        region: FlashRegion<D, X>,
        offset: u32,
        defaults: Record,
    ) -> Result<(Self, BootOutcome), StoreError> {
        check_offset::<D>(offset)?;

        let mut raw = [0u8; RECORD_SIZE];
        region.read(offset, &mut raw)?;

        if record::is_valid(&raw) {
            let store = Self {
                region,
                offset,
                record: Record::decode_lossy(&raw),
            };
            return Ok((store, BootOutcome::Loaded));
        }

        let cause = if record::is_erased(&raw) {
            InitCause::Blank
        } else {
            InitCause::MagicMismatch
        };

        let mut store = Self {
            region,
            offset,
            record: Record {
                magic: RECORD_MAGIC,
                ..defaults
            },
        };
        store.persist()?;
        store.verify()?;

        Ok((store, BootOutcome::Initialized(cause)))
    }

    /// Borrow the record
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Snapshot of the record
    pub fn get_record(&self) -> Record {
        self.record.clone()
    }

    /// Flash offset of the record
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn region(&self) -> &FlashRegion<D, X> {
        &self.region
    }

    /// Consume the store, returning the region and the record
    pub fn into_parts(self) -> (FlashRegion<D, X>, Record) {
        (self.region, self.record)
    }

    /// Erase the record's sector and program the record page
    ///
    /// Both steps run every time: programmed bits cannot be set again
    /// without an erase.
    fn persist(&mut self) -> Result<(), StoreError> {
        let page = self.record.encode_page();

        self.region.erase_sector(align_down(self.offset, D::ERASE_SIZE))?;
        self.region.program(self.offset, &page)?;
        Ok(())
    }

    /// Read the record back and compare with what was written
    fn verify(&mut self) -> Result<(), StoreError> {
        let mut raw = [0u8; RECORD_SIZE];
        self.region.read(self.offset, &mut raw)?;

        if raw != self.record.encode() || !record::is_valid(&raw) {
            return Err(StoreError::VerifyMismatch);
        }

        let stored = Record::decode(&raw).map_err(|_| StoreError::VerifyMismatch)?;
        if stored != self.record {
            return Err(StoreError::VerifyMismatch);
        }

        self.record = stored;
        Ok(())
    }
}

/// The record page must start on a write unit
fn check_offset<D: FlashDevice>(offset: u32) -> Result<(), FlashError> {
    if !is_aligned(offset, D::WRITE_SIZE) {
        return Err(FlashError::Misaligned);
    }
    Ok(())
}
