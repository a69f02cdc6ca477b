//! Flashkeep - persistent credentials for RP2040
//!
//! Main firmware binary. On boot it loads the credentials record from
//! flash, writing and verifying the configured defaults if the stored
//! record is missing or invalid, then hands a read-only snapshot to the
//! heartbeat task.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::gpio::{Level, Output};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use flashkeep_core::{BootOutcome, FlashRegion, Record, RecordStore};
use flashkeep_hal_rp2040::{Core1Parking, Rp2040Flash};

mod config;
mod tasks;

// The record snapshot outlives main's stack frame
static RECORD: StaticCell<Record> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Flashkeep firmware starting...");

    // Initialize RP2040 peripherals
    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Flash work happens before any other task exists
    let record = load_record(Rp2040Flash::new(p.FLASH));
    let record: &'static Record = RECORD.init(record);

    // Pin assignment is board-specific (LED on GPIO14)
    let led = Output::new(p.PIN_14, Level::Low);

    spawner
        .spawn(tasks::heartbeat_task(led, record, config::HEARTBEAT_PERIOD_MS))
        .unwrap();

    info!("All tasks spawned, firmware running");
}

/// Run the record store boot sequence
///
/// Any store error halts here. Nothing downstream can run without a
/// verified record, and retrying a flash fault does not help.
fn load_record(flash: Rp2040Flash<'static>) -> Record {
    info!(
        "Record region at {:#x} (image limit {:#x})",
        config::RECORD_OFFSET,
        config::FIRMWARE_LIMIT
    );

    let defaults = match Record::with_credentials(config::DEFAULT_SSID, config::DEFAULT_PASSWORD) {
        Ok(record) => record,
        Err(e) => defmt::panic!("Invalid default credentials: {:?}", e),
    };

    let region = FlashRegion::new(flash, Core1Parking::new());

    match RecordStore::boot(region, config::RECORD_OFFSET, defaults) {
        Ok((store, outcome)) => {
            match outcome {
                BootOutcome::Loaded => info!("Loaded record from flash"),
                BootOutcome::Initialized(cause) => {
                    warn!("No valid record in flash ({:?}), wrote defaults", cause)
                }
            }
            log_record_summary(store.record());
            store.get_record()
        }
        Err(e) => {
            error!("Record store failed at {:#x}", config::RECORD_OFFSET);
            defmt::panic!("Flash record store error: {:?}", e)
        }
    }
}

/// Log a summary of the record
fn log_record_summary(record: &Record) {
    info!("Record valid (magic {:#x})", record.magic);
    debug!("  ssid: \"{}\"", record.ssid.as_str());
    debug!("  password: {} bytes", record.password.len());
}
