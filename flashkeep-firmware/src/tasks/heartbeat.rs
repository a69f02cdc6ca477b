//! Heartbeat task
//!
//! Blinks the board LED and periodically reports the stored record, so a
//! probe attached over RTT can see the firmware is alive and which
//! network it was provisioned for.

use defmt::*;
use embassy_rp::gpio::Output;
use embassy_time::{Duration, Ticker};

use flashkeep_core::Record;

/// Blink cycles between record reports
const REPORT_EVERY: u32 = 8;

/// Heartbeat task - toggles the LED every `period_ms`
#[embassy_executor::task]
pub async fn heartbeat_task(mut led: Output<'static>, record: &'static Record, period_ms: u64) {
    info!("Heartbeat task started ({} ms)", period_ms);

    let mut ticker = Ticker::every(Duration::from_millis(period_ms));
    let mut cycles: u32 = 0;

    loop {
        led.set_high();
        ticker.next().await;
        led.set_low();
        ticker.next().await;

        if cycles % REPORT_EVERY == 0 {
            info!(
                "Heartbeat: ssid=\"{}\", password={} bytes",
                record.ssid.as_str(),
                record.password.len()
            );
        }
        cycles = cycles.wrapping_add(1);
    }
}
