//! Build script for flashkeep-firmware
//!
//! - Validates flashkeep.toml at compile time
//! - Generates memory.x so the image stays below the record region
//! - Renders the validated settings as Rust constants

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Erase unit of the on-board QSPI flash
const SECTOR_SIZE: i64 = 4096;

/// Flash size on the Pico board
const FLASH_SIZE: i64 = 2 * 1024 * 1024;

/// Second-stage bootloader occupies the start of flash
const BOOT2_SIZE: i64 = 0x100;

/// Text fields hold 40 bytes including the terminator
const MAX_TEXT_LEN: usize = 39;

/// Settings extracted from flashkeep.toml
struct Settings {
    firmware_limit: i64,
    record_offset: i64,
    ssid: String,
    password: String,
    period_ms: i64,
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let settings = validate_config();
    setup_linker(&out_dir, &settings);
    write_settings(&out_dir, &settings);
}

/// Write memory.x and set up linker arguments
fn setup_linker(out_dir: &Path, settings: &Settings) {
    let memory_x = format!(
        "MEMORY {{\n    \
            BOOT2 : ORIGIN = 0x10000000, LENGTH = {boot2:#x}\n    \
            FLASH : ORIGIN = 0x10000000 + {boot2:#x}, LENGTH = {flash:#x}\n    \
            RAM   : ORIGIN = 0x20000000, LENGTH = 256K\n\
        }}\n",
        boot2 = BOOT2_SIZE,
        flash = settings.firmware_limit - BOOT2_SIZE,
    );
    fs::write(out_dir.join("memory.x"), memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=build.rs");
}

/// Render the settings as constants for `src/config.rs`
fn write_settings(out_dir: &Path, settings: &Settings) {
    let source = format!(
        "/// End of the region reserved for the firmware image\n\
         pub const FIRMWARE_LIMIT: u32 = {:#x};\n\
         /// Flash offset of the credentials record\n\
         pub const RECORD_OFFSET: u32 = {:#x};\n\
         /// SSID written when no valid record exists\n\
         pub const DEFAULT_SSID: &str = {:?};\n\
         /// Password written when no valid record exists\n\
         pub const DEFAULT_PASSWORD: &str = {:?};\n\
         /// LED half-period\n\
         pub const HEARTBEAT_PERIOD_MS: u64 = {};\n",
        settings.firmware_limit,
        settings.record_offset,
        settings.ssid,
        settings.password,
        settings.period_ms,
    );
    fs::write(out_dir.join("settings.rs"), source).unwrap();
}

/// Validate flashkeep.toml configuration at compile time
fn validate_config() -> Settings {
    // Re-run if flashkeep.toml changes
    println!("cargo:rerun-if-changed=flashkeep.toml");

    let config_path = Path::new("flashkeep.toml");

    // Check if config file exists
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: flashkeep.toml not found!                                ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a flashkeep.toml configuration file.      ║\n\
            ║  Please create one in the flashkeep-firmware directory.          ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    // Read the config file
    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read flashkeep.toml                            ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    // Parse and validate TOML syntax
    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in flashkeep.toml                    ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();

    let firmware_limit = require_integer(&config, "flash", "firmware_limit", &mut errors);
    let record_offset = require_integer(&config, "flash", "record_offset", &mut errors);
    let ssid = require_string(&config, "record", "ssid", &mut errors);
    let password = require_string(&config, "record", "password", &mut errors);
    let period_ms = require_integer(&config, "heartbeat", "period_ms", &mut errors);

    if let (Some(limit), Some(offset)) = (firmware_limit, record_offset) {
        validate_flash(limit, offset, &mut errors);
    }
    if let Some(ssid) = &ssid {
        validate_text("record.ssid", ssid, &mut errors);
    }
    if let Some(password) = &password {
        validate_text("record.password", password, &mut errors);
    }
    if let Some(period) = period_ms {
        if !(1..=60_000).contains(&period) {
            errors.push("heartbeat.period_ms must be 1-60000".to_string());
        }
    }

    report_errors("Invalid configuration", &errors);

    println!("cargo:warning=flashkeep.toml validated successfully");

    // Every field is present once report_errors returns
    Settings {
        firmware_limit: firmware_limit.unwrap(),
        record_offset: record_offset.unwrap(),
        ssid: ssid.unwrap(),
        password: password.unwrap(),
        period_ms: period_ms.unwrap(),
    }
}

/// Check the record region against the image and the flash part
fn validate_flash(limit: i64, offset: i64, errors: &mut Vec<String>) {
    if limit <= BOOT2_SIZE || limit % SECTOR_SIZE != 0 {
        errors.push(format!(
            "flash.firmware_limit {:#x} must be a non-zero multiple of {:#x}",
            limit, SECTOR_SIZE
        ));
    }
    if offset % SECTOR_SIZE != 0 {
        errors.push(format!(
            "flash.record_offset {:#x} must be a multiple of {:#x}",
            offset, SECTOR_SIZE
        ));
    }
    if offset < limit {
        errors.push(format!(
            "flash.record_offset {:#x} overlaps the firmware image (< {:#x})",
            offset, limit
        ));
    }
    if offset + SECTOR_SIZE > FLASH_SIZE {
        errors.push(format!(
            "flash.record_offset {:#x} does not fit in {:#x} bytes of flash",
            offset, FLASH_SIZE
        ));
    }
}

/// Check a credential against the record field bounds
fn validate_text(name: &str, value: &str, errors: &mut Vec<String>) {
    if value.len() > MAX_TEXT_LEN {
        errors.push(format!("{} is {} bytes, max {}", name, value.len(), MAX_TEXT_LEN));
    }
    if value.contains('\0') {
        errors.push(format!("{} must not contain NUL", name));
    }
}

fn require_integer(
    config: &toml::Value,
    section: &str,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<i64> {
    match config.get(section).and_then(|s| s.get(key)) {
        Some(toml::Value::Integer(value)) => Some(*value),
        Some(_) => {
            errors.push(format!("{}.{} must be an integer", section, key));
            None
        }
        None => {
            errors.push(format!("Missing {}.{}", section, key));
            None
        }
    }
}

fn require_string(
    config: &toml::Value,
    section: &str,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match config.get(section).and_then(|s| s.get(key)) {
        Some(toml::Value::String(value)) => Some(value.clone()),
        Some(_) => {
            errors.push(format!("{}.{} must be a string", section, key));
            None
        }
        None => {
            errors.push(format!("Missing {}.{}", section, key));
            None
        }
    }
}

/// Fail the build with every collected error
fn report_errors(title: &str, errors: &[String]) {
    if errors.is_empty() {
        return;
    }

    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
