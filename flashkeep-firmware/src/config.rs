//! Build-time configuration
//!
//! Constants rendered by `build.rs` from `flashkeep.toml` after validation.

include!(concat!(env!("OUT_DIR"), "/settings.rs"));
