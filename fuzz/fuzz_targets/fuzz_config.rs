//! Fuzz target for approximation config parsing.
//!
//! Tests that JSON, TOML and YAML parsing plus validation handle arbitrary
//! input without panicking.

#![no_main]

use bp_config::{ApproxConfig, ConfigFormat};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for format in [ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml] {
        let _ = ApproxConfig::from_str_as(text, format);
    }
});
