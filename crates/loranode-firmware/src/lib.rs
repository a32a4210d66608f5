//! ESP32-S3 firmware-specific modules for loranode
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: peripheral initialization, the GPIO edge interrupt feeding the
//! pulse counters, the RTC watchdog, deep sleep and the credentials baked in
//! at build time.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod credentials;
pub mod platform;
