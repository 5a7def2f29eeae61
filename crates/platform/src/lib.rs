//! Hardware Abstraction Layer (HAL) for the SIAB controller
//!
//! This crate provides trait-based abstractions for every peripheral the
//! SIAB firmware core touches, enabling development and testing without
//! physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Firmware core (siab crate: dispatcher, MUSIC, calibration, acquisition)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Board support (MCU HAL + embedded-hal pins)
//! ```
//!
//! # Abstractions
//!
//! - [`GpioPort`] - named control outputs (LED, rails, chip selects)
//! - [`AnalogPort`] - 10-bit single-shot reads of lines A0..A7
//! - [`AdcDevice`] - 16-channel continuous converter
//! - [`SpiBitBang`] - byte-wide software SPI with run-time mode changes
//! - [`EepromDevice`] - byte-addressable EEPROM over `embedded-storage`
//! - [`SystemControl`] - soft reset
//!
//! Delays use [`embedded_hal::delay::DelayNs`] directly.
//!
//! # Features
//!
//! - `std`: Enable standard library support and the [`mocks`] module
//! - `defmt`: Derive `defmt::Format` on all public types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names and pin names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(feature = "std")]
extern crate std;

pub mod adc;
pub mod analog;
pub mod gpio;
pub mod mocks;
pub mod spi;
pub mod storage;
pub mod system;

pub use adc::{AdcDevice, DataRate, ADC_CHANNELS, RESULT_LEN};
pub use analog::{AnalogLine, AnalogPort, ADC_FULL_SCALE, DIGITAL_THRESHOLD};
pub use gpio::{GpioPort, OutputLine, PinState};
pub use spi::{BitOrder, ClockDivider, SoftSpi, SoftSpiError, SpiBitBang, SpiConfig, SpiMode};
pub use storage::{EepromDevice, ERASED_BYTE};
pub use system::SystemControl;
