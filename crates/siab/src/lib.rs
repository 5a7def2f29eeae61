//! SIAB firmware core
//!
//! Everything between the SMBus transport and the hardware of the SiPM
//! Interface And Biasing board:
//!
//! ```text
//!  SMBus transport ──► SmbSession ──► SiabContext::dispatch ──► Command handlers
//!                                                                  │
//!          ┌──────────────────┬───────────────────┬────────────────┤
//!          ▼                  ▼                   ▼                ▼
//!   EepromConfigStore     MusicSpi        MusicCalibrator   AdcAcquisitionLoop ◄── ADC IRQ
//!          │                  │                   │                │
//!          ▼                  ▼                   ▼                ▼
//!     EepromDevice       SpiBitBang +       AnalogPort        AdcDevice + HV pin
//!                        GpioPort
//! ```
//!
//! Drivers are supplied through [`board::Hardware`]; the `platform` crate
//! defines the traits and ships deterministic mocks.
//!
//! # Features
//!
//! - `std`: host builds; enables `platform/std` (mocks)
//! - `defmt`: defmt logging and `Format` derives (hardware builds)
//! - `tracing`: tracing logging (host builds)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)] // register and line names in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod fmt;

pub mod acquisition;
pub mod board;
pub mod calibration;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod eeprom_store;
pub mod error;
pub mod music;
pub mod smb;

pub use acquisition::{AdcAcquisitionLoop, AdcChannelAccumulator, HvSafetyState, SampleOutcome};
pub use board::{Board, Hardware};
pub use calibration::{
    ChannelCalibrationState, MusicCalibrator, OutputType, ThresholdScanResult, VdcCalibration,
    VdcOutput,
};
pub use command::{Command, CommandFrame};
pub use config::SiabConfig;
pub use dispatcher::{Dispatch, Response, SiabContext};
pub use eeprom_store::{CalibrationSlot, EepromConfigStore};
pub use error::{Result, SiabError};
pub use music::{MusicChip, MusicRegisterMap, MusicSpi};
pub use smb::{SessionState, SmbSession};
