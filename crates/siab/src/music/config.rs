//! In-RAM copy of a MUSIC register configuration
//!
//! The full configurable register set of one ASIC is 23 registers: eight
//! input-stage, eight channel and seven bias registers. The map is loaded
//! from EEPROM, edited by remote commands and pushed to the ASIC on demand.

use embedded_hal::delay::DelayNs;
use platform::{GpioPort, SpiBitBang};

use super::registers::{BIAS, BIAS_COUNT, CHANNEL, CHANNELS, INPUT_STAGE};
use super::{MusicChip, MusicSpi};
use crate::error::Result;

/// Registers per map
pub const REGISTER_COUNT: usize = 23;

/// One (address, data) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterEntry {
    /// Register address
    pub addr: u8,
    /// Register value
    pub data: u16,
}

/// Register configuration of one ASIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicRegisterMap {
    entries: [RegisterEntry; REGISTER_COUNT],
}

impl MusicRegisterMap {
    /// Canonical address order with every value zero
    pub fn new() -> Self {
        let mut entries = [RegisterEntry { addr: 0, data: 0 }; REGISTER_COUNT];
        let addrs = (0..CHANNELS)
            .map(|i| INPUT_STAGE.wrapping_add(i))
            .chain((0..CHANNELS).map(|i| CHANNEL.wrapping_add(i)))
            .chain((0..BIAS_COUNT).map(|i| BIAS.wrapping_add(i)));
        for (entry, addr) in entries.iter_mut().zip(addrs) {
            entry.addr = addr;
        }
        Self { entries }
    }

    /// Map from raw entries, e.g. as read back from EEPROM
    pub fn from_entries(entries: [RegisterEntry; REGISTER_COUNT]) -> Self {
        Self { entries }
    }

    /// Entries in storage order
    pub fn entries(&self) -> &[RegisterEntry; REGISTER_COUNT] {
        &self.entries
    }

    /// Value held for register `addr`
    pub fn get(&self, addr: u8) -> Option<u16> {
        self.entries.iter().find(|e| e.addr == addr).map(|e| e.data)
    }

    /// Replace the value of register `addr`; `false` if the map has no such
    /// register
    pub fn update(&mut self, addr: u8, data: u16) -> bool {
        match self.entries.iter_mut().find(|e| e.addr == addr) {
            Some(entry) => {
                entry.data = data;
                true
            }
            None => false,
        }
    }

    /// Log every entry
    pub fn print(&self, chip: MusicChip) {
        info!("MUSIC {} register map:", chip.name());
        for entry in &self.entries {
            info!("  SPI@{:#x}: {:#x}", entry.addr, entry.data);
        }
    }

    /// Write every entry to the ASIC with read-back verification
    ///
    /// Returns the number of registers whose read-back did not match.
    pub fn apply<S, G, D>(&self, bus: &mut MusicSpi<'_, S, G, D>, chip: MusicChip) -> Result<usize>
    where
        S: SpiBitBang,
        G: GpioPort,
        D: DelayNs,
    {
        let mut failures = 0usize;
        for entry in &self.entries {
            let check = bus.write_verified(chip, entry.addr, entry.data, true)?;
            if !check.is_ok() {
                failures = failures.saturating_add(1);
            }
        }
        if failures > 0 {
            warn!("MUSIC {}: {} registers failed verification", chip.name(), failures);
        }
        Ok(failures)
    }
}

impl Default for MusicRegisterMap {
    fn default() -> Self {
        Self::new()
    }
}
