//! EEPROM-backed configuration store
//!
//! # Layout
//!
//! ```text
//! 0        serial length (0xFF = virgin device)
//! 1..65    serial bytes (at most 64)
//! 65..134  bottom MUSIC map: 23 × [addr, data_hi, data_lo]
//! 134..203 top MUSIC map:    23 × [addr, data_hi, data_lo]
//! 203      VDC_SE code
//! 204      VDC_LG code
//! 205      VDC_HG code
//! 206      VCM code
//! ```
//!
//! Every write issued on behalf of the configuration (map entries, serial,
//! calibration codes) is write-if-changed: a cell is only programmed when
//! its current content differs. Raw passthrough writes from the bus are
//! unconditional.

use platform::{EepromDevice, ERASED_BYTE};

use crate::calibration::VdcOutput;
use crate::error::{Result, SiabError};
use crate::music::{MusicChip, MusicRegisterMap, RegisterEntry, REGISTER_COUNT};

/// Address of the serial length byte
pub const SERIAL_LEN_ADDR: u16 = 0;

/// First serial byte
pub const SERIAL_START: u16 = 1;

/// Longest serial number
pub const SERIAL_MAX_LEN: usize = 64;

/// Start of the MUSIC configuration region
pub const EEPROM_CONFIG_START: u16 = 65;

/// Bytes per stored register entry
pub const MAP_ENTRY_LEN: u16 = 3;

/// Bytes per stored register map
#[allow(clippy::cast_possible_truncation)] // 23 entries
pub const MAP_LEN: u16 = REGISTER_COUNT as u16 * MAP_ENTRY_LEN;

/// First byte past both maps
pub const CALIBRATION_START: u16 = EEPROM_CONFIG_START + 2 * MAP_LEN;

/// Persisted calibration code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationSlot {
    /// Single-ended VDC
    VdcSe,
    /// Low-gain differential VDC
    VdcLg,
    /// High-gain differential VDC
    VdcHg,
    /// Common-mode voltage
    Vcm,
}

impl CalibrationSlot {
    /// EEPROM address of the slot
    pub const fn addr(self) -> u16 {
        match self {
            Self::VdcSe => CALIBRATION_START,
            Self::VdcLg => CALIBRATION_START + 1,
            Self::VdcHg => CALIBRATION_START + 2,
            Self::Vcm => CALIBRATION_START + 3,
        }
    }

    /// Slot holding the VDC code of `output`
    pub const fn vdc(output: VdcOutput) -> Self {
        match output {
            VdcOutput::SingleEnded => Self::VdcSe,
            VdcOutput::LowGain => Self::VdcLg,
            VdcOutput::HighGain => Self::VdcHg,
        }
    }
}

/// First byte of `chip`'s stored map
pub const fn map_start(chip: MusicChip) -> u16 {
    match chip {
        MusicChip::Bottom => EEPROM_CONFIG_START,
        MusicChip::Top => EEPROM_CONFIG_START + MAP_LEN,
    }
}

/// Serial number as stored
pub type Serial = heapless::Vec<u8, SERIAL_MAX_LEN>;

/// Configuration store over a borrowed EEPROM
pub struct EepromConfigStore<'a, E> {
    eeprom: &'a mut E,
}

impl<'a, E: EepromDevice> EepromConfigStore<'a, E> {
    /// Borrow the device
    pub fn new(eeprom: &'a mut E) -> Self {
        Self { eeprom }
    }

    // ── Bytes and words ─────────────────────────────────────────────────────

    /// Read one byte
    pub fn read_byte(&mut self, addr: u16) -> Result<u8> {
        self.eeprom.read_byte(addr).map_err(|_| SiabError::Eeprom)
    }

    /// Program one byte unconditionally
    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.eeprom
            .write_byte(addr, value)
            .map_err(|_| SiabError::Eeprom)
    }

    /// Program one byte only if it differs; `true` if a write happened
    pub fn write_byte_if_changed(&mut self, addr: u16, value: u8) -> Result<bool> {
        if self.read_byte(addr)? == value {
            return Ok(false);
        }
        self.write_byte(addr, value)?;
        Ok(true)
    }

    /// Read a big-endian word (high byte at `addr`)
    pub fn read_word(&mut self, addr: u16) -> Result<u16> {
        let hi = self.read_byte(addr)?;
        let lo = self.read_byte(next(addr)?)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Program a big-endian word unconditionally
    pub fn write_word(&mut self, addr: u16, hi: u8, lo: u8) -> Result<()> {
        self.write_byte(addr, hi)?;
        self.write_byte(next(addr)?, lo)
    }

    /// Program a big-endian word, skipping unchanged bytes
    ///
    /// Covers the two data bytes only (0..=2 writes). Register map entries
    /// also carry their register address; those go through
    /// [`write_entry_if_changed`](Self::write_entry_if_changed).
    pub fn write_word_if_changed(&mut self, addr: u16, hi: u8, lo: u8) -> Result<usize> {
        self.write_all_if_changed(addr, &[hi, lo])
    }

    /// Program a stored register entry `[reg_addr, hi, lo]`, skipping
    /// unchanged bytes
    ///
    /// Returns the number of bytes physically written (0..=3). Every map
    /// store goes through here.
    pub fn write_entry_if_changed(&mut self, addr: u16, reg_addr: u8, hi: u8, lo: u8) -> Result<usize> {
        self.write_all_if_changed(addr, &[reg_addr, hi, lo])
    }

    /// Zero-fill `len` bytes from `start`
    pub fn erase_region(&mut self, start: u16, len: u16) -> Result<()> {
        for offset in 0..len {
            let addr = start.checked_add(offset).ok_or(SiabError::Eeprom)?;
            self.write_byte_if_changed(addr, 0)?;
        }
        Ok(())
    }

    // ── Serial number ───────────────────────────────────────────────────────

    /// Read the serial number
    ///
    /// An erased length byte marks a virgin device: the whole EEPROM is
    /// zero-filled and an empty serial is returned.
    pub fn read_serial(&mut self) -> Result<Serial> {
        let len = self.read_byte(SERIAL_LEN_ADDR)?;
        let mut serial = Serial::new();
        if len == ERASED_BYTE {
            warn!("EEPROM: erased serial length, clearing device");
            let size = self.eeprom.size();
            self.erase_region(0, size)?;
            return Ok(serial);
        }
        let len = usize::from(len).min(SERIAL_MAX_LEN);
        let mut addr = SERIAL_START;
        for _ in 0..len {
            let byte = self.read_byte(addr)?;
            // Capacity equals SERIAL_MAX_LEN and len is clamped to it.
            let _ = serial.push(byte);
            addr = next(addr)?;
        }
        Ok(serial)
    }

    /// Store a serial number (truncated to 64 bytes)
    pub fn write_serial(&mut self, serial: &[u8]) -> Result<()> {
        let serial = serial.get(..SERIAL_MAX_LEN).unwrap_or(serial);
        #[allow(clippy::cast_possible_truncation)] // at most 64
        let len = serial.len() as u8;
        self.write_byte_if_changed(SERIAL_LEN_ADDR, len)?;
        self.write_all_if_changed(SERIAL_START, serial)?;
        Ok(())
    }

    // ── MUSIC register maps ─────────────────────────────────────────────────

    /// Load `chip`'s stored register map
    pub fn read_map(&mut self, chip: MusicChip) -> Result<MusicRegisterMap> {
        let mut entries = [RegisterEntry { addr: 0, data: 0 }; REGISTER_COUNT];
        let mut addr = map_start(chip);
        for entry in &mut entries {
            entry.addr = self.read_byte(addr)?;
            entry.data = self.read_word(next(addr)?)?;
            addr = addr.checked_add(MAP_ENTRY_LEN).ok_or(SiabError::Eeprom)?;
        }
        Ok(MusicRegisterMap::from_entries(entries))
    }

    /// Store `map` as `chip`'s register map
    ///
    /// Returns the number of bytes physically written.
    pub fn write_map(&mut self, chip: MusicChip, map: &MusicRegisterMap) -> Result<usize> {
        let mut addr = map_start(chip);
        let mut written = 0usize;
        for entry in map.entries() {
            let [hi, lo] = entry.data.to_be_bytes();
            written = written.saturating_add(self.write_entry_if_changed(addr, entry.addr, hi, lo)?);
            addr = addr.checked_add(MAP_ENTRY_LEN).ok_or(SiabError::Eeprom)?;
        }
        Ok(written)
    }

    // ── Calibration codes ───────────────────────────────────────────────────

    /// Read a persisted calibration code
    pub fn read_calibration(&mut self, slot: CalibrationSlot) -> Result<u8> {
        self.read_byte(slot.addr())
    }

    /// Persist a calibration code; `true` if the cell changed
    pub fn store_calibration(&mut self, slot: CalibrationSlot, code: u8) -> Result<bool> {
        self.write_byte_if_changed(slot.addr(), code)
    }

    /// Persist the VDC code of `output`
    pub fn store_vdc(&mut self, output: VdcOutput, code: u8) -> Result<bool> {
        self.store_calibration(CalibrationSlot::vdc(output), code)
    }

    /// Persist the common-mode code
    pub fn store_vcm(&mut self, code: u8) -> Result<bool> {
        self.store_calibration(CalibrationSlot::Vcm, code)
    }

    fn write_all_if_changed(&mut self, start: u16, bytes: &[u8]) -> Result<usize> {
        let mut written = 0usize;
        let mut addr = start;
        for (i, &byte) in bytes.iter().enumerate() {
            if i > 0 {
                addr = next(addr)?;
            }
            if self.write_byte_if_changed(addr, byte)? {
                written = written.saturating_add(1);
            }
        }
        Ok(written)
    }
}

fn next(addr: u16) -> Result<u16> {
    addr.checked_add(1).ok_or(SiabError::Eeprom)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use platform::mocks::MockEeprom;

    #[test]
    fn layout_places_calibration_after_both_maps() {
        assert_eq!(MAP_LEN, 69);
        assert_eq!(map_start(MusicChip::Top), 134);
        assert_eq!(CalibrationSlot::VdcSe.addr(), 203);
        assert_eq!(CalibrationSlot::Vcm.addr(), 206);
    }

    #[test]
    fn word_is_stored_big_endian() {
        let mut dev = MockEeprom::new(1024);
        let mut store = EepromConfigStore::new(&mut dev);
        store.write_word(10, 0x12, 0x34).unwrap();
        assert_eq!(store.read_byte(10).unwrap(), 0x12);
        assert_eq!(store.read_byte(11).unwrap(), 0x34);
        assert_eq!(store.read_word(10).unwrap(), 0x1234);
    }

    #[test]
    fn identical_entry_write_programs_nothing() {
        let mut dev = MockEeprom::new(1024);
        let mut store = EepromConfigStore::new(&mut dev);
        assert_eq!(store.write_entry_if_changed(65, 0x08, 0x10, 0x02).unwrap(), 3);
        assert_eq!(store.write_entry_if_changed(65, 0x08, 0x10, 0x02).unwrap(), 0);
        assert_eq!(store.write_entry_if_changed(65, 0x08, 0x10, 0x03).unwrap(), 1);
        assert_eq!(dev.write_count(), 4);
    }

    #[test]
    fn word_write_leaves_neighbouring_entry_byte_alone() {
        let mut dev = MockEeprom::filled(256, 0);
        let mut store = EepromConfigStore::new(&mut dev);
        store.write_byte(65, 0x08).unwrap();
        assert_eq!(store.write_word_if_changed(66, 0x10, 0x02).unwrap(), 2);
        assert_eq!(store.write_word_if_changed(66, 0x10, 0x02).unwrap(), 0);
        assert_eq!(store.write_word_if_changed(66, 0x10, 0x07).unwrap(), 1);
        assert_eq!(store.read_byte(65).unwrap(), 0x08);
        assert_eq!(store.read_word(66).unwrap(), 0x1007);
    }

    #[test]
    fn virgin_device_is_erased_and_reports_empty_serial() {
        let mut dev = MockEeprom::new(256);
        let mut store = EepromConfigStore::new(&mut dev);
        assert!(store.read_serial().unwrap().is_empty());
        assert!(dev.cells().iter().all(|&b| b == 0));
    }

    #[test]
    fn serial_round_trips_and_truncates() {
        let mut dev = MockEeprom::filled(256, 0);
        let mut store = EepromConfigStore::new(&mut dev);
        store.write_serial(b"SIAB-0042").unwrap();
        assert_eq!(store.read_serial().unwrap().as_slice(), b"SIAB-0042");

        let long = [0xAB; 80];
        store.write_serial(&long).unwrap();
        assert_eq!(store.read_serial().unwrap().len(), SERIAL_MAX_LEN);
        assert_eq!(store.read_byte(SERIAL_START + 64).unwrap(), 0);
    }

    #[test]
    fn map_round_trips_per_chip() {
        let mut dev = MockEeprom::filled(1024, 0);
        let mut store = EepromConfigStore::new(&mut dev);
        let mut map = MusicRegisterMap::new();
        map.update(0x0F, 0x1FFA);
        map.update(0x22, 0x0C00);
        store.write_map(MusicChip::Top, &map).unwrap();
        assert_eq!(store.read_map(MusicChip::Top).unwrap(), map);
        // Bottom region untouched
        assert_eq!(store.read_byte(EEPROM_CONFIG_START).unwrap(), 0);
        assert_eq!(store.write_map(MusicChip::Top, &map).unwrap(), 0);
    }

    #[test]
    fn calibration_codes_use_update_semantics() {
        let mut dev = MockEeprom::filled(1024, 0);
        let mut store = EepromConfigStore::new(&mut dev);
        assert!(store.store_calibration(CalibrationSlot::VdcHg, 0x7E).unwrap());
        assert!(!store.store_calibration(CalibrationSlot::VdcHg, 0x7E).unwrap());
        assert_eq!(store.read_calibration(CalibrationSlot::VdcHg).unwrap(), 0x7E);
        assert!(store.store_vdc(VdcOutput::LowGain, 0x11).unwrap());
        assert!(store.store_vcm(0x8E).unwrap());
        assert_eq!(store.read_byte(204).unwrap(), 0x11);
        assert_eq!(store.read_byte(206).unwrap(), 0x8E);
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut dev = MockEeprom::new(16);
        let mut store = EepromConfigStore::new(&mut dev);
        assert_eq!(store.read_byte(16), Err(SiabError::Eeprom));
        assert_eq!(store.read_word(u16::MAX), Err(SiabError::Eeprom));
    }
}
