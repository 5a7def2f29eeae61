//! Byte-addressable non-volatile storage
//!
//! The configuration EEPROM is accessed through the `embedded-storage`
//! traits. [`EepromDevice`] is a blanket alias so drivers only need to
//! implement [`embedded_storage::Storage`].

use embedded_storage::{ReadStorage, Storage};

/// Value of an erased EEPROM cell
pub const ERASED_BYTE: u8 = 0xFF;

/// Byte-addressable EEPROM
pub trait EepromDevice: Storage {
    /// Read one byte
    fn read_byte(&mut self, addr: u16) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        ReadStorage::read(self, u32::from(addr), &mut buf)?;
        let [byte] = buf;
        Ok(byte)
    }

    /// Program one byte unconditionally
    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), Self::Error> {
        Storage::write(self, u32::from(addr), &[value])
    }

    /// Capacity in bytes, saturated to the 16-bit address space
    fn size(&self) -> u16 {
        u16::try_from(ReadStorage::capacity(self)).unwrap_or(u16::MAX)
    }
}

impl<T: Storage> EepromDevice for T {}
