//! Command frames and the decoded command set
//!
//! A frame is the opcode followed by up to four payload bytes. Payload
//! bytes the master did not send read as zero. Multi-byte payload integers
//! are big-endian unless noted on the variant.

use crate::config::RX_BUFFER_SIZE;
use crate::error::{Result, SiabError};

/// Raw bytes of one write transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    bytes: [u8; RX_BUFFER_SIZE],
    len: usize,
}

impl CommandFrame {
    /// Latch a frame; rejects empty frames and frames longer than the
    /// receive buffer
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(SiabError::EmptyFrame);
        }
        let mut bytes = [0u8; RX_BUFFER_SIZE];
        bytes
            .get_mut(..data.len())
            .ok_or(SiabError::FrameTooLong(data.len()))?
            .copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len(),
        })
    }

    /// Opcode byte
    pub fn opcode(&self) -> u8 {
        self.byte(0)
    }

    /// Byte `i` of the frame, 0 past the received length
    pub fn byte(&self, i: usize) -> u8 {
        if i < self.len {
            self.bytes.get(i).copied().unwrap_or(0)
        } else {
            0
        }
    }

    /// Big-endian word at `i`, `i + 1`
    fn be_word(&self, i: usize) -> u16 {
        u16::from_be_bytes([self.byte(i), self.byte(i.saturating_add(1))])
    }

    /// Little-endian word at `i`, `i + 1`
    fn le_word(&self, i: usize) -> u16 {
        u16::from_le_bytes([self.byte(i), self.byte(i.saturating_add(1))])
    }

    /// Received bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.get(..self.len).unwrap_or(&[])
    }
}

/// Decoded command, one variant per opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// 0x01: restart the firmware
    Reset,
    /// 0x02
    LedOn,
    /// 0x03
    LedOff,
    /// 0x04
    Rail3v3On,
    /// 0x05
    Rail3v3Off,
    /// 0x06
    Rail5vOn,
    /// 0x07
    Rail5vOff,
    /// 0x08: 3V3 and 5V together
    RailsOn,
    /// 0x09
    RailsOff,
    /// 0x0A: raw count of the SiPM thermistor
    SipmTemperature,
    /// 0x0B: raw count of the MCU temperature channel
    McuTemperature,
    /// 0x0C: address little-endian in bytes 1..=2
    EepromReadByte {
        /// EEPROM address
        addr: u16,
    },
    /// 0x0D: address little-endian in bytes 1..=2
    EepromReadWord {
        /// EEPROM address of the high byte
        addr: u16,
    },
    /// 0x0E: address little-endian in bytes 2..=3, value in byte 4
    EepromWriteByte {
        /// EEPROM address
        addr: u16,
        /// Value
        value: u8,
    },
    /// 0x0F: 8-bit address in byte 2, low byte 3, high byte 4
    EepromWriteWord {
        /// EEPROM address of the high byte (0..=255 only)
        addr: u8,
        /// High byte
        hi: u8,
        /// Low byte
        lo: u8,
    },
    /// 0x10: configure the MUSIC soft-SPI bus
    MusicInit,
    /// 0x11: load a chip's register map from EEPROM
    MusicLoad {
        /// Chip id (1 bottom, 2 top)
        chip: u8,
    },
    /// 0x12: log the loaded register map
    MusicPrint {
        /// Chip id
        chip: u8,
    },
    /// 0x13: push the loaded register map to the ASIC
    MusicApply {
        /// Chip id
        chip: u8,
    },
    /// 0x14: register address in byte 1, chip id in byte 2
    MusicRead {
        /// Chip id
        chip: u8,
        /// Register address
        addr: u8,
    },
    /// 0x15: chip id in bits 7..6 and address in bits 5..0 of byte 2,
    /// data little-endian in bytes 3..=4
    MusicWrite {
        /// Chip id
        chip: u8,
        /// Register address
        addr: u8,
        /// Register value
        data: u16,
    },
    /// 0x16: rate code 1..=6
    SetAdcRate {
        /// Rate code
        code: u8,
    },
    /// 0x17
    InitAdc,
    /// 0x18
    AdcEnable,
    /// 0x19
    AdcDisable,
    /// 0x1A
    ReadAverage {
        /// ADC channel
        channel: u8,
    },
    /// 0x1B: reserved
    ReadAll,
    /// 0x1C: record every channel's average as its cut-off reference
    RecordOffset,
    /// 0x1D
    ReadOffset {
        /// ADC channel
        channel: u8,
    },
    /// 0x1E
    HvOn,
    /// 0x1F
    HvOff,
    /// 0x20: arm the over-current controller
    EnableSafety,
    /// 0x21
    HvStatus,
    /// 0x22
    SetMaxCurrent {
        /// Limit in µA
        max_current_ua: u16,
    },
    /// 0x23: chip id in bits 7..6 and address in bits 5..0 of byte 1
    MusicUpdate {
        /// Chip id
        chip: u8,
        /// Register address
        addr: u8,
        /// Register value
        data: u16,
    },
    /// 0x24: store the loaded register map to EEPROM
    MusicStore {
        /// Chip id
        chip: u8,
    },
    /// 0x25: serial number
    DeviceId,
    /// 0x26: bandgap and threshold scan
    ThresholdScan {
        /// Chip id
        chip: u8,
        /// Samples per point (0 selects the default)
        samples: u16,
    },
    /// 0x27: VDC/VCM calibration
    VdcCalibrate {
        /// Chip id
        chip: u8,
        /// Reads per point (0 selects the default)
        samples: u16,
        /// Persist the codes to EEPROM
        store: bool,
    },
}

/// Chip id field of a packed chip/address byte
const fn packed_chip(b: u8) -> u8 {
    b >> 6
}

/// Address field of a packed chip/address byte
const fn packed_addr(b: u8) -> u8 {
    b & 0x3F
}

impl Command {
    /// Decode a frame
    pub fn decode(frame: &CommandFrame) -> Result<Self> {
        let b = |i| frame.byte(i);
        let cmd = match frame.opcode() {
            0x01 => Self::Reset,
            0x02 => Self::LedOn,
            0x03 => Self::LedOff,
            0x04 => Self::Rail3v3On,
            0x05 => Self::Rail3v3Off,
            0x06 => Self::Rail5vOn,
            0x07 => Self::Rail5vOff,
            0x08 => Self::RailsOn,
            0x09 => Self::RailsOff,
            0x0A => Self::SipmTemperature,
            0x0B => Self::McuTemperature,
            0x0C => Self::EepromReadByte {
                addr: frame.le_word(1),
            },
            0x0D => Self::EepromReadWord {
                addr: frame.le_word(1),
            },
            0x0E => Self::EepromWriteByte {
                addr: frame.le_word(2),
                value: b(4),
            },
            0x0F => Self::EepromWriteWord {
                addr: b(2),
                hi: b(4),
                lo: b(3),
            },
            0x10 => Self::MusicInit,
            0x11 => Self::MusicLoad { chip: b(1) },
            0x12 => Self::MusicPrint { chip: b(1) },
            0x13 => Self::MusicApply { chip: b(1) },
            0x14 => Self::MusicRead {
                chip: b(2),
                addr: b(1),
            },
            0x15 => Self::MusicWrite {
                chip: packed_chip(b(2)),
                addr: packed_addr(b(2)),
                data: frame.le_word(3),
            },
            0x16 => Self::SetAdcRate { code: b(1) },
            0x17 => Self::InitAdc,
            0x18 => Self::AdcEnable,
            0x19 => Self::AdcDisable,
            0x1A => Self::ReadAverage { channel: b(1) },
            0x1B => Self::ReadAll,
            0x1C => Self::RecordOffset,
            0x1D => Self::ReadOffset { channel: b(1) },
            0x1E => Self::HvOn,
            0x1F => Self::HvOff,
            0x20 => Self::EnableSafety,
            0x21 => Self::HvStatus,
            0x22 => Self::SetMaxCurrent {
                max_current_ua: frame.be_word(1),
            },
            0x23 => Self::MusicUpdate {
                chip: packed_chip(b(1)),
                addr: packed_addr(b(1)),
                data: frame.be_word(2),
            },
            0x24 => Self::MusicStore { chip: b(1) },
            0x25 => Self::DeviceId,
            0x26 => Self::ThresholdScan {
                chip: b(1),
                samples: frame.be_word(2),
            },
            0x27 => Self::VdcCalibrate {
                chip: b(1),
                samples: frame.be_word(2),
                store: b(4) != 0,
            },
            op => return Err(SiabError::UnknownOpcode(op)),
        };
        Ok(cmd)
    }

    /// Whether the master follows up with a read transaction
    pub const fn has_response(&self) -> bool {
        matches!(
            self,
            Self::SipmTemperature
                | Self::McuTemperature
                | Self::EepromReadByte { .. }
                | Self::EepromReadWord { .. }
                | Self::MusicRead { .. }
                | Self::ReadAverage { .. }
                | Self::ReadOffset { .. }
                | Self::HvStatus
                | Self::DeviceId
                | Self::ThresholdScan { .. }
                | Self::VdcCalibrate { .. }
        )
    }

    /// Short name for log lines
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::LedOn => "led-on",
            Self::LedOff => "led-off",
            Self::Rail3v3On => "3v3-on",
            Self::Rail3v3Off => "3v3-off",
            Self::Rail5vOn => "5v-on",
            Self::Rail5vOff => "5v-off",
            Self::RailsOn => "rails-on",
            Self::RailsOff => "rails-off",
            Self::SipmTemperature => "sipm-temp",
            Self::McuTemperature => "mcu-temp",
            Self::EepromReadByte { .. } => "eeprom-read-byte",
            Self::EepromReadWord { .. } => "eeprom-read-word",
            Self::EepromWriteByte { .. } => "eeprom-write-byte",
            Self::EepromWriteWord { .. } => "eeprom-write-word",
            Self::MusicInit => "music-init",
            Self::MusicLoad { .. } => "music-load",
            Self::MusicPrint { .. } => "music-print",
            Self::MusicApply { .. } => "music-apply",
            Self::MusicRead { .. } => "music-read",
            Self::MusicWrite { .. } => "music-write",
            Self::SetAdcRate { .. } => "adc-rate",
            Self::InitAdc => "adc-init",
            Self::AdcEnable => "adc-enable",
            Self::AdcDisable => "adc-disable",
            Self::ReadAverage { .. } => "adc-average",
            Self::ReadAll => "adc-read-all",
            Self::RecordOffset => "adc-record-offset",
            Self::ReadOffset { .. } => "adc-read-offset",
            Self::HvOn => "hv-on",
            Self::HvOff => "hv-off",
            Self::EnableSafety => "hv-safety",
            Self::HvStatus => "hv-status",
            Self::SetMaxCurrent { .. } => "hv-max-current",
            Self::MusicUpdate { .. } => "music-update",
            Self::MusicStore { .. } => "music-store",
            Self::DeviceId => "device-id",
            Self::ThresholdScan { .. } => "threshold-scan",
            Self::VdcCalibrate { .. } => "vdc-calibrate",
        }
    }
}
