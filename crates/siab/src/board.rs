//! Board bundle and mini-board wiring
//!
//! [`Hardware`] names the concrete driver types of one board build;
//! [`Board`] owns the foreground-side instances. The ADC and the HV switch
//! are absent from [`Board`] because they belong to the acquisition state
//! shared with the conversion-ready interrupt.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::StatefulOutputPin;
use platform::{AdcDevice, AnalogLine, AnalogPort, EepromDevice, GpioPort, SpiBitBang, SystemControl};

use crate::music::MusicSpi;

/// Driver types of one board build
pub trait Hardware {
    /// Control port (LED, rails, chip selects, status port)
    type Gpio: GpioPort;
    /// MUSIC soft-SPI bus
    type Spi: SpiBitBang;
    /// MCU analog lines
    type Analog: AnalogPort;
    /// Configuration EEPROM
    type Eeprom: EepromDevice;
    /// Blocking delay
    type Delay: DelayNs;
    /// Soft reset
    type System: SystemControl;
    /// 16-channel continuous ADC
    type Adc: AdcDevice;
    /// HV enable output
    type HvSwitch: StatefulOutputPin;
}

/// Foreground peripherals
pub struct Board<H: Hardware> {
    /// Control port
    pub gpio: H::Gpio,
    /// MUSIC bus
    pub spi: H::Spi,
    /// Analog lines
    pub analog: H::Analog,
    /// EEPROM
    pub eeprom: H::Eeprom,
    /// Delay
    pub delay: H::Delay,
    /// System control
    pub system: H::System,
}

impl<H: Hardware> Board<H> {
    /// Register access to the MUSIC ASICs
    pub fn music(&mut self, debug: bool) -> MusicSpi<'_, H::Spi, H::Gpio, H::Delay> {
        MusicSpi::new(&mut self.spi, &mut self.gpio, &mut self.delay, debug)
    }
}

// ── Mini-board line maps ────────────────────────────────────────────────────

/// SiPM thermistor divider
pub const SIPM_THERMISTOR: AnalogLine = AnalogLine::A7;

/// Single-ended output of MUSIC channel 0..=7
pub const SE_LINES: [AnalogLine; 8] = [
    AnalogLine::A5,
    AnalogLine::A4,
    AnalogLine::A2,
    AnalogLine::A3,
    AnalogLine::A0,
    AnalogLine::A1,
    AnalogLine::A7,
    AnalogLine::A6,
];

/// High-gain differential pair (+, −)
pub const HG_LINES: [AnalogLine; 2] = [AnalogLine::A3, AnalogLine::A2];

/// Low-gain differential pair (+, −)
pub const LG_LINES: [AnalogLine; 2] = [AnalogLine::A1, AnalogLine::A0];

/// ADC input routed to conversion channel 0..=15
pub const ADC_INPUT_MAP: [u8; 16] = [15, 14, 13, 12, 11, 10, 9, 8, 3, 2, 1, 16, 7, 6, 5, 4];

/// Analog line of single-ended channel `ch`
pub fn se_line(ch: usize) -> Option<AnalogLine> {
    SE_LINES.get(ch).copied()
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)] // known-length arrays
mod tests {
    use super::*;

    #[test]
    fn every_se_channel_has_a_distinct_line() {
        for (i, a) in SE_LINES.iter().enumerate() {
            for b in SE_LINES.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert_eq!(se_line(8), None);
    }

    #[test]
    fn differential_pairs_share_se_lines() {
        assert_eq!(se_line(3), Some(HG_LINES[0]));
        assert_eq!(se_line(5), Some(LG_LINES[0]));
    }
}
