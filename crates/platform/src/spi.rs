//! Bit-banged SPI
//!
//! The MUSIC ASICs sit on a software SPI bus: three GPIO lines clocked by
//! the CPU. The bus must allow the clock mode to be changed between two
//! bytes of the same transaction (see the MUSIC controller in the `siab`
//! crate), which hardware SPI peripherals generally do not.
//!
//! [`SoftSpi`] implements [`SpiBitBang`] over any `embedded-hal` 1.0 pins.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Byte-wide bit-banged SPI master
///
/// Chip select is not part of this trait; callers drive it separately.
pub trait SpiBitBang {
    /// Error type
    type Error: core::fmt::Debug;

    /// Apply clock divider, bit order and mode
    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error>;

    /// Change the clock mode only; takes effect at the next byte
    fn set_mode(&mut self, mode: SpiMode);

    /// Shift one byte out on MOSI while shifting one byte in from MISO
    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error>;
}

/// SPI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// Clock divider relative to the CPU clock
    pub divider: ClockDivider,
    /// SPI mode (CPOL, CPHA)
    pub mode: SpiMode,
    /// Bit order
    pub bit_order: BitOrder,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            divider: ClockDivider::Div2,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// SPI modes (CPOL, CPHA)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiMode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Clock polarity (idle level high)
    pub const fn cpol(self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    /// Clock phase (sample on the trailing edge)
    pub const fn cpha(self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode3)
    }
}

/// Bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

/// Clock divider relative to a 16 MHz CPU clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivider {
    /// f/2
    Div2,
    /// f/4
    Div4,
    /// f/8
    Div8,
    /// f/16
    Div16,
    /// f/32
    Div32,
    /// f/64
    Div64,
    /// f/128
    Div128,
}

impl ClockDivider {
    /// Divider ratio
    pub const fn ratio(self) -> u32 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div32 => 32,
            Self::Div64 => 64,
            Self::Div128 => 128,
        }
    }

    /// Half clock period in nanoseconds (62.5 ns per CPU cycle)
    #[allow(clippy::arithmetic_side_effects)] // ratio <= 128, product fits easily
    pub const fn half_period_ns(self) -> u32 {
        self.ratio() * 125 / 4
    }
}

/// Error raised by [`SoftSpi`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SoftSpiError {
    /// Driving MOSI failed
    #[error("MOSI pin error")]
    Mosi,
    /// Sampling MISO failed
    #[error("MISO pin error")]
    Miso,
    /// Driving SCLK failed
    #[error("SCLK pin error")]
    Sclk,
}

/// Software SPI master over three GPIO lines
pub struct SoftSpi<MOSI, MISO, SCLK, D> {
    mosi: MOSI,
    miso: MISO,
    sclk: SCLK,
    delay: D,
    config: SpiConfig,
}

impl<MOSI, MISO, SCLK, D> SoftSpi<MOSI, MISO, SCLK, D>
where
    MOSI: OutputPin,
    MISO: InputPin,
    SCLK: OutputPin,
    D: DelayNs,
{
    /// Create a bus with the power-on configuration (f/2, mode 0, MSB first)
    pub fn new(mosi: MOSI, miso: MISO, sclk: SCLK, delay: D) -> Self {
        Self {
            mosi,
            miso,
            sclk,
            delay,
            config: SpiConfig::default(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> SpiConfig {
        self.config
    }

    /// Release the pins and delay provider
    pub fn release(self) -> (MOSI, MISO, SCLK, D) {
        (self.mosi, self.miso, self.sclk, self.delay)
    }

    fn clock(&mut self, high: bool) -> Result<(), SoftSpiError> {
        let res = if high {
            self.sclk.set_high()
        } else {
            self.sclk.set_low()
        };
        res.map_err(|_| SoftSpiError::Sclk)
    }
}

impl<MOSI, MISO, SCLK, D> SpiBitBang for SoftSpi<MOSI, MISO, SCLK, D>
where
    MOSI: OutputPin,
    MISO: InputPin,
    SCLK: OutputPin,
    D: DelayNs,
{
    type Error = SoftSpiError;

    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error> {
        self.config = config;
        // Park the clock at its idle level.
        self.clock(config.mode.cpol())
    }

    fn set_mode(&mut self, mode: SpiMode) {
        self.config.mode = mode;
    }

    #[allow(clippy::arithmetic_side_effects)] // u8 shifts by < 8 never panic
    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        let SpiConfig {
            divider,
            mode,
            bit_order,
        } = self.config;
        let (cpol, cpha) = (mode.cpol(), mode.cpha());
        let half = divider.half_period_ns();

        // Bits always leave LSB-index first; reverse for MSB-first order.
        let shifted = match bit_order {
            BitOrder::MsbFirst => byte.reverse_bits(),
            BitOrder::LsbFirst => byte,
        };

        if cpha {
            // Leading edge before the first bit so the first sample lands
            // on the trailing edge.
            self.clock(!cpol)?;
        }

        let mut out = 0u8;
        for bit in 0..8u8 {
            let res = if (shifted >> bit) & 1 == 1 {
                self.mosi.set_high()
            } else {
                self.mosi.set_low()
            };
            res.map_err(|_| SoftSpiError::Mosi)?;

            self.delay.delay_ns(half);

            let sampled = u8::from(self.miso.is_high().map_err(|_| SoftSpiError::Miso)?);
            out = match bit_order {
                BitOrder::MsbFirst => (out << 1) | sampled,
                BitOrder::LsbFirst => (out >> 1) | (sampled << 7),
            };

            // Sampling edge
            self.clock(if cpha { cpol } else { !cpol })?;
            self.delay.delay_ns(half);

            // Non-sampling edge; CPHA=1 leaves the clock at idle after bit 7
            if !(cpha && bit == 7) {
                self.clock(if cpha { !cpol } else { cpol })?;
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockDelay, MockWire};
    use proptest::prelude::*;

    fn loopback() -> (SoftSpi<MockWire, MockWire, MockWire, MockDelay>, MockWire) {
        let wire = MockWire::new();
        let sclk = MockWire::new();
        let spi = SoftSpi::new(wire.clone(), wire, sclk.clone(), MockDelay::new());
        (spi, sclk)
    }

    #[test]
    fn loopback_returns_the_sent_byte_msb_first() {
        let (mut spi, _) = loopback();
        assert_eq!(spi.transfer(0xA5).unwrap(), 0xA5);
        assert_eq!(spi.transfer(0x01).unwrap(), 0x01);
    }

    #[test]
    fn mode0_clocks_eight_pulses_and_idles_low() {
        let (mut spi, sclk) = loopback();
        spi.configure(SpiConfig::default()).unwrap();
        spi.transfer(0x3C).unwrap();
        assert_eq!(sclk.rising_edges(), 8);
        assert!(!sclk.level());
    }

    #[test]
    fn mode1_leaves_clock_idle_after_last_bit() {
        let (mut spi, sclk) = loopback();
        spi.configure(SpiConfig {
            mode: SpiMode::Mode1,
            ..SpiConfig::default()
        })
        .unwrap();
        spi.transfer(0xFF).unwrap();
        assert_eq!(sclk.rising_edges(), 8);
        assert!(!sclk.level());
    }

    #[test]
    fn transfer_spends_two_half_periods_per_bit() {
        let (mut spi, _) = loopback();
        spi.configure(SpiConfig {
            divider: ClockDivider::Div128,
            ..SpiConfig::default()
        })
        .unwrap();
        spi.transfer(0).unwrap();
        let (_, _, _, delay) = spi.release();
        assert_eq!(delay.elapsed_ns(), 16 * 4000);
    }

    proptest! {
        #[test]
        fn loopback_is_identity_in_every_mode_and_order(
            byte in any::<u8>(),
            mode in prop_oneof![
                Just(SpiMode::Mode0),
                Just(SpiMode::Mode1),
                Just(SpiMode::Mode2),
                Just(SpiMode::Mode3),
            ],
            lsb_first in any::<bool>(),
        ) {
            let (mut spi, _) = loopback();
            let bit_order = if lsb_first { BitOrder::LsbFirst } else { BitOrder::MsbFirst };
            spi.configure(SpiConfig { divider: ClockDivider::Div2, mode, bit_order }).unwrap();
            prop_assert_eq!(spi.transfer(byte).unwrap(), byte);
        }
    }

    #[test]
    fn mode_polarity_and_phase() {
        assert!(!SpiMode::Mode0.cpol() && !SpiMode::Mode0.cpha());
        assert!(!SpiMode::Mode1.cpol() && SpiMode::Mode1.cpha());
        assert!(SpiMode::Mode2.cpol() && !SpiMode::Mode2.cpha());
        assert!(SpiMode::Mode3.cpol() && SpiMode::Mode3.cpha());
    }

    #[test]
    fn half_period_scales_with_divider() {
        assert_eq!(ClockDivider::Div2.half_period_ns(), 62);
        assert_eq!(ClockDivider::Div128.half_period_ns(), 4000);
    }
}
