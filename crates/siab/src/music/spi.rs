//! MUSIC register transactions over the soft-SPI bus
//!
//! # Frame format
//!
//! ```text
//! CS ‾‾\____________________________________________/‾‾
//!        [ addr (|0x80 for read) ] [ data MSB ] [ data LSB ]
//!                     ↑ 100 µs ↑          ↑ 100 µs ↑      ↑ 100 µs
//! ```
//!
//! # Data-latch defect
//!
//! The ASIC decodes the address on the falling SCLK edge (SPI mode 1) but
//! latches write data on the rising edge. Writes therefore clock the address
//! byte in mode 1, switch to mode 0 for the two data bytes, and switch back
//! to mode 1 before releasing chip select. Reads stay in mode 1 throughout.
//! Skipping the switch does not fail on the bus; the register simply ends up
//! holding a shifted value.

use embedded_hal::delay::DelayNs;
use platform::{BitOrder, ClockDivider, GpioPort, PinState, SpiBitBang, SpiConfig, SpiMode};

use super::registers::READ_FLAG;
use super::MusicChip;
use crate::error::{Result, SiabError};

/// Settle time after every byte of a transaction
pub const SETTLE_US: u32 = 100;

/// Bus mode outside the data phase of a write
pub const IDLE_MODE: SpiMode = SpiMode::Mode1;

/// Mode the ASIC latches write data in
pub const DATA_LATCH_MODE: SpiMode = SpiMode::Mode0;

/// Outcome of a verified write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteCheck {
    /// Register address
    pub addr: u8,
    /// Value written
    pub written: u16,
    /// Value read back immediately afterwards
    pub read_back: u16,
}

impl WriteCheck {
    /// Whether the register holds what was written
    pub const fn is_ok(&self) -> bool {
        self.written == self.read_back
    }
}

/// Register-level access to the MUSIC ASICs
///
/// Borrows the bus, the control port (for chip selects) and a delay for the
/// duration of one or more transactions.
pub struct MusicSpi<'a, S, G, D> {
    spi: &'a mut S,
    gpio: &'a mut G,
    delay: &'a mut D,
    debug: bool,
}

impl<'a, S, G, D> MusicSpi<'a, S, G, D>
where
    S: SpiBitBang,
    G: GpioPort,
    D: DelayNs,
{
    /// Borrow the bus; `debug` logs every transaction
    pub fn new(spi: &'a mut S, gpio: &'a mut G, delay: &'a mut D, debug: bool) -> Self {
        Self {
            spi,
            gpio,
            delay,
            debug,
        }
    }

    /// Configure the bus (MSB first, mode 1) and deselect both ASICs
    pub fn init(&mut self, divider: ClockDivider) -> Result<()> {
        info!("MUSIC SPI init, debug mode: {}", self.debug);
        self.spi
            .configure(SpiConfig {
                divider,
                mode: IDLE_MODE,
                bit_order: BitOrder::MsbFirst,
            })
            .map_err(|_| SiabError::Spi)?;
        for chip in MusicChip::ALL {
            self.select(chip, false)?;
        }
        Ok(())
    }

    /// Write `data` to register `addr`
    pub fn write(&mut self, chip: MusicChip, addr: u8, data: u16) -> Result<()> {
        let [msb, lsb] = data.to_be_bytes();
        self.framed(chip, |bus| {
            bus.shift(addr)?;
            bus.spi.set_mode(DATA_LATCH_MODE);
            let data_phase = bus.shift(msb).and_then(|()| bus.shift(lsb));
            bus.spi.set_mode(IDLE_MODE);
            data_phase
        })?;
        if self.debug {
            debug!("write {} SPI@{:#x}: {:#x}", chip.name(), addr, data);
        }
        Ok(())
    }

    /// Read register `addr`
    pub fn read(&mut self, chip: MusicChip, addr: u8) -> Result<u16> {
        let value = self.framed(chip, |bus| {
            bus.shift(addr | READ_FLAG)?;
            let msb = bus.exchange(0x00)?;
            let lsb = bus.exchange(0x00)?;
            Ok(u16::from_be_bytes([msb, lsb]))
        })?;
        if self.debug {
            debug!("read {} SPI@{:#x}: {:#x}", chip.name(), addr, value);
        }
        Ok(value)
    }

    /// Write, then read the same register back
    ///
    /// A mismatch is logged but not returned as an error; callers decide
    /// from [`WriteCheck::is_ok`]. `report` also logs successful writes.
    pub fn write_verified(
        &mut self,
        chip: MusicChip,
        addr: u8,
        data: u16,
        report: bool,
    ) -> Result<WriteCheck> {
        self.write(chip, addr, data)?;
        let read_back = self.read(chip, addr)?;
        let check = WriteCheck {
            addr,
            written: data,
            read_back,
        };
        if report {
            info!(
                "SPI@{:#x} data {:#x} {}",
                addr,
                data,
                if check.is_ok() { "(OK)" } else { "(FAIL)" }
            );
        }
        if !check.is_ok() {
            error!("SPI@{:#x} read back {:#x}, expected {:#x}", addr, read_back, data);
        }
        Ok(check)
    }

    /// Block for `ms` milliseconds
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Run `body` with `chip` selected; chip select is released even when
    /// `body` fails.
    fn framed<T>(
        &mut self,
        chip: MusicChip,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.select(chip, true)?;
        let result = body(self);
        let released = self.select(chip, false);
        let value = result?;
        released?;
        Ok(value)
    }

    fn select(&mut self, chip: MusicChip, selected: bool) -> Result<()> {
        // Active low
        let level = PinState::from(!selected);
        self.gpio
            .set(chip.cs_line(), level)
            .map_err(|_| SiabError::Gpio)
    }

    /// Send a byte, ignore MISO, settle
    fn shift(&mut self, byte: u8) -> Result<()> {
        self.exchange(byte).map(|_| ())
    }

    /// Send a byte, return MISO, settle
    fn exchange(&mut self, byte: u8) -> Result<u8> {
        let rx = self.spi.transfer(byte).map_err(|_| SiabError::Spi)?;
        self.delay.delay_us(SETTLE_US);
        Ok(rx)
    }
}
