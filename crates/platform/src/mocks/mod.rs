//! Mock implementations for testing
//!
//! This module provides deterministic mock implementations of all platform
//! traits for use in unit and integration tests.

#![cfg(any(test, feature = "std"))]

use core::cell::Cell;
use core::convert::Infallible;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};
use embedded_storage::{ReadStorage, Storage};

use crate::adc::{AdcDevice, DataRate, ADC_CHANNELS, RESULT_LEN};
use crate::analog::{AnalogLine, AnalogPort};
use crate::gpio::{GpioPort, OutputLine, PinState};
use crate::spi::{SpiBitBang, SpiConfig, SpiMode};
use crate::storage::ERASED_BYTE;
use crate::system::SystemControl;

// ── GPIO ────────────────────────────────────────────────────────────────────

/// Mock control port
pub struct MockGpio {
    levels: [PinState; OutputLine::COUNT],
    writes: usize,
    /// Value returned by [`GpioPort::read_status_port`]
    pub status_port: u8,
}

impl MockGpio {
    /// Create a port with every line low
    pub fn new() -> Self {
        Self {
            levels: [PinState::Low; OutputLine::COUNT],
            writes: 0,
            status_port: 0,
        }
    }

    /// Level a line is driven to
    pub fn level(&self, line: OutputLine) -> PinState {
        self.levels
            .get(line.index())
            .copied()
            .unwrap_or(PinState::Low)
    }

    /// Number of `set` calls so far
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Default for MockGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioPort for MockGpio {
    type Error = Infallible;

    fn set(&mut self, line: OutputLine, state: PinState) -> Result<(), Self::Error> {
        if let Some(level) = self.levels.get_mut(line.index()) {
            *level = state;
        }
        self.writes += 1;
        Ok(())
    }

    fn get(&mut self, line: OutputLine) -> Result<PinState, Self::Error> {
        Ok(self.level(line))
    }

    fn read_status_port(&mut self) -> Result<u8, Self::Error> {
        Ok(self.status_port)
    }
}

// ── Analog inputs ───────────────────────────────────────────────────────────

/// Mock analog port with fixed per-line values
pub struct MockAnalog {
    values: [u16; AnalogLine::COUNT],
    digital: [bool; AnalogLine::COUNT],
    reads: usize,
    /// Value returned by [`AnalogPort::read_internal_temperature`]
    pub temperature: u16,
}

impl MockAnalog {
    /// Create a port reading zero everywhere
    pub fn new() -> Self {
        Self {
            values: [0; AnalogLine::COUNT],
            digital: [false; AnalogLine::COUNT],
            reads: 0,
            temperature: 0,
        }
    }

    /// Set the count returned for `line`
    pub fn set_value(&mut self, line: AnalogLine, value: u16) {
        if let Some(v) = self.values.get_mut(usize::from(line.index())) {
            *v = value;
        }
    }

    /// Set the digital level returned for `line`
    pub fn set_digital(&mut self, line: AnalogLine, high: bool) {
        if let Some(v) = self.digital.get_mut(usize::from(line.index())) {
            *v = high;
        }
    }

    /// Number of analog and digital reads so far
    pub fn read_count(&self) -> usize {
        self.reads
    }
}

impl Default for MockAnalog {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogPort for MockAnalog {
    type Error = Infallible;

    fn read(&mut self, line: AnalogLine) -> Result<u16, Self::Error> {
        self.reads += 1;
        Ok(self
            .values
            .get(usize::from(line.index()))
            .copied()
            .unwrap_or(0))
    }

    fn is_high(&mut self, line: AnalogLine) -> Result<bool, Self::Error> {
        self.reads += 1;
        Ok(self
            .digital
            .get(usize::from(line.index()))
            .copied()
            .unwrap_or(false))
    }

    fn read_internal_temperature(&mut self) -> Result<u16, Self::Error> {
        Ok(self.temperature)
    }
}

// ── Bit-banged SPI ──────────────────────────────────────────────────────────

/// Mock SPI bus backed by a register file
///
/// Models an ASIC speaking the three-byte register protocol: an address
/// byte (bit 7 set for reads) followed by two data bytes, MSB first.
/// Chip select is not observed; every third byte closes a frame.
///
/// Data bytes of a write are latched only when clocked in
/// [`SpiMode::Mode0`]. In any other mode the stored word is shifted left by
/// one bit, reproducing the ASIC's data-latch edge defect.
pub struct MockSpi {
    registers: [u16; 128],
    config: Option<SpiConfig>,
    mode: SpiMode,
    phase: u8,
    addr: u8,
    reading: bool,
    pending_msb: u8,
    msb_in_mode0: bool,
    log: Vec<(u8, SpiMode)>,
}

impl MockSpi {
    /// Create a bus whose registers all read zero
    pub fn new() -> Self {
        Self {
            registers: [0; 128],
            config: None,
            mode: SpiMode::Mode0,
            phase: 0,
            addr: 0,
            reading: false,
            pending_msb: 0,
            msb_in_mode0: false,
            log: Vec::new(),
        }
    }

    /// Register value
    pub fn register(&self, addr: u8) -> u16 {
        self.registers
            .get(usize::from(addr & 0x7F))
            .copied()
            .unwrap_or(0)
    }

    /// Preload a register
    pub fn set_register(&mut self, addr: u8, value: u16) {
        if let Some(reg) = self.registers.get_mut(usize::from(addr & 0x7F)) {
            *reg = value;
        }
    }

    /// Last configuration applied
    pub fn config(&self) -> Option<SpiConfig> {
        self.config
    }

    /// Current clock mode
    pub fn mode(&self) -> SpiMode {
        self.mode
    }

    /// Every byte sent so far with the mode it was clocked in
    pub fn transfers(&self) -> &[(u8, SpiMode)] {
        &self.log
    }
}

impl Default for MockSpi {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiBitBang for MockSpi {
    type Error = Infallible;

    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error> {
        self.config = Some(config);
        self.mode = config.mode;
        Ok(())
    }

    fn set_mode(&mut self, mode: SpiMode) {
        self.mode = mode;
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.log.push((byte, self.mode));
        let current = self.register(self.addr);
        let [msb, lsb] = current.to_be_bytes();
        match self.phase {
            0 => {
                self.reading = byte & 0x80 != 0;
                self.addr = byte & 0x7F;
                self.phase = 1;
                Ok(0)
            }
            1 => {
                self.phase = 2;
                if self.reading {
                    Ok(msb)
                } else {
                    self.pending_msb = byte;
                    self.msb_in_mode0 = self.mode == SpiMode::Mode0;
                    Ok(0)
                }
            }
            _ => {
                self.phase = 0;
                if self.reading {
                    Ok(lsb)
                } else {
                    let value = u16::from_be_bytes([self.pending_msb, byte]);
                    let latched = if self.msb_in_mode0 && self.mode == SpiMode::Mode0 {
                        value
                    } else {
                        value << 1
                    };
                    self.set_register(self.addr, latched);
                    Ok(0)
                }
            }
        }
    }
}

// ── Continuous ADC ──────────────────────────────────────────────────────────

/// Mock continuous ADC with a queue of result words
pub struct MockAdc {
    results: VecDeque<[u8; RESULT_LEN]>,
    routing: [Option<u8>; ADC_CHANNELS],
    rate: Option<DataRate>,
    continuous: bool,
    interrupt: bool,
    resets: usize,
    /// Value returned by [`AdcDevice::is_valid_id`]
    pub valid_id: bool,
}

/// Error raised by [`MockAdc`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAdcError {
    /// No result word queued
    Empty,
    /// Channel number above 15
    BadChannel,
}

impl MockAdc {
    /// Create a converter with an empty result queue
    pub fn new() -> Self {
        Self {
            results: VecDeque::new(),
            routing: [None; ADC_CHANNELS],
            rate: None,
            continuous: false,
            interrupt: false,
            resets: 0,
            valid_id: true,
        }
    }

    /// Queue a raw result word
    pub fn push_result(&mut self, word: [u8; RESULT_LEN]) {
        self.results.push_back(word);
    }

    /// Queue an error-free 24-bit sample for `channel`
    pub fn push_sample(&mut self, channel: u8, sample: u32) {
        let [_, b0, b1, b2] = sample.to_be_bytes();
        self.push_result([b0, b1, b2, channel & 0x0F]);
    }

    /// Input routed to `channel`, if configured
    pub fn routing(&self, channel: u8) -> Option<u8> {
        self.routing.get(usize::from(channel)).copied().flatten()
    }

    /// Filter rate of the last setup
    pub fn rate(&self) -> Option<DataRate> {
        self.rate
    }

    /// Whether continuous conversion was started
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Whether the conversion-ready interrupt is attached
    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt
    }

    /// Number of resets
    pub fn reset_count(&self) -> usize {
        self.resets
    }
}

impl Default for MockAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcDevice for MockAdc {
    type Error = MockAdcError;

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.resets += 1;
        self.continuous = false;
        Ok(())
    }

    fn is_valid_id(&mut self) -> Result<bool, Self::Error> {
        Ok(self.valid_id)
    }

    fn configure_channel(&mut self, channel: u8, input: u8) -> Result<(), Self::Error> {
        let slot = self
            .routing
            .get_mut(usize::from(channel))
            .ok_or(MockAdcError::BadChannel)?;
        *slot = Some(input);
        Ok(())
    }

    fn configure_setup(&mut self, rate: DataRate) -> Result<(), Self::Error> {
        self.rate = Some(rate);
        Ok(())
    }

    fn start_continuous(&mut self) -> Result<(), Self::Error> {
        self.continuous = true;
        Ok(())
    }

    fn set_data_ready_interrupt(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.interrupt = enabled;
        Ok(())
    }

    fn read_result(&mut self) -> Result<[u8; RESULT_LEN], Self::Error> {
        self.results.pop_front().ok_or(MockAdcError::Empty)
    }
}

// ── EEPROM ──────────────────────────────────────────────────────────────────

/// Mock EEPROM that counts physical byte writes
pub struct MockEeprom {
    cells: Vec<u8>,
    writes: usize,
}

/// Error raised by [`MockEeprom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEepromError {
    /// Access past the end of the device
    OutOfBounds,
}

impl MockEeprom {
    /// Create an erased device (every cell 0xFF)
    pub fn new(capacity: usize) -> Self {
        Self::filled(capacity, ERASED_BYTE)
    }

    /// Create a device with every cell set to `value`
    pub fn filled(capacity: usize, value: u8) -> Self {
        Self {
            cells: vec![value; capacity],
            writes: 0,
        }
    }

    /// Number of bytes physically programmed so far
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Zero the write counter
    pub fn reset_write_count(&mut self) {
        self.writes = 0;
    }

    /// Raw cell contents
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, MockEepromError> {
        let start = usize::try_from(offset).map_err(|_| MockEepromError::OutOfBounds)?;
        let end = start.checked_add(len).ok_or(MockEepromError::OutOfBounds)?;
        if end > self.cells.len() {
            return Err(MockEepromError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ReadStorage for MockEeprom {
    type Error = MockEepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        let src = self.cells.get(range).ok_or(MockEepromError::OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }
}

impl Storage for MockEeprom {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        let dst = self
            .cells
            .get_mut(range)
            .ok_or(MockEepromError::OutOfBounds)?;
        dst.copy_from_slice(bytes);
        self.writes += bytes.len();
        Ok(())
    }
}

// ── Delay / system ──────────────────────────────────────────────────────────

/// Mock delay that only accumulates the requested time
#[derive(Default)]
pub struct MockDelay {
    elapsed_ns: u64,
}

impl MockDelay {
    /// Create a delay with zero elapsed time
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requested delay in nanoseconds
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns = self.elapsed_ns.saturating_add(u64::from(ns));
    }
}

/// Mock system control
#[derive(Default)]
pub struct MockSystem {
    resets: usize,
}

impl MockSystem {
    /// Create a system with no recorded resets
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of soft resets requested
    pub fn reset_count(&self) -> usize {
        self.resets
    }
}

impl SystemControl for MockSystem {
    type Error = Infallible;

    fn soft_reset(&mut self) -> Result<(), Self::Error> {
        self.resets += 1;
        Ok(())
    }
}

// ── Pins ────────────────────────────────────────────────────────────────────

/// Mock HV enable switch
#[derive(Default)]
pub struct MockHvSwitch {
    high: bool,
    falls: usize,
}

impl MockHvSwitch {
    /// Create a switch that starts low (HV off)
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether HV is on
    pub fn is_on(&self) -> bool {
        self.high
    }

    /// Number of high-to-low transitions
    pub fn fall_count(&self) -> usize {
        self.falls
    }
}

impl ErrorType for MockHvSwitch {
    type Error = Infallible;
}

impl OutputPin for MockHvSwitch {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.high {
            self.falls += 1;
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}

impl StatefulOutputPin for MockHvSwitch {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

#[derive(Default)]
struct WireState {
    level: Cell<bool>,
    rises: Cell<usize>,
    falls: Cell<usize>,
}

/// Shared wire: every clone observes the same level
///
/// Usable as both an output and an input, e.g. to loop MOSI back to MISO.
#[derive(Clone, Default)]
pub struct MockWire {
    state: Rc<WireState>,
}

impl MockWire {
    /// Create a wire at logic low
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level
    pub fn level(&self) -> bool {
        self.state.level.get()
    }

    /// Number of low-to-high transitions
    pub fn rising_edges(&self) -> usize {
        self.state.rises.get()
    }

    /// Number of high-to-low transitions
    pub fn falling_edges(&self) -> usize {
        self.state.falls.get()
    }

    fn drive(&self, high: bool) {
        let was = self.state.level.replace(high);
        if high && !was {
            self.state.rises.set(self.state.rises.get().saturating_add(1));
        } else if !high && was {
            self.state.falls.set(self.state.falls.get().saturating_add(1));
        }
    }
}

impl ErrorType for MockWire {
    type Error = Infallible;
}

impl OutputPin for MockWire {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

impl InputPin for MockWire {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::EepromDevice;

    #[test]
    fn mock_spi_round_trips_mode0_writes() {
        let mut spi = MockSpi::new();
        spi.set_mode(SpiMode::Mode0);
        for b in [0x21, 0xAB, 0xCD] {
            spi.transfer(b).unwrap();
        }
        assert_eq!(spi.register(0x21), 0xABCD);
        assert_eq!(spi.transfer(0x21 | 0x80).unwrap(), 0);
        assert_eq!(spi.transfer(0).unwrap(), 0xAB);
        assert_eq!(spi.transfer(0).unwrap(), 0xCD);
    }

    #[test]
    fn mock_spi_corrupts_mode1_data() {
        let mut spi = MockSpi::new();
        spi.set_mode(SpiMode::Mode1);
        for b in [0x08, 0x00, 0x01] {
            spi.transfer(b).unwrap();
        }
        assert_eq!(spi.register(0x08), 0x0002);
    }

    #[test]
    fn mock_eeprom_counts_physical_writes() {
        let mut eeprom = MockEeprom::new(16);
        assert_eq!(eeprom.read_byte(3).unwrap(), 0xFF);
        eeprom.write_byte(3, 0x42).unwrap();
        assert_eq!(eeprom.read_byte(3).unwrap(), 0x42);
        assert_eq!(eeprom.write_count(), 1);
        assert!(eeprom.write_byte(16, 0).is_err());
    }

    #[test]
    fn mock_hv_switch_counts_falls_only_from_high() {
        let mut hv = MockHvSwitch::new();
        hv.set_low().unwrap();
        assert_eq!(hv.fall_count(), 0);
        hv.set_high().unwrap();
        hv.set_low().unwrap();
        hv.set_low().unwrap();
        assert_eq!(hv.fall_count(), 1);
    }
}
