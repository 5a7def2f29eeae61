//! Shared test rigs
//!
//! - [`MockHardware`]: plain platform mocks, for dispatcher and session tests
//! - [`SimHardware`]: a MUSIC ASIC simulator wired to the analog lines, for
//!   calibration tests
//!
//! The simulator keeps one register file per chip and decodes frames on the
//! chip selected through the control port. Its outputs follow a simple
//! linear model:
//!
//! - digital channel: high iff VBG ≥ `vbg_min` and VTH ≥ `flip[ch]`
//! - single-ended analog: `2.5 V − 10 mV × VDC_SE`
//! - differential (A0..A3 when `diff_wired`): common mode
//!   `0.5 V + 10 mV × VCM`, then `− 4 mV × VDC` on both lines, with the
//!   negative line 1 V above the positive line

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use platform::mocks::{
    MockAdc, MockAnalog, MockDelay, MockEeprom, MockGpio, MockHvSwitch, MockSpi, MockSystem,
};
use platform::{
    AnalogLine, AnalogPort, GpioPort, OutputLine, PinState, SpiBitBang, SpiConfig, SpiMode,
};
use siab::board::{se_line, Board, Hardware, HG_LINES, LG_LINES};
use siab::calibration::vdc::V_LSB;
use siab::music::registers::{self, BIAS_VBG, BIAS_VDC_DIFF, BIAS_VDC_SE_VCM};
use siab::{AdcAcquisitionLoop, MusicChip, SiabConfig, SiabContext};

pub const EEPROM_SIZE: usize = 1024;

// ── Plain mocks ─────────────────────────────────────────────────────────────

pub struct MockHardware;

impl Hardware for MockHardware {
    type Gpio = MockGpio;
    type Spi = MockSpi;
    type Analog = MockAnalog;
    type Eeprom = MockEeprom;
    type Delay = MockDelay;
    type System = MockSystem;
    type Adc = MockAdc;
    type HvSwitch = MockHvSwitch;
}

pub type MockAcquisition = AdcAcquisitionLoop<MockAdc, MockHvSwitch>;

pub fn mock_board() -> Board<MockHardware> {
    Board {
        gpio: MockGpio::new(),
        spi: MockSpi::new(),
        analog: MockAnalog::new(),
        eeprom: MockEeprom::filled(EEPROM_SIZE, 0),
        delay: MockDelay::new(),
        system: MockSystem::new(),
    }
}

pub fn mock_acquisition() -> MockAcquisition {
    AdcAcquisitionLoop::new(MockAdc::new(), MockHvSwitch::new(), 400)
}

pub fn mock_context(acq: &MockAcquisition) -> SiabContext<'_, MockHardware> {
    SiabContext::new(mock_board(), acq, SiabConfig::default())
}

// ── MUSIC simulator ─────────────────────────────────────────────────────────

pub struct SimState {
    pub regs: [[u16; 128]; 2],
    selected: Option<usize>,
    phase: u8,
    addr: u8,
    reading: bool,
    msb: u8,
    /// Chip whose outputs reach the analog lines
    pub wired: usize,
    /// Lowest VBG code at which discriminators work
    pub vbg_min: u8,
    /// Threshold at which each channel's discriminator output goes high
    pub flip: [u16; 8],
    /// A0..A3 carry the differential outputs instead of single-ended ones
    pub diff_wired: bool,
    pub delay_ms: u64,
}

impl SimState {
    fn new() -> Self {
        Self {
            regs: [[0; 128]; 2],
            selected: None,
            phase: 0,
            addr: 0,
            reading: false,
            msb: 0,
            wired: 0,
            vbg_min: 0,
            flip: [256; 8],
            diff_wired: false,
            delay_ms: 0,
        }
    }

    fn reg(&self, addr: u8) -> u16 {
        self.regs[self.wired][usize::from(addr)]
    }

    /// Configure channel `ch` of the wired chip as an enabled digital output
    pub fn enable_digital(&mut self, ch: u8) {
        let w = self.wired;
        self.regs[w][usize::from(registers::input_stage(ch))] = registers::INPUT_STAGE_ENABLE;
        self.regs[w][usize::from(registers::channel(ch))] = registers::CHANNEL_EN_COMP_SW;
    }

    /// Configure channel `ch` of the wired chip as an enabled analog output
    pub fn enable_analog(&mut self, ch: u8) {
        let w = self.wired;
        self.regs[w][usize::from(registers::input_stage(ch))] = registers::INPUT_STAGE_ENABLE;
        self.regs[w][usize::from(registers::channel(ch))] = registers::CHANNEL_EN_DRV_SE;
    }

    pub fn vbg(&self) -> u8 {
        ((self.reg(BIAS_VBG) >> registers::VBG_SHIFT) & 0x07) as u8
    }

    pub fn threshold(&self, ch: usize) -> u16 {
        (self.reg(registers::channel(ch as u8)) >> registers::THRESHOLD_SHIFT)
            & registers::THRESHOLD_MAX
    }

    pub fn vdc_se(&self) -> u8 {
        (self.reg(BIAS_VDC_SE_VCM) >> 8) as u8
    }

    pub fn vcm(&self) -> u8 {
        (self.reg(BIAS_VDC_SE_VCM) & 0xFF) as u8
    }

    pub fn vdc_lg(&self) -> u8 {
        (self.reg(BIAS_VDC_DIFF) >> 8) as u8
    }

    pub fn vdc_hg(&self) -> u8 {
        (self.reg(BIAS_VDC_DIFF) & 0xFF) as u8
    }

    fn output_type(&self, ch: usize) -> Option<bool> {
        let input = self.reg(registers::input_stage(ch as u8));
        if input & registers::INPUT_STAGE_ENABLE == 0 {
            return None;
        }
        let conf = self.reg(registers::channel(ch as u8));
        if conf & registers::CHANNEL_EN_DRV_SE != 0 {
            Some(false)
        } else if conf & registers::CHANNEL_EN_COMP_SW != 0 {
            Some(true)
        } else {
            None
        }
    }

    fn digital_out(&self, ch: usize) -> bool {
        self.vbg() >= self.vbg_min && self.threshold(ch) >= self.flip[ch]
    }

    /// Differential line voltage, if `line` carries one
    fn diff_voltage(&self, line: AnalogLine) -> Option<f32> {
        if !self.diff_wired {
            return None;
        }
        let common = 0.5 + 0.01 * f32::from(self.vcm());
        let (code, negative) = if line == LG_LINES[0] {
            (self.vdc_lg(), false)
        } else if line == LG_LINES[1] {
            (self.vdc_lg(), true)
        } else if line == HG_LINES[0] {
            (self.vdc_hg(), false)
        } else if line == HG_LINES[1] {
            (self.vdc_hg(), true)
        } else {
            return None;
        };
        let v = common + 0.5 - 0.004 * f32::from(code);
        Some(if negative { v + 0.5 } else { v - 0.5 })
    }

    /// Voltage on `line`
    pub fn voltage(&self, line: AnalogLine) -> f32 {
        if let Some(v) = self.diff_voltage(line) {
            return v;
        }
        let Some(ch) = (0..8).find(|&ch| se_line(ch) == Some(line)) else {
            return 0.0;
        };
        match self.output_type(ch) {
            Some(true) => {
                if self.digital_out(ch) {
                    3.3
                } else {
                    0.0
                }
            }
            Some(false) => 2.5 - 0.01 * f32::from(self.vdc_se()),
            None => 0.0,
        }
    }

    /// Voltage as a 10-bit count
    pub fn counts(&self, line: AnalogLine) -> u16 {
        let c = (self.voltage(line) / V_LSB).round();
        c.clamp(0.0, 1023.0) as u16
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        let Some(chip) = self.selected else {
            return 0;
        };
        let current = self.regs[chip][usize::from(self.addr)];
        match self.phase {
            0 => {
                self.reading = byte & registers::READ_FLAG != 0;
                self.addr = byte & 0x7F;
                self.phase = 1;
                0
            }
            1 => {
                self.phase = 2;
                self.msb = byte;
                if self.reading {
                    (current >> 8) as u8
                } else {
                    0
                }
            }
            _ => {
                self.phase = 0;
                if self.reading {
                    (current & 0xFF) as u8
                } else {
                    self.regs[chip][usize::from(self.addr)] = u16::from_be_bytes([self.msb, byte]);
                    0
                }
            }
        }
    }
}

pub type Sim = Rc<RefCell<SimState>>;

pub struct SimGpio {
    sim: Sim,
    levels: [PinState; OutputLine::COUNT],
}

impl GpioPort for SimGpio {
    type Error = Infallible;

    fn set(&mut self, line: OutputLine, state: PinState) -> Result<(), Self::Error> {
        self.levels[line.index()] = state;
        let chip = match line {
            OutputLine::MusicCsBottom => Some(MusicChip::Bottom),
            OutputLine::MusicCsTop => Some(MusicChip::Top),
            _ => None,
        };
        if let Some(chip) = chip {
            let mut sim = self.sim.borrow_mut();
            if state == PinState::Low {
                sim.selected = Some(chip.index());
                sim.phase = 0;
            } else if sim.selected == Some(chip.index()) {
                sim.selected = None;
            }
        }
        Ok(())
    }

    fn get(&mut self, line: OutputLine) -> Result<PinState, Self::Error> {
        Ok(self.levels[line.index()])
    }

    fn read_status_port(&mut self) -> Result<u8, Self::Error> {
        Ok(0)
    }
}

pub struct SimSpi {
    sim: Sim,
    mode: SpiMode,
}

impl SpiBitBang for SimSpi {
    type Error = Infallible;

    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error> {
        self.mode = config.mode;
        Ok(())
    }

    fn set_mode(&mut self, mode: SpiMode) {
        self.mode = mode;
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        Ok(self.sim.borrow_mut().transfer(byte))
    }
}

pub struct SimAnalog {
    sim: Sim,
}

impl AnalogPort for SimAnalog {
    type Error = Infallible;

    fn read(&mut self, line: AnalogLine) -> Result<u16, Self::Error> {
        Ok(self.sim.borrow().counts(line))
    }

    fn is_high(&mut self, line: AnalogLine) -> Result<bool, Self::Error> {
        Ok(self.sim.borrow().voltage(line) > 1.65)
    }

    fn read_internal_temperature(&mut self) -> Result<u16, Self::Error> {
        Ok(0)
    }
}

pub struct SimHardware;

impl Hardware for SimHardware {
    type Gpio = SimGpio;
    type Spi = SimSpi;
    type Analog = SimAnalog;
    type Eeprom = MockEeprom;
    type Delay = MockDelay;
    type System = MockSystem;
    type Adc = MockAdc;
    type HvSwitch = MockHvSwitch;
}

pub fn sim_board() -> (Board<SimHardware>, Sim) {
    let sim = Rc::new(RefCell::new(SimState::new()));
    let board = Board {
        gpio: SimGpio {
            sim: Rc::clone(&sim),
            levels: [PinState::High; OutputLine::COUNT],
        },
        spi: SimSpi {
            sim: Rc::clone(&sim),
            mode: SpiMode::Mode1,
        },
        analog: SimAnalog {
            sim: Rc::clone(&sim),
        },
        eeprom: MockEeprom::filled(EEPROM_SIZE, 0),
        delay: MockDelay::new(),
        system: MockSystem::new(),
    };
    (board, sim)
}
