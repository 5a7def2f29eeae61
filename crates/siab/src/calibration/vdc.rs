//! DC-level calibration of the analog outputs
//!
//! Every search walks an 8-bit code upward with an adaptive step: program
//! the code, settle 1 ms, average `n` reads of the relevant line(s) and
//! compare against a target voltage. A higher VDC code lowers the output.
//!
//! | Search         | Stops when           | Steps (by error)          |
//! |----------------|----------------------|---------------------------|
//! | single-ended   | error changes sign   | 25 / 5 / 1 at >1, >0.3 V  |
//! | common-mode    | error stops shrinking| 10 / 5 / 1 at >0.2, >0.1 V|
//! | diff. sum      | error stops shrinking| 50 / 5 / 1 at >0.5, >0.1 V|
//!
//! Each returns the counter minus two, which with unit steps is the code
//! one before the stopping code.

#![allow(clippy::cast_precision_loss)] // 10-bit counts and small sample counts

use embedded_hal::delay::DelayNs;
use libm::fabsf;
use platform::{AnalogLine, AnalogPort};

use super::MusicCalibrator;
use crate::board::{se_line, Hardware, HG_LINES, LG_LINES};
use crate::error::{Result, SiabError};
use crate::music::registers::{BIAS_VDC_DIFF, BIAS_VDC_SE_VCM};

/// Volts per count of the MCU converter
pub const V_LSB: f32 = 0.003_225_8;

/// Single-ended output target
pub const SE_TARGET_V: f32 = 0.3;

/// Acceptable distance from [`SE_TARGET_V`] after calibration
pub const SE_TOLERANCE_V: f32 = 0.05;

/// Common-mode target
pub const VCM_TARGET_V: f32 = 1.4;

/// Differential positive-line target
pub const SUM_POS_TARGET_V: f32 = 0.9;

/// Differential negative-line target
pub const SUM_NEG_TARGET_V: f32 = 1.9;

/// Swing (counts) between code extremes that proves a line is wired
pub const MIN_CORNER_SWING: i32 = 100;

/// Swing (counts) above which a disconnected line is reported as marginal
pub const MARGINAL_CORNER_SWING: i32 = 50;

/// Settle after driving a code extreme
pub const CORNER_SETTLE_MS: u32 = 10;

/// Settle after each search step
pub const STEP_SETTLE_MS: u32 = 1;

/// Largest DC code
const CODE_MAX: u16 = 0xFF;

/// Error value a search starts from
const INITIAL_ERROR: f32 = 1000.0;

/// DC-level output family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VdcOutput {
    /// Single-ended outputs (high byte of 0x21)
    SingleEnded,
    /// Low-gain differential output (high byte of 0x20)
    LowGain,
    /// High-gain differential output (low byte of 0x20)
    HighGain,
}

impl VdcOutput {
    /// Bias register and whether the code sits in its high byte
    const fn field(self) -> (u8, bool) {
        match self {
            Self::SingleEnded => (BIAS_VDC_SE_VCM, true),
            Self::LowGain => (BIAS_VDC_DIFF, true),
            Self::HighGain => (BIAS_VDC_DIFF, false),
        }
    }

    /// Short name for log lines
    pub const fn name(self) -> &'static str {
        match self {
            Self::SingleEnded => "SE",
            Self::LowGain => "LG",
            Self::HighGain => "HG",
        }
    }
}

/// Codes found by a full DC-level calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VdcCalibration {
    /// Single-ended VDC, if any analog channel was connected
    pub se: Option<u8>,
    /// Common-mode voltage, if a differential pair was connected
    pub vcm: Option<u8>,
    /// Low-gain VDC, if the low-gain pair was connected
    pub lg: Option<u8>,
    /// High-gain VDC, if the high-gain pair was connected
    pub hg: Option<u8>,
}

impl VdcCalibration {
    /// Bit 0..=3 set for each of se, vcm, lg, hg that was calibrated
    pub fn flags(&self) -> u8 {
        [self.se, self.vcm, self.lg, self.hg]
            .iter()
            .enumerate()
            .filter(|(_, code)| code.is_some())
            .fold(0u8, |acc, (bit, _)| acc | (1 << bit))
    }
}

impl<H: Hardware> MusicCalibrator<'_, H> {
    /// Full DC-level calibration: discovery, single-ended, common-mode,
    /// then both differential sums
    ///
    /// Every code found is programmed before the next search starts.
    pub fn vdc_calib(&mut self, n: u16) -> Result<VdcCalibration> {
        self.check_enabled_channels(false)?;
        self.discover_vdc_outputs()?;
        let state = self.state;
        let mut result = VdcCalibration::default();

        if state.any_enabled() {
            let code = self.vdc_se_calib(n)?;
            self.set_vdc(VdcOutput::SingleEnded, code)?;
            info!("RESULT MUSIC {} VDC_SE: {}", self.chip.name(), code);
            result.se = Some(code);
        }
        if state.lg_connected || state.hg_connected {
            let code = self.vcm_calib(n)?;
            self.set_vcm(code)?;
            info!("RESULT MUSIC {} VCM: {}", self.chip.name(), code);
            result.vcm = Some(code);
        }
        if state.lg_connected {
            let code = self.vdc_sum_calib(VdcOutput::LowGain, n)?;
            self.set_vdc(VdcOutput::LowGain, code)?;
            info!("RESULT MUSIC {} VDC_LG: {}", self.chip.name(), code);
            result.lg = Some(code);
        }
        if state.hg_connected {
            let code = self.vdc_sum_calib(VdcOutput::HighGain, n)?;
            self.set_vdc(VdcOutput::HighGain, code)?;
            info!("RESULT MUSIC {} VDC_HG: {}", self.chip.name(), code);
            result.hg = Some(code);
        }
        Ok(result)
    }

    /// Probe which analog outputs are wired to the MCU
    ///
    /// Enabled single-ended channels whose line does not swing are disabled.
    /// A differential pair counts as connected only if both lines swing.
    pub fn discover_vdc_outputs(&mut self) -> Result<()> {
        let state = self.state;
        for ch in state.enabled() {
            let line = se_line(ch).ok_or(SiabError::InvalidChannel(super::channel_id(ch)))?;
            let connected = self.check_vdc_corners(VdcOutput::SingleEnded, line)?;
            if let Some(c) = self.state.channels.get_mut(ch) {
                c.connected = connected;
                c.enabled = connected;
            }
        }

        // Probe every line of a pair even after one fails so marginal
        // wiring is reported for both.
        let mut lg = true;
        for line in LG_LINES {
            lg &= self.check_vdc_corners(VdcOutput::LowGain, line)?;
        }
        let mut hg = true;
        for line in HG_LINES {
            hg &= self.check_vdc_corners(VdcOutput::HighGain, line)?;
        }
        self.state.lg_connected = lg;
        self.state.hg_connected = hg;

        info!("MUSIC {} connected outputs:", self.chip.name());
        for (ch, c) in self.state.channels.iter().enumerate() {
            if c.connected {
                info!("  SE ch{}", ch);
            }
        }
        info!("  LG pair: {}", lg);
        info!("  HG pair: {}", hg);
        Ok(())
    }

    /// Drive `output` to both code extremes and check `line` swings
    pub fn check_vdc_corners(&mut self, output: VdcOutput, line: AnalogLine) -> Result<bool> {
        self.set_vdc(output, 0xFF)?;
        self.board.delay.delay_ms(CORNER_SETTLE_MS);
        let low = self.read_line(line)?;
        self.set_vdc(output, 0x00)?;
        self.board.delay.delay_ms(CORNER_SETTLE_MS);
        let high = self.read_line(line)?;

        let swing = i32::from(high).saturating_sub(i32::from(low));
        let connected = swing > MIN_CORNER_SWING;
        if !connected && swing > MARGINAL_CORNER_SWING {
            warn!(
                "MUSIC {} {} on A{}: swing of {} counts, check wiring",
                self.chip.name(),
                output.name(),
                line.index(),
                swing
            );
        }
        Ok(connected)
    }

    /// Mean of `n` reads of `line`, in volts
    pub fn vdc_meas_avg(&mut self, line: AnalogLine, n: u16) -> Result<f32> {
        let n = n.max(1);
        let mut sum: u32 = 0;
        for _ in 0..n {
            sum = sum.saturating_add(u32::from(self.read_line(line)?));
        }
        Ok(sum as f32 * V_LSB / f32::from(n))
    }

    /// Single-ended search: step up while the mean of the enabled channels
    /// sits above [`SE_TARGET_V`]
    pub fn vdc_se_calib(&mut self, n: u16) -> Result<u8> {
        let state = self.state;
        let mut code: u16 = 0;
        let mut above = true;
        let mut was_above = true;
        while above == was_above && code <= CODE_MAX {
            was_above = above;
            self.set_vdc(VdcOutput::SingleEnded, code_byte(code))?;
            self.board.delay.delay_ms(STEP_SETTLE_MS);

            let mut total = 0.0f32;
            let mut count = 0u8;
            for ch in state.enabled() {
                let line = se_line(ch).ok_or(SiabError::InvalidChannel(super::channel_id(ch)))?;
                total += self.vdc_meas_avg(line, n)?;
                count = count.saturating_add(1);
            }
            let mean = if count == 0 { 0.0 } else { total / f32::from(count) };
            let err = mean - SE_TARGET_V;
            trace!("VDC_SE {}: error {} mV", code, millivolts(err));

            above = err > 0.0;
            code = code.saturating_add(step(fabsf(err), [(1.0, 25), (0.3, 5)]));
        }
        Ok(result_code(code))
    }

    /// Common-mode search on whichever differential pairs are connected
    ///
    /// Both differential VDC codes are parked at 0xFF first.
    pub fn vcm_calib(&mut self, n: u16) -> Result<u8> {
        self.set_vdc(VdcOutput::LowGain, 0xFF)?;
        self.set_vdc(VdcOutput::HighGain, 0xFF)?;
        let state = self.state;

        let mut code: u16 = 0;
        let mut prev_err = INITIAL_ERROR;
        while code <= CODE_MAX {
            self.set_vcm(code_byte(code))?;
            self.board.delay.delay_ms(STEP_SETTLE_MS);

            let mut total = 0.0f32;
            let mut lines = 0u8;
            for (connected, pair) in [(state.lg_connected, LG_LINES), (state.hg_connected, HG_LINES)] {
                if !connected {
                    continue;
                }
                for line in pair {
                    total += self.vdc_meas_avg(line, n)?;
                    lines = lines.saturating_add(1);
                }
            }
            let mean = if lines == 0 { 0.0 } else { total / f32::from(lines) };
            let err = fabsf(mean - VCM_TARGET_V);
            trace!("VCM {}: error {} mV", code, millivolts(err));

            code = code.saturating_add(step(err, [(0.2, 10), (0.1, 5)]));
            if err >= prev_err {
                break;
            }
            prev_err = err;
        }
        Ok(result_code(code))
    }

    /// Differential-sum search for the low- or high-gain pair
    pub fn vdc_sum_calib(&mut self, output: VdcOutput, n: u16) -> Result<u8> {
        let [pos, neg] = match output {
            VdcOutput::LowGain => LG_LINES,
            VdcOutput::HighGain => HG_LINES,
            VdcOutput::SingleEnded => return Err(SiabError::InvalidChannel(0)),
        };

        let mut code: u16 = 0;
        let mut prev_err = INITIAL_ERROR;
        while code <= CODE_MAX {
            self.set_vdc(output, code_byte(code))?;
            self.board.delay.delay_ms(STEP_SETTLE_MS);
            let p = self.vdc_meas_avg(pos, n)?;
            let m = self.vdc_meas_avg(neg, n)?;
            let err = sum_error(p, m);
            trace!("VDC_{} {}: error {} mV", output.name(), code, millivolts(err));

            code = code.saturating_add(step(err, [(0.5, 50), (0.1, 5)]));
            if err >= prev_err {
                break;
            }
            prev_err = err;
        }
        Ok(result_code(code))
    }

    /// Program a VDC code (read-modify-write of its bias byte)
    pub fn set_vdc(&mut self, output: VdcOutput, code: u8) -> Result<()> {
        let (addr, high_byte) = output.field();
        self.set_bias_byte(addr, high_byte, code)
    }

    /// Program the common-mode code
    pub fn set_vcm(&mut self, code: u8) -> Result<()> {
        self.set_bias_byte(BIAS_VDC_SE_VCM, false, code)
    }

    fn set_bias_byte(&mut self, addr: u8, high_byte: bool, code: u8) -> Result<()> {
        let chip = self.chip;
        let [hi, lo] = self.bus().read(chip, addr)?.to_be_bytes();
        let value = if high_byte {
            u16::from_be_bytes([code, lo])
        } else {
            u16::from_be_bytes([hi, code])
        };
        self.bus().write_verified(chip, addr, value, false)?;
        Ok(())
    }

    fn read_line(&mut self, line: AnalogLine) -> Result<u16> {
        self.board.analog.read(line).map_err(|_| SiabError::Analog)
    }
}

/// Step for `err`: the first `(limit, step)` whose limit `err` exceeds,
/// else 1
fn step(err: f32, schedule: [(f32, u16); 2]) -> u16 {
    schedule
        .iter()
        .find(|(limit, _)| err > *limit)
        .map_or(1, |(_, s)| *s)
}

fn result_code(counter: u16) -> u8 {
    code_byte(counter.saturating_sub(2))
}

fn code_byte(code: u16) -> u8 {
    u8::try_from(code).unwrap_or(u8::MAX)
}

/// Worst deviation of a differential pair from its two targets
fn sum_error(pos: f32, neg: f32) -> f32 {
    fabsf(pos - SUM_POS_TARGET_V).max(fabsf(neg - SUM_NEG_TARGET_V))
}

#[allow(clippy::cast_possible_truncation)] // log value only
fn millivolts(v: f32) -> i32 {
    (v * 1000.0) as i32
}
