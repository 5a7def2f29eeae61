//! MUSIC calibration engine
//!
//! A calibration run borrows the board for its whole duration and is
//! strictly sequential: channel discovery, then either the discriminator
//! scan ([`threshold`]) or the DC-level searches ([`vdc`]). Nothing here is
//! persisted; the dispatcher stores results explicitly.
//!
//! Runs block for tens to hundreds of milliseconds. Every search is bounded
//! by its code range (VBG 0..8, VTH 0..=511, DC codes 0..=255).

pub mod threshold;
pub mod vdc;

pub use threshold::ThresholdScanResult;
pub use vdc::{VdcCalibration, VdcOutput};

use platform::{AnalogPort, DIGITAL_THRESHOLD};

use crate::board::{se_line, Board, Hardware};
use crate::error::{Result, SiabError};
use crate::music::registers::{
    self, CHANNELS, CHANNEL_EN_COMP_SW, CHANNEL_EN_DRV_SE, INPUT_STAGE_ENABLE,
};
use crate::music::{MusicChip, MusicSpi};

/// Output configuration of a single-ended channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputType {
    /// Discriminator drives the output
    Digital,
    /// Analog driver enabled
    Analog,
    /// Neither configuration
    #[default]
    Misconfigured,
}

impl OutputType {
    /// Classify a channel register value
    pub const fn classify(channel_reg: u16) -> Self {
        if channel_reg & (CHANNEL_EN_DRV_SE | CHANNEL_EN_COMP_SW) == CHANNEL_EN_COMP_SW {
            Self::Digital
        } else if channel_reg & CHANNEL_EN_DRV_SE != 0 {
            Self::Analog
        } else {
            Self::Misconfigured
        }
    }

    /// Short name for log lines
    pub const fn name(self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Analog => "analog",
            Self::Misconfigured => "misconfigured",
        }
    }
}

/// Per-channel result of discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    /// Enabled and configured for the current phase
    pub enabled: bool,
    /// Output configuration read from the ASIC
    pub output: OutputType,
    /// Output swing observed on its analog line
    pub connected: bool,
}

/// Discovery state of one calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelCalibrationState {
    /// Single-ended channels 0..=7
    pub channels: [ChannelState; 8],
    /// Both low-gain differential lines swing
    pub lg_connected: bool,
    /// Both high-gain differential lines swing
    pub hg_connected: bool,
}

impl ChannelCalibrationState {
    /// Indices of enabled channels
    pub fn enabled(&self) -> impl Iterator<Item = usize> + '_ {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled)
            .map(|(i, _)| i)
    }

    /// Whether any channel is enabled
    pub fn any_enabled(&self) -> bool {
        self.channels.iter().any(|c| c.enabled)
    }
}

/// Calibration run on one ASIC
pub struct MusicCalibrator<'a, H: Hardware> {
    board: &'a mut Board<H>,
    chip: MusicChip,
    debug: bool,
    state: ChannelCalibrationState,
}

impl<'a, H: Hardware> MusicCalibrator<'a, H> {
    /// Start a run on `chip`; `debug` traces every SPI transaction
    pub fn new(board: &'a mut Board<H>, chip: MusicChip, debug: bool) -> Self {
        Self {
            board,
            chip,
            debug,
            state: ChannelCalibrationState::default(),
        }
    }

    /// Discovery state so far
    pub fn state(&self) -> &ChannelCalibrationState {
        &self.state
    }

    /// Classify every channel and mark the ones usable in this phase
    ///
    /// A channel is enabled when its input-stage enable bit is set and its
    /// output is digital (`digital_only`) or analog (otherwise).
    pub fn check_enabled_channels(&mut self, digital_only: bool) -> Result<()> {
        let chip = self.chip;
        let wanted = if digital_only {
            OutputType::Digital
        } else {
            OutputType::Analog
        };
        for ch in 0..CHANNELS {
            let input = self.bus().read(chip, registers::input_stage(ch))?;
            let conf = self.bus().read(chip, registers::channel(ch))?;
            let output = OutputType::classify(conf);
            let enabled = input & INPUT_STAGE_ENABLE != 0 && output == wanted;
            if let Some(state) = self.state.channels.get_mut(usize::from(ch)) {
                *state = ChannelState {
                    enabled,
                    output,
                    connected: false,
                };
            }
            info!(
                "MUSIC {} ch{}: {} output, {}",
                chip.name(),
                ch,
                output.name(),
                if enabled { "enabled" } else { "skipped" }
            );
        }
        Ok(())
    }

    fn bus(&mut self) -> MusicSpi<'_, H::Spi, H::Gpio, H::Delay> {
        self.board.music(self.debug)
    }

    /// Logic level of channel `ch`'s single-ended output
    ///
    /// A6/A7 have no digital input buffer and are thresholded in software.
    fn digital_level(&mut self, ch: usize) -> Result<bool> {
        let line = se_line(ch).ok_or(SiabError::InvalidChannel(channel_id(ch)))?;
        let analog = &mut self.board.analog;
        let level = if line.has_digital_input() {
            analog.is_high(line)
        } else {
            analog.read(line).map(|v| v > DIGITAL_THRESHOLD)
        };
        level.map_err(|_| SiabError::Analog)
    }
}

fn channel_id(ch: usize) -> u8 {
    u8::try_from(ch).unwrap_or(u8::MAX)
}
