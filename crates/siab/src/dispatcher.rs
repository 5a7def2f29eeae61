//! Command dispatcher
//!
//! [`SiabContext`] owns everything the foreground touches: the board, the
//! RAM copies of both MUSIC register maps and the run-time configuration.
//! The acquisition state is borrowed because the conversion-ready ISR
//! shares it.
//!
//! Handlers are best-effort. A hardware error is logged and the command
//! still completes with a response of its usual shape (zero-filled), so the
//! only failure visible on the bus is an unknown opcode.

use platform::{AnalogPort, DataRate, GpioPort, OutputLine, PinState, SystemControl};

use crate::acquisition::AdcAcquisitionLoop;
use crate::board::{Board, Hardware, SIPM_THERMISTOR};
use crate::calibration::{MusicCalibrator, VdcOutput};
use crate::command::{Command, CommandFrame};
use crate::config::{SiabConfig, TX_BUFFER_SIZE};
use crate::eeprom_store::EepromConfigStore;
use crate::error::{Result, SiabError};
use crate::music::MusicChip;
use crate::music::MusicRegisterMap;
use crate::smb::SessionState;

/// Transmit buffer contents
pub type Response = heapless::Vec<u8, TX_BUFFER_SIZE>;

/// Outcome of one dispatched frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Bytes for the follow-up read (empty for write-only commands)
    pub response: Response,
    /// `Idle` or `WriteReadRequested`
    pub state: SessionState,
}

/// Foreground state of the firmware
pub struct SiabContext<'a, H: Hardware> {
    /// Peripherals
    pub board: Board<H>,
    /// ISR-shared acquisition state
    pub acquisition: &'a AdcAcquisitionLoop<H::Adc, H::HvSwitch>,
    /// Run-time configuration
    pub config: SiabConfig,
    /// Loaded register maps, bottom then top
    pub maps: [MusicRegisterMap; 2],
    /// Rate applied by the next "init ADC"
    pub adc_rate: DataRate,
}

impl<'a, H: Hardware> SiabContext<'a, H> {
    /// Assemble the context and apply the configured current limit
    pub fn new(
        board: Board<H>,
        acquisition: &'a AdcAcquisitionLoop<H::Adc, H::HvSwitch>,
        config: SiabConfig,
    ) -> Self {
        acquisition.set_max_current_ua(config.max_current_ua);
        Self {
            board,
            acquisition,
            config,
            maps: [MusicRegisterMap::new(), MusicRegisterMap::new()],
            adc_rate: config.adc_rate,
        }
    }

    /// Loaded register map of `chip`
    pub fn map(&self, chip: MusicChip) -> &MusicRegisterMap {
        match chip {
            MusicChip::Bottom => &self.maps[0],
            MusicChip::Top => &self.maps[1],
        }
    }

    fn map_mut(&mut self, chip: MusicChip) -> &mut MusicRegisterMap {
        match chip {
            MusicChip::Bottom => &mut self.maps[0],
            MusicChip::Top => &mut self.maps[1],
        }
    }

    /// Decode and execute one frame
    ///
    /// Fails only on an unknown opcode, before any side effect.
    pub fn dispatch(&mut self, frame: &CommandFrame) -> Result<Dispatch> {
        let cmd = Command::decode(frame)?;
        trace!("command {}", cmd.name());
        let response = match self.execute(cmd) {
            Ok(response) => response,
            Err(e) => {
                error!("command {} failed: {}", cmd.name(), e.name());
                fallback_response(cmd)
            }
        };
        let state = if cmd.has_response() {
            SessionState::WriteReadRequested
        } else {
            SessionState::Idle
        };
        Ok(Dispatch { response, state })
    }

    #[allow(clippy::too_many_lines)] // one arm per opcode
    fn execute(&mut self, cmd: Command) -> Result<Response> {
        let debug = self.config.music_debug;
        match cmd {
            // ── Device control ──────────────────────────────────────────────
            Command::Reset => {
                info!("soft reset requested");
                self.board.system.soft_reset().map_err(|_| SiabError::System)?;
            }
            Command::LedOn => self.set_lines(&[OutputLine::Led], PinState::High)?,
            Command::LedOff => self.set_lines(&[OutputLine::Led], PinState::Low)?,
            Command::Rail3v3On => self.set_lines(&[OutputLine::Rail3v3], PinState::High)?,
            Command::Rail3v3Off => self.set_lines(&[OutputLine::Rail3v3], PinState::Low)?,
            Command::Rail5vOn => self.set_lines(&[OutputLine::Rail5v], PinState::High)?,
            Command::Rail5vOff => self.set_lines(&[OutputLine::Rail5v], PinState::Low)?,
            Command::RailsOn => {
                self.set_lines(&[OutputLine::Rail3v3, OutputLine::Rail5v], PinState::High)?;
            }
            Command::RailsOff => {
                self.set_lines(&[OutputLine::Rail3v3, OutputLine::Rail5v], PinState::Low)?;
            }

            // ── Sensing ─────────────────────────────────────────────────────
            Command::SipmTemperature => {
                let raw = self
                    .board
                    .analog
                    .read(SIPM_THERMISTOR)
                    .map_err(|_| SiabError::Analog)?;
                return Ok(bytes(&raw.to_le_bytes()));
            }
            Command::McuTemperature => {
                let raw = self
                    .board
                    .analog
                    .read_internal_temperature()
                    .map_err(|_| SiabError::Analog)?;
                return Ok(bytes(&raw.to_le_bytes()));
            }

            // ── EEPROM passthrough ──────────────────────────────────────────
            Command::EepromReadByte { addr } => {
                let value = self.store().read_byte(addr)?;
                return Ok(bytes(&[value, 0x00]));
            }
            Command::EepromReadWord { addr } => {
                let word = self.store().read_word(addr)?;
                return Ok(bytes(&word.to_le_bytes()));
            }
            Command::EepromWriteByte { addr, value } => self.store().write_byte(addr, value)?,
            Command::EepromWriteWord { addr, hi, lo } => {
                self.store().write_word(u16::from(addr), hi, lo)?;
            }

            // ── MUSIC ───────────────────────────────────────────────────────
            Command::MusicInit => {
                let divider = self.config.spi_divider;
                self.board.music(debug).init(divider)?;
            }
            Command::MusicLoad { chip } => {
                let chip = music_chip(chip)?;
                let map = self.store().read_map(chip)?;
                *self.map_mut(chip) = map;
                info!("MUSIC {} map loaded from EEPROM", chip.name());
            }
            Command::MusicPrint { chip } => {
                let chip = music_chip(chip)?;
                self.map(chip).print(chip);
            }
            Command::MusicApply { chip } => {
                let chip = music_chip(chip)?;
                let [bottom, top] = &self.maps;
                let map = match chip {
                    MusicChip::Bottom => bottom,
                    MusicChip::Top => top,
                };
                map.apply(&mut self.board.music(debug), chip)?;
            }
            Command::MusicRead { chip, addr } => {
                let chip = music_chip(chip)?;
                let value = self.board.music(debug).read(chip, addr)?;
                return Ok(bytes(&value.to_le_bytes()));
            }
            Command::MusicWrite { chip, addr, data } => {
                let chip = music_chip(chip)?;
                self.board.music(debug).write_verified(chip, addr, data, debug)?;
            }
            Command::MusicUpdate { chip, addr, data } => {
                let chip = music_chip(chip)?;
                if !self.map_mut(chip).update(addr, data) {
                    warn!("MUSIC {} map has no register {:#x}", chip.name(), addr);
                }
            }
            Command::MusicStore { chip } => {
                let chip = music_chip(chip)?;
                let map = self.map(chip).clone();
                let written = self.store().write_map(chip, &map)?;
                info!("MUSIC {} map stored, {} bytes written", chip.name(), written);
            }

            // ── ADC ─────────────────────────────────────────────────────────
            Command::SetAdcRate { code } => match DataRate::from_code(code) {
                Some(rate) => self.adc_rate = rate,
                None => warn!("ignoring ADC rate code {}", code),
            },
            Command::InitAdc => self.acquisition.init_adc(self.adc_rate)?,
            Command::AdcEnable => self.acquisition.set_running(true)?,
            Command::AdcDisable => self.acquisition.set_running(false)?,
            Command::ReadAverage { channel } => {
                return Ok(middle_bytes(self.acquisition.average(channel)));
            }
            Command::ReadAll => warn!("read-all is reserved"),
            Command::RecordOffset => self.acquisition.record_offsets(),
            Command::ReadOffset { channel } => {
                return Ok(middle_bytes(self.acquisition.offset(channel)));
            }

            // ── HV ──────────────────────────────────────────────────────────
            Command::HvOn => self.acquisition.hv_on()?,
            Command::HvOff => self.acquisition.hv_off()?,
            Command::EnableSafety => self.acquisition.enable_safety(),
            Command::HvStatus => {
                let status = if self.acquisition.hv_is_high()? { 0x02 } else { 0x01 };
                return Ok(bytes(&[status, 0x00]));
            }
            Command::SetMaxCurrent { max_current_ua } => {
                self.acquisition.set_max_current_ua(max_current_ua);
            }

            // ── Identity and calibration ────────────────────────────────────
            Command::DeviceId => {
                let serial = self.store().read_serial()?;
                let mut response = Response::new();
                #[allow(clippy::cast_possible_truncation)] // at most 64
                let _ = response.push(serial.len() as u8);
                for &b in &serial {
                    if response.push(b).is_err() {
                        break;
                    }
                }
                return Ok(response);
            }
            Command::ThresholdScan { chip, samples } => {
                let chip = music_chip(chip)?;
                let n = self.config.samples(samples, self.config.threshold_samples);
                let scan = MusicCalibrator::new(&mut self.board, chip, debug).threshold_scan(n)?;
                let mut response = bytes(&[scan.vbg]);
                for th in scan.thresholds {
                    let _ = response.extend_from_slice(&th.to_le_bytes());
                }
                return Ok(response);
            }
            Command::VdcCalibrate {
                chip,
                samples,
                store,
            } => {
                let chip = music_chip(chip)?;
                let n = self.config.samples(samples, self.config.vdc_samples);
                let cal = MusicCalibrator::new(&mut self.board, chip, debug).vdc_calib(n)?;
                if store {
                    let mut eeprom = self.store();
                    for (output, code) in [
                        (VdcOutput::SingleEnded, cal.se),
                        (VdcOutput::LowGain, cal.lg),
                        (VdcOutput::HighGain, cal.hg),
                    ] {
                        if let Some(code) = code {
                            eeprom.store_vdc(output, code)?;
                        }
                    }
                    if let Some(code) = cal.vcm {
                        eeprom.store_vcm(code)?;
                    }
                    info!("MUSIC {} calibration stored", chip.name());
                }
                return Ok(bytes(&[
                    cal.flags(),
                    cal.se.unwrap_or(0),
                    cal.vcm.unwrap_or(0),
                    cal.lg.unwrap_or(0),
                    cal.hg.unwrap_or(0),
                ]));
            }
        }
        Ok(Response::new())
    }

    fn store(&mut self) -> EepromConfigStore<'_, H::Eeprom> {
        EepromConfigStore::new(&mut self.board.eeprom)
    }

    fn set_lines(&mut self, lines: &[OutputLine], level: PinState) -> Result<()> {
        for &line in lines {
            self.board.gpio.set(line, level).map_err(|_| SiabError::Gpio)?;
            debug!("{} {}", line.name(), bool::from(level));
        }
        Ok(())
    }
}

fn music_chip(id: u8) -> Result<MusicChip> {
    MusicChip::from_id(id).ok_or(SiabError::InvalidChip(id))
}

fn bytes(data: &[u8]) -> Response {
    Response::from_slice(data).unwrap_or_default()
}

/// Bits 8..24 of a 24-bit ADC value, low byte first; `[0, 0]` for an
/// invalid channel
fn middle_bytes(value: Result<u32>) -> Response {
    let [_, hi, lo, _] = value.unwrap_or(0).to_be_bytes();
    bytes(&[lo, hi])
}

/// Zero-filled response of the shape `cmd` normally produces
fn fallback_response(cmd: Command) -> Response {
    let len = match cmd {
        Command::DeviceId => 1,
        Command::ThresholdScan { .. } => 17,
        Command::VdcCalibrate { .. } => 5,
        c if c.has_response() => 2,
        _ => 0,
    };
    let mut response = Response::new();
    let _ = response.resize(len, 0);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_bytes_drop_low_byte() {
        assert_eq!(middle_bytes(Ok(0x0012_3456)).as_slice(), &[0x34, 0x12]);
        assert_eq!(middle_bytes(Err(SiabError::InvalidChannel(16))).as_slice(), &[0, 0]);
    }

    #[test]
    fn fallback_keeps_response_shape() {
        assert_eq!(fallback_response(Command::HvStatus).len(), 2);
        assert_eq!(fallback_response(Command::LedOn).len(), 0);
        assert_eq!(
            fallback_response(Command::ThresholdScan { chip: 1, samples: 0 }).len(),
            17
        );
    }
}
