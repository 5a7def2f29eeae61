//! Bandgap and discriminator threshold scans
//!
//! Both scans count how many of `n` digital samples read high while a
//! channel's threshold is held at a given code. With the bandgap set right
//! the count goes from mostly-low at VTH 0 to mostly-high at VTH 511.

use super::{channel_id, MusicCalibrator};
use crate::board::Hardware;
use crate::error::Result;
use crate::music::registers::{
    self, BIAS_VBG, CHANNEL_KEEP_MASK, THRESHOLD_MAX, VBG_CODES,
};

/// Outcome of a full threshold scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThresholdScanResult {
    /// Bandgap code left programmed
    pub vbg: u8,
    /// Optimal threshold per channel (0 for channels not scanned)
    pub thresholds: [u16; 8],
}

impl<H: Hardware> MusicCalibrator<'_, H> {
    /// Discover digital channels, pick the bandgap code, then scan every
    /// enabled channel's threshold
    pub fn threshold_scan(&mut self, n: u16) -> Result<ThresholdScanResult> {
        self.check_enabled_channels(true)?;
        let vbg = self.find_opt_vbg(n)?;
        info!("RESULT MUSIC {} VBG: {}", self.chip.name(), vbg);

        let mut result = ThresholdScanResult {
            vbg,
            ..ThresholdScanResult::default()
        };
        let state = self.state;
        for ch in state.enabled() {
            let vth = self.threshold_scan_channel(ch, n)?;
            if let Some(slot) = result.thresholds.get_mut(ch) {
                *slot = vth;
            }
            info!("RESULT MUSIC {} ch{} VTH: {}", self.chip.name(), ch, vth);
        }
        Ok(result)
    }

    /// Bandgap scan over codes 0..8
    ///
    /// A code passes when every enabled channel reads mostly low at VTH 0
    /// and mostly high at VTH 511. The scan stops after the first passing
    /// code and returns the loop counter minus one: the passing code, or 7
    /// when no code passed.
    pub fn find_opt_vbg(&mut self, n: u16) -> Result<u8> {
        let chip = self.chip;
        let half = n / 2;
        let bias = self.bus().read(chip, BIAS_VBG)?;
        let state = self.state;

        let mut vbg: u8 = 0;
        let mut found = false;
        while vbg < VBG_CODES && !found {
            self.bus()
                .write_verified(chip, BIAS_VBG, registers::with_vbg(bias, vbg), false)?;
            let mut transition_ok = true;
            for ch in state.enabled() {
                let conf = self.bus().read(chip, registers::channel(channel_id(ch)))?;
                let low = self.get_counts_vth(ch, conf, 0, n)?;
                let high = self.get_counts_vth(ch, conf, THRESHOLD_MAX, n)?;
                debug!("VBG {} ch{}: {} at VTH 0, {} at VTH 511", vbg, ch, low, high);
                transition_ok &= low < half && high > half;
            }
            found |= transition_ok;
            vbg = vbg.saturating_add(1);
        }
        if !found {
            warn!("MUSIC {}: no bandgap code passed", chip.name());
        }
        Ok(vbg.saturating_sub(1))
    }

    /// Number of high readings out of `n` with channel `ch` at threshold
    /// `vth`; `conf` supplies the other fields of the channel register
    pub fn get_counts_vth(&mut self, ch: usize, conf: u16, vth: u16, n: u16) -> Result<u16> {
        let chip = self.chip;
        let addr = registers::channel(channel_id(ch));
        self.bus()
            .write_verified(chip, addr, registers::with_threshold(conf, vth), false)?;
        let mut count: u16 = 0;
        for _ in 0..n {
            if self.digital_level(ch)? {
                count = count.saturating_add(1);
            }
        }
        Ok(count)
    }

    /// Sweep channel `ch`'s threshold from 0 upward
    ///
    /// Returns the first code with more than `n / 2` high readings. The
    /// sweep ends once a code reads all high, and the threshold field is
    /// cleared afterwards.
    pub fn threshold_scan_channel(&mut self, ch: usize, n: u16) -> Result<u16> {
        let chip = self.chip;
        let addr = registers::channel(channel_id(ch));
        let conf = self.bus().read(chip, addr)?;

        let mut optimum = None;
        let mut count: u16 = 0;
        let mut vth: u16 = 0;
        while vth <= THRESHOLD_MAX && count != n {
            count = self.get_counts_vth(ch, conf, vth, n)?;
            if optimum.is_none() && count > n / 2 {
                optimum = Some(vth);
            }
            vth = vth.saturating_add(1);
        }
        self.bus()
            .write_verified(chip, addr, conf & CHANNEL_KEEP_MASK, false)?;

        if optimum.is_none() {
            warn!("MUSIC {} ch{}: output never went high", chip.name(), ch);
        }
        Ok(optimum.unwrap_or(0))
    }
}
