//! Firmware configuration
//!
//! Compile-time constants and the run-time [`SiabConfig`] injected into
//! [`SiabContext`](crate::SiabContext).

use platform::{ClockDivider, DataRate};

// ── Bus buffers ─────────────────────────────────────────────────────────────

/// Receive buffer: opcode plus up to four payload bytes
pub const RX_BUFFER_SIZE: usize = 5;

/// Transmit buffer (SMBus block limit)
pub const TX_BUFFER_SIZE: usize = 32;

// ── HV safety ───────────────────────────────────────────────────────────────

/// Max current applied at boot, in µA
pub const DEFAULT_MAX_CURRENT_UA: u16 = 400;

/// Current-sense conversion factor: ADC counts per 10 µA (38.8 counts/µA)
pub const ADC_COUNTS_PER_10_UA: u32 = 388;

// ── Calibration ─────────────────────────────────────────────────────────────

/// Digital samples per threshold point when a command passes 0
pub const DEFAULT_THRESHOLD_SAMPLES: u16 = 100;

/// Analog reads averaged per VDC/VCM point when a command passes 0
pub const DEFAULT_VDC_SAMPLES: u16 = 10;

/// Upper bound on any per-point sample count
pub const MAX_SAMPLES_PER_POINT: u16 = 1000;

/// Run-time configuration of the firmware core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SiabConfig {
    /// Log every MUSIC SPI transaction at debug level
    pub music_debug: bool,
    /// Soft-SPI clock divider for the MUSIC bus
    pub spi_divider: ClockDivider,
    /// HV cut-off current at boot, in µA
    pub max_current_ua: u16,
    /// ADC filter rate used by "init ADC" until changed
    pub adc_rate: DataRate,
    /// Default samples per threshold point
    pub threshold_samples: u16,
    /// Default reads per VDC/VCM point
    pub vdc_samples: u16,
    /// Clamp applied to sample counts carried by commands
    pub max_samples_per_point: u16,
}

impl Default for SiabConfig {
    fn default() -> Self {
        Self {
            music_debug: false,
            spi_divider: ClockDivider::Div4,
            max_current_ua: DEFAULT_MAX_CURRENT_UA,
            adc_rate: DataRate::Sps2597,
            threshold_samples: DEFAULT_THRESHOLD_SAMPLES,
            vdc_samples: DEFAULT_VDC_SAMPLES,
            max_samples_per_point: MAX_SAMPLES_PER_POINT,
        }
    }
}

impl SiabConfig {
    /// Resolve a per-point sample count from a command (0 selects `default`)
    pub fn samples(&self, requested: u16, default: u16) -> u16 {
        let n = if requested == 0 { default } else { requested };
        n.clamp(1, self.max_samples_per_point.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_request_selects_default() {
        let cfg = SiabConfig::default();
        assert_eq!(cfg.samples(0, 100), 100);
    }

    #[test]
    fn request_is_clamped() {
        let cfg = SiabConfig::default();
        assert_eq!(cfg.samples(u16::MAX, 100), MAX_SAMPLES_PER_POINT);
    }
}
