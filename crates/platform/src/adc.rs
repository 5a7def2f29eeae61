//! Multi-channel continuous ADC abstraction
//!
//! Models a 16-channel sigma-delta converter (AD7173 class) running in
//! continuous-conversion mode with the status byte appended to every
//! result. The result word layout is:
//!
//! ```text
//! byte 0..=2 : 24-bit sample, MSB first
//! byte 3     : status  (bit 7 = ready, bits 6..4 = error flags, bits 3..0 = channel)
//! ```

/// Number of conversion channels
pub const ADC_CHANNELS: usize = 16;

/// Length of a result word with the status byte appended
pub const RESULT_LEN: usize = 4;

/// Output data rate of the converter filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    /// 1 SPS
    Sps1,
    /// 16 SPS
    Sps16,
    /// 100 SPS
    Sps100,
    /// 381 SPS
    Sps381,
    /// 1007 SPS
    Sps1007,
    /// 2597 SPS
    #[default]
    Sps2597,
}

impl DataRate {
    /// Rate selected by a remote command code (1..=6)
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Sps1),
            2 => Some(Self::Sps16),
            3 => Some(Self::Sps100),
            4 => Some(Self::Sps381),
            5 => Some(Self::Sps1007),
            6 => Some(Self::Sps2597),
            _ => None,
        }
    }

    /// Samples per second
    pub const fn samples_per_second(self) -> u16 {
        match self {
            Self::Sps1 => 1,
            Self::Sps16 => 16,
            Self::Sps100 => 100,
            Self::Sps381 => 381,
            Self::Sps1007 => 1007,
            Self::Sps2597 => 2597,
        }
    }
}

/// Continuous-conversion ADC
pub trait AdcDevice {
    /// Error type
    type Error: core::fmt::Debug;

    /// Synchronise the serial interface and reset the converter
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Whether the identification register holds the expected value
    fn is_valid_id(&mut self) -> Result<bool, Self::Error>;

    /// Enable `channel` and route it to analog input `input` (AINx vs. AINCOM)
    fn configure_channel(&mut self, channel: u8, input: u8) -> Result<(), Self::Error>;

    /// Unipolar coding, internal reference and the given filter rate
    fn configure_setup(&mut self, rate: DataRate) -> Result<(), Self::Error>;

    /// Enter continuous conversion with the status byte appended
    fn start_continuous(&mut self) -> Result<(), Self::Error>;

    /// Attach or detach the conversion-ready interrupt
    fn set_data_ready_interrupt(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Read one result word
    fn read_result(&mut self) -> Result<[u8; RESULT_LEN], Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_codes_cover_one_to_six() {
        assert_eq!(DataRate::from_code(1), Some(DataRate::Sps1));
        assert_eq!(DataRate::from_code(6), Some(DataRate::Sps2597));
        assert_eq!(DataRate::from_code(0), None);
        assert_eq!(DataRate::from_code(7), None);
    }

    #[test]
    fn default_rate_is_fastest() {
        assert_eq!(DataRate::default().samples_per_second(), 2597);
    }
}
