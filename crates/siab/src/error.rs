//! Error type of the firmware core
//!
//! HAL drivers each carry their own error type. The core only needs to know
//! *which* collaborator failed, so driver errors are collapsed into a
//! [`SiabError`] variant at the call site with `map_err`.

/// Firmware core error
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SiabError {
    /// Control port access failed
    #[error("GPIO port error")]
    Gpio,
    /// Bit-banged SPI transfer failed
    #[error("SPI bus error")]
    Spi,
    /// Single-shot analog read failed
    #[error("analog input error")]
    Analog,
    /// EEPROM access failed or was out of range
    #[error("EEPROM access error")]
    Eeprom,
    /// Continuous ADC access failed
    #[error("ADC device error")]
    Adc,
    /// ADC identification register did not match
    #[error("ADC identification mismatch")]
    AdcIdMismatch,
    /// HV enable switch could not be driven
    #[error("HV switch error")]
    HvSwitch,
    /// Soft reset request failed
    #[error("system control error")]
    System,
    /// Command frame carried no opcode
    #[error("empty command frame")]
    EmptyFrame,
    /// Command frame longer than the receive buffer
    #[error("command frame too long ({0} bytes)")]
    FrameTooLong(usize),
    /// Opcode not in the command table
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// MUSIC chip id other than bottom (1) or top (2)
    #[error("invalid MUSIC chip id {0}")]
    InvalidChip(u8),
    /// ADC channel above 15
    #[error("ADC channel {0} out of range")]
    InvalidChannel(u8),
}

impl SiabError {
    /// Short name for log lines
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gpio => "gpio",
            Self::Spi => "spi",
            Self::Analog => "analog",
            Self::Eeprom => "eeprom",
            Self::Adc => "adc",
            Self::AdcIdMismatch => "adc-id",
            Self::HvSwitch => "hv-switch",
            Self::System => "system",
            Self::EmptyFrame => "empty-frame",
            Self::FrameTooLong(_) => "frame-too-long",
            Self::UnknownOpcode(_) => "unknown-opcode",
            Self::InvalidChip(_) => "invalid-chip",
            Self::InvalidChannel(_) => "invalid-channel",
        }
    }
}

/// Result alias for the firmware core
pub type Result<T> = core::result::Result<T, SiabError>;
