//! GPIO abstraction for the board's named control lines
//!
//! The SIAB board drives a handful of fixed-function outputs (status LED,
//! MUSIC supply rails, MUSIC chip selects). Rather than exposing raw pin
//! numbers, the port is addressed by [`OutputLine`] so the firmware core
//! never depends on a particular pin assignment.

/// Named output line on the SIAB control port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputLine {
    /// Front-panel status LED
    Led,
    /// 3.3 V rail of the MUSIC front-end
    Rail3v3,
    /// 5 V rail of the MUSIC front-end
    Rail5v,
    /// Chip select of the bottom MUSIC ASIC (active low)
    MusicCsBottom,
    /// Chip select of the top MUSIC ASIC (active low)
    MusicCsTop,
}

impl OutputLine {
    /// Number of lines
    pub const COUNT: usize = 5;

    /// Every line, in port order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Led,
        Self::Rail3v3,
        Self::Rail5v,
        Self::MusicCsBottom,
        Self::MusicCsTop,
    ];

    /// Stable index of the line, usable as an array index
    pub const fn index(self) -> usize {
        match self {
            Self::Led => 0,
            Self::Rail3v3 => 1,
            Self::Rail5v => 2,
            Self::MusicCsBottom => 3,
            Self::MusicCsTop => 4,
        }
    }

    /// Short name for log lines
    pub const fn name(self) -> &'static str {
        match self {
            Self::Led => "LED",
            Self::Rail3v3 => "3V3",
            Self::Rail5v => "5V",
            Self::MusicCsBottom => "CS_BOT",
            Self::MusicCsTop => "CS_TOP",
        }
    }
}

/// Control port with named output lines
pub trait GpioPort {
    /// Error type
    type Error: core::fmt::Debug;

    /// Drive a line to the given level
    fn set(&mut self, line: OutputLine, state: PinState) -> Result<(), Self::Error>;

    /// Read back the level a line is currently driven to
    fn get(&mut self, line: OutputLine) -> Result<PinState, Self::Error>;

    /// Read the raw status input port (8 lines at once)
    fn read_status_port(&mut self) -> Result<u8, Self::Error>;

    /// Drive a line high
    fn set_high(&mut self, line: OutputLine) -> Result<(), Self::Error> {
        self.set(line, PinState::High)
    }

    /// Drive a line low
    fn set_low(&mut self, line: OutputLine) -> Result<(), Self::Error> {
        self.set(line, PinState::Low)
    }
}

/// Pin state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
    /// High (logic 1)
    High,
    /// Low (logic 0)
    Low,
}

impl From<bool> for PinState {
    fn from(value: bool) -> Self {
        if value {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<PinState> for bool {
    fn from(value: PinState) -> Self {
        matches!(value, PinState::High)
    }
}
