//! MUSIC analog front-end ASICs
//!
//! Two ASICs sit on the soft-SPI bus, selected by their own chip-select
//! line. Remote commands identify them by a numeric id: 1 = bottom, 2 = top.

pub mod config;
pub mod registers;
pub mod spi;

pub use config::{MusicRegisterMap, RegisterEntry, REGISTER_COUNT};
pub use spi::{MusicSpi, WriteCheck};

use platform::OutputLine;

/// One of the two MUSIC ASICs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MusicChip {
    /// Bottom ASIC (id 1)
    Bottom,
    /// Top ASIC (id 2)
    Top,
}

impl MusicChip {
    /// Both chips, in id order
    pub const ALL: [Self; 2] = [Self::Bottom, Self::Top];

    /// Chip from its command id
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Bottom),
            2 => Some(Self::Top),
            _ => None,
        }
    }

    /// Command id
    pub const fn id(self) -> u8 {
        match self {
            Self::Bottom => 1,
            Self::Top => 2,
        }
    }

    /// Zero-based index for per-chip tables
    pub const fn index(self) -> usize {
        match self {
            Self::Bottom => 0,
            Self::Top => 1,
        }
    }

    /// Chip-select line
    pub const fn cs_line(self) -> OutputLine {
        match self {
            Self::Bottom => OutputLine::MusicCsBottom,
            Self::Top => OutputLine::MusicCsTop,
        }
    }

    /// Short name for log lines
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bottom => "bottom",
            Self::Top => "top",
        }
    }
}
