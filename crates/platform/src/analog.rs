//! Single-shot analog inputs of the microcontroller
//!
//! The MUSIC analog and digital outputs are wired to the MCU's 10-bit
//! converter lines A0..A7. Lines A0..A5 double as digital inputs; A6 and A7
//! are analog-only and must be thresholded in software.

/// Full-scale count of the 10-bit converter
pub const ADC_FULL_SCALE: u16 = 1023;

/// Count above which an analog-only line is read as logic high
pub const DIGITAL_THRESHOLD: u16 = 511;

/// Analog input line A0..A7
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct AnalogLine(u8);

impl AnalogLine {
    /// A0
    pub const A0: Self = Self(0);
    /// A1
    pub const A1: Self = Self(1);
    /// A2
    pub const A2: Self = Self(2);
    /// A3
    pub const A3: Self = Self(3);
    /// A4
    pub const A4: Self = Self(4);
    /// A5
    pub const A5: Self = Self(5);
    /// A6 (analog only)
    pub const A6: Self = Self(6);
    /// A7 (analog only)
    pub const A7: Self = Self(7);

    /// Number of analog lines
    pub const COUNT: usize = 8;

    /// Line from its index, `None` above A7
    pub const fn new(index: u8) -> Option<Self> {
        if index < 8 {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Index of the line (0..=7)
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Whether the line can be read as a digital input
    pub const fn has_digital_input(self) -> bool {
        self.0 < 6
    }
}

/// Analog/digital input port
pub trait AnalogPort {
    /// Error type
    type Error: core::fmt::Debug;

    /// Single 10-bit conversion on `line`
    fn read(&mut self, line: AnalogLine) -> Result<u16, Self::Error>;

    /// Digital level of `line`
    ///
    /// Only meaningful where [`AnalogLine::has_digital_input`] holds;
    /// callers threshold A6/A7 against [`DIGITAL_THRESHOLD`] instead.
    fn is_high(&mut self, line: AnalogLine) -> Result<bool, Self::Error>;

    /// Raw count of the MCU's internal temperature channel
    fn read_internal_temperature(&mut self) -> Result<u16, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_constructor_rejects_out_of_range() {
        assert_eq!(AnalogLine::new(7), Some(AnalogLine::A7));
        assert_eq!(AnalogLine::new(8), None);
    }

    #[test]
    fn only_a0_to_a5_have_digital_inputs() {
        assert!(AnalogLine::A5.has_digital_input());
        assert!(!AnalogLine::A6.has_digital_input());
        assert!(!AnalogLine::A7.has_digital_input());
    }
}
