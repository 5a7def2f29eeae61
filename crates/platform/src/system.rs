//! System control abstraction

/// MCU-level control
pub trait SystemControl {
    /// Error type
    type Error: core::fmt::Debug;

    /// Restart the firmware from its reset vector
    ///
    /// On hardware this does not return. Mocks record the request and
    /// return `Ok(())`.
    fn soft_reset(&mut self) -> Result<(), Self::Error>;
}
