//! SMBus slave session
//!
//! The transport calls in from its bus events:
//!
//! ```text
//!            on_write(bytes)             process(ctx)
//!  Idle ───────────────────► WriteRequested ──────────► Idle               (write-only)
//!                                    │                ► WriteReadRequested ─ on_read() ─► Idle
//!                                    │                ► Idle + error flag   (unknown opcode)
//!  on_write(empty / too long) ─────► Error ── clear_error() / process(ctx) ─► Idle
//! ```
//!
//! `process` runs in the bus-transaction context and blocks for as long as
//! the command takes. Calibration commands hold the bus for tens to
//! hundreds of milliseconds; the master must stretch or retry accordingly.

use platform::GpioPort;

use crate::board::Hardware;
use crate::command::CommandFrame;
use crate::dispatcher::{Response, SiabContext};
use crate::error::{Result, SiabError};

/// Session state between bus events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// Waiting for a write
    #[default]
    Idle,
    /// Frame latched, not yet dispatched
    WriteRequested,
    /// Response ready for the next read
    WriteReadRequested,
    /// Malformed frame received
    Error,
}

impl SessionState {
    /// Short name for log lines
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WriteRequested => "write-requested",
            Self::WriteReadRequested => "write-read-requested",
            Self::Error => "error",
        }
    }
}

/// Receive/transmit buffers and state of the slave interface
#[derive(Debug, Default)]
pub struct SmbSession {
    rx: Option<CommandFrame>,
    tx: Response,
    state: SessionState,
    error: bool,
}

impl SmbSession {
    /// Idle session with empty buffers
    pub const fn new() -> Self {
        Self {
            rx: None,
            tx: Response::new(),
            state: SessionState::Idle,
            error: false,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Error flag (unknown opcode or malformed frame since the last clear)
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Transmit buffer contents
    pub fn response(&self) -> &[u8] {
        &self.tx
    }

    /// Master write: latch the frame
    pub fn on_write(&mut self, bytes: &[u8]) {
        match CommandFrame::new(bytes) {
            Ok(frame) => {
                self.rx = Some(frame);
                self.state = SessionState::WriteRequested;
            }
            Err(e) => {
                warn!("SMB: rejected frame ({})", e.name());
                self.rx = None;
                self.error = true;
                self.state = SessionState::Error;
            }
        }
    }

    /// Dispatch a latched frame
    ///
    /// A pending response is kept for the read; any other state returns to
    /// Idle. An unknown opcode sets the error flag and clears the transmit
    /// buffer.
    pub fn process<H: Hardware>(&mut self, ctx: &mut SiabContext<'_, H>) -> SessionState {
        match (self.state, self.rx.take()) {
            (SessionState::WriteRequested, Some(frame)) => match ctx.dispatch(&frame) {
                Ok(dispatch) => {
                    self.tx = dispatch.response;
                    self.state = dispatch.state;
                }
                Err(e) => {
                    if let SiabError::UnknownOpcode(op) = e {
                        warn!("SMB: unknown opcode {:#x}", op);
                    }
                    self.tx.clear();
                    self.error = true;
                    self.state = SessionState::Idle;
                }
            },
            (SessionState::WriteReadRequested, _) => {}
            _ => self.state = SessionState::Idle,
        }
        self.state
    }

    /// Master read: hand over the response
    ///
    /// Empty unless a write-then-read command is pending.
    pub fn on_read(&mut self) -> &[u8] {
        if self.state == SessionState::WriteReadRequested {
            self.state = SessionState::Idle;
            &self.tx
        } else {
            &[]
        }
    }

    /// Bare receive-byte: the inverted status input port
    pub fn on_receive_byte<H: Hardware>(&mut self, ctx: &mut SiabContext<'_, H>) -> Result<u8> {
        let port = ctx
            .board
            .gpio
            .read_status_port()
            .map_err(|_| SiabError::Gpio)?;
        Ok(!port)
    }

    /// Clear the error flag
    pub fn clear_error(&mut self) {
        self.error = false;
        if self.state == SessionState::Error {
            self.state = SessionState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_frames_enter_error() {
        let mut session = SmbSession::new();
        session.on_write(&[]);
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.has_error());
        session.clear_error();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_error());

        session.on_write(&[0x04, 0, 0, 0, 0, 0]);
        assert_eq!(session.state(), SessionState::Error);
    }

    #[test]
    fn read_without_pending_response_is_empty() {
        let mut session = SmbSession::new();
        assert!(session.on_read().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
