//! Registration wire format.
//!
//! A datagram is exactly three bytes: an opcode (`a` to add, `d` to
//! remove) followed by the process id as a little-endian `u16`. There is no
//! acknowledgement.

use rocked_common::error::{Result, RockedError};

/// Length of every datagram.
pub const DATAGRAM_LEN: usize = 3;

const OP_ADD: u8 = b'a';
const OP_REMOVE: u8 = b'd';

/// A registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Start tracking a process.
    Add(u16),
    /// Stop tracking a process.
    Remove(u16),
}

impl Request {
    /// Returns the process id the request is about.
    #[must_use]
    pub const fn pid(self) -> u16 {
        match self {
            Self::Add(pid) | Self::Remove(pid) => pid,
        }
    }

    /// Encodes the request as a datagram.
    #[must_use]
    pub const fn encode(self) -> [u8; DATAGRAM_LEN] {
        let op = match self {
            Self::Add(_) => OP_ADD,
            Self::Remove(_) => OP_REMOVE,
        };
        let [lo, hi] = self.pid().to_le_bytes();
        [op, lo, hi]
    }

    /// Decodes a received datagram.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::Protocol`] on a wrong length or an unknown
    /// opcode.
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        let &[op, lo, hi] = datagram else {
            return Err(RockedError::Protocol {
                message: format!("expected {DATAGRAM_LEN} bytes, got {}", datagram.len()),
            });
        };
        let pid = u16::from_le_bytes([lo, hi]);
        match op {
            OP_ADD => Ok(Self::Add(pid)),
            OP_REMOVE => Ok(Self::Remove(pid)),
            other => Err(RockedError::Protocol {
                message: format!("unknown opcode {other:#04x}"),
            }),
        }
    }
}
