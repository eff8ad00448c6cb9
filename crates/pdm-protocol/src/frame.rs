//! CAN frame value type

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Highest 11-bit (standard) identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Highest 29-bit (extended) identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// One classic CAN frame
///
/// The payload is always 8 bytes; bytes past `len` are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    id: u32,
    len: u8,
    data: [u8; 8],
}

impl Frame {
    /// Maximum payload length
    pub const MAX_LEN: usize = 8;

    /// Build a frame from a payload slice
    pub fn new(id: u32, payload: &[u8]) -> ProtocolResult<Self> {
        if payload.len() > Self::MAX_LEN {
            return Err(ProtocolError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    /// Build a frame from a full buffer, zeroing bytes past `len`
    pub fn from_raw(id: u32, len: u8, mut data: [u8; 8]) -> ProtocolResult<Self> {
        if usize::from(len) > Self::MAX_LEN {
            return Err(ProtocolError::PayloadTooLong(usize::from(len)));
        }
        data[usize::from(len)..].fill(0);
        Ok(Self { id, len, data })
    }

    /// Internal constructor for encoders that already own a padded buffer
    pub(crate) fn from_buffer(id: u32, len: usize, data: [u8; 8]) -> Self {
        let len = len.min(Self::MAX_LEN);
        let mut frame = Self {
            id,
            len: len as u8,
            data,
        };
        frame.data[len..].fill(0);
        frame
    }

    /// CAN identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Payload length (DLC)
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The first `len` payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// The full 8-byte buffer
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }

    /// First payload byte, if any
    pub fn first_byte(&self) -> Option<u8> {
        self.payload().first().copied()
    }

    /// True when the identifier needs 29 bits
    pub fn is_extended(&self) -> bool {
        self.id > MAX_STANDARD_ID
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X} [{}]", self.id, self.len)?;
        for byte in self.payload() {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

/// Copy a payload into a zero-padded 8-byte buffer
pub(crate) fn padded(payload: &[u8]) -> [u8; 8] {
    let mut data = [0u8; 8];
    let len = payload.len().min(Frame::MAX_LEN);
    data[..len].copy_from_slice(&payload[..len]);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pads_payload() {
        let frame = Frame::new(0x123, &[1, 2, 3]).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(frame.data(), &[1, 2, 3, 0, 0, 0, 0, 0]);
        assert!(!frame.is_extended());
    }

    #[test]
    fn test_payload_too_long() {
        assert_eq!(
            Frame::new(1, &[0; 9]),
            Err(ProtocolError::PayloadTooLong(9))
        );
        assert_eq!(
            Frame::from_raw(1, 9, [0; 8]),
            Err(ProtocolError::PayloadTooLong(9))
        );
    }

    #[test]
    fn test_from_raw_zeroes_tail() {
        let frame = Frame::from_raw(0x18FF_0000, 2, [0xAA; 8]).unwrap();
        assert_eq!(frame.data(), &[0xAA, 0xAA, 0, 0, 0, 0, 0, 0]);
        assert!(frame.is_extended());
    }

    #[test]
    fn test_display() {
        let frame = Frame::new(0x7D8, &[0x01, 0x2A, 0xFF]).unwrap();
        assert_eq!(frame.to_string(), "0x7D8 [3] 01 2A FF");
    }
}
