//! Settings message prefixes
//!
//! Byte 0 of every settings request and write carries a prefix. The device
//! answers on `base_id + 30` with byte 0 set to `prefix + 128`.

use crate::error::{ProtocolError, ProtocolResult};

/// Offset added to a prefix in the device's settings response
pub const RESPONSE_FLAG: u8 = 128;

wire_enum! {
    /// Message category carried in byte 0 of settings frames
    pub enum MessagePrefix {
        #[default]
        Null = 0,
        Can = 1,
        Inputs = 5,
        Outputs = 15,
        OutputsPwm = 16,
        VirtualInputs = 25,
        Wiper = 35,
        WiperSpeed = 36,
        WiperDelays = 37,
        Flashers = 40,
        StarterDisable = 50,
        CanInputs = 60,
        CanInputsId = 61,
        Counters = 70,
        Conditions = 75,
        Version = 120,
        Sleep = 121,
        Bootloader = 125,
        BurnSettings = 127,
    }
}

impl MessagePrefix {
    /// Byte 0 of the device's response to this prefix
    pub const fn response_byte(self) -> u8 {
        self.raw() + RESPONSE_FLAG
    }

    /// Recover the request prefix from a response's first byte
    pub fn from_response(byte: u8) -> ProtocolResult<Self> {
        byte.checked_sub(RESPONSE_FLAG)
            .and_then(Self::from_raw)
            .ok_or(ProtocolError::UnknownPrefix(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_byte() {
        assert_eq!(MessagePrefix::Inputs.response_byte(), 133);
        assert_eq!(MessagePrefix::BurnSettings.response_byte(), 255);
        assert_eq!(
            MessagePrefix::from_response(133),
            Ok(MessagePrefix::Inputs)
        );
        assert_eq!(
            MessagePrefix::from_response(5),
            Err(ProtocolError::UnknownPrefix(5))
        );
        assert_eq!(
            MessagePrefix::from_response(128 + 2),
            Err(ProtocolError::UnknownPrefix(130))
        );
    }
}
