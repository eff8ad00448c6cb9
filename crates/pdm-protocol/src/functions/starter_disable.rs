//! Starter disable: drops selected outputs while cranking

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;

const ENABLED: Signal = Signal::flag(8);
const INPUT: Signal = Signal::new(16, 8);
const OUTPUT_MASK: Signal = Signal::new(24, 16);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarterDisableConfig {
    pub enabled: bool,
    pub input: u8,
    /// Bit n set disables output n + 1 while the input is active
    pub output_mask: u16,
}

impl StarterDisableConfig {
    /// Whether output `number` (1-based) is disabled while cranking
    pub fn disables(&self, number: u8) -> bool {
        match number.checked_sub(1) {
            Some(bit) if bit < 16 => self.output_mask & (1 << bit) != 0,
            _ => false,
        }
    }

    pub fn set_disables(&mut self, number: u8, disabled: bool) {
        let Some(bit) = number.checked_sub(1).filter(|bit| *bit < 16) else {
            return;
        };
        if disabled {
            self.output_mask |= 1 << bit;
        } else {
            self.output_mask &= !(1 << bit);
        }
    }
}

impl FunctionCodec for StarterDisableConfig {
    const PREFIX: MessagePrefix = MessagePrefix::StarterDisable;
    const LEN: usize = 5;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            input: fields.byte(&INPUT)?,
            output_mask: fields.word(&OUTPUT_MASK)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.uint(&INPUT, u64::from(self.input))?;
        fields.uint(&OUTPUT_MASK, u64::from(self.output_mask))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarterDisable {
    pub config: StarterDisableConfig,
    #[serde(skip)]
    pub active: bool,
}

impl StarterDisable {
    pub fn request(tx_id: u32) -> Frame {
        request_frame::<StarterDisableConfig>(tx_id, 0)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, 0)
    }

    pub fn clear_live(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_singleton_request() {
        assert_eq!(StarterDisable::request(199).payload(), &[50]);
    }

    #[test]
    fn test_output_mask() {
        let mut starter = StarterDisable::default();
        starter.config.enabled = true;
        starter.config.input = 2;
        starter.config.set_disables(1, true);
        starter.config.set_disables(10, true);
        starter.config.set_disables(17, true);
        assert!(starter.config.disables(10));
        assert!(!starter.config.disables(2));
        assert!(!starter.config.disables(0));

        let frame = starter.write(199).unwrap();
        assert_eq!(frame.payload(), &[50, 0x01, 2, 0x01, 0x02]);

        starter.config.set_disables(1, false);
        assert_eq!(starter.config.output_mask, 0x0200);
    }
}
