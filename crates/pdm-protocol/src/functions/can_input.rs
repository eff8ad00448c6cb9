//! CAN inputs: values lifted from frames seen on the vehicle bus

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::{Frame, MAX_STANDARD_ID};
use crate::prefix::MessagePrefix;
use crate::types::{InputMode, Operator};

const ENABLED: Signal = Signal::flag(8);
const TIMEOUT_ENABLED: Signal = Signal::flag(9);
const MODE: Signal = Signal::new(10, 2);
const OPERATOR: Signal = Signal::new(12, 4);
const INDEX: Signal = Signal::new(16, 8);
const START_BYTE: Signal = Signal::new(24, 4);
const DLC: Signal = Signal::new(28, 4);
const ON_VALUE: Signal = Signal::new(32, 16);
const TIMEOUT: Signal = Signal::new(48, 8).scaled(0.1, 0.0);
const BIG_ENDIAN: Signal = Signal::flag(56);

const ID_INDEX: Signal = Signal::new(8, 8);
const IDE: Signal = Signal::flag(16);
const STANDARD_ID: Signal = Signal::new(24, 11);
const EXTENDED_ID: Signal = Signal::new(24, 29);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanInputConfig {
    pub enabled: bool,
    pub timeout_enabled: bool,
    pub mode: InputMode,
    pub operator: Operator,
    /// First payload byte of the watched value
    pub start_byte: u8,
    /// Number of payload bytes in the watched value
    pub dlc: u8,
    /// Comparison operand
    pub on_value: u16,
    /// Seconds without the watched frame before the input drops, 0.1 s resolution
    pub timeout: f64,
    /// Watched value is big-endian
    pub big_endian: bool,
}

impl FunctionCodec for CanInputConfig {
    const PREFIX: MessagePrefix = MessagePrefix::CanInputs;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            timeout_enabled: fields.flag(&TIMEOUT_ENABLED)?,
            mode: fields.enumeration(&MODE, "input mode")?,
            operator: fields.enumeration(&OPERATOR, "operator")?,
            start_byte: fields.byte(&START_BYTE)?,
            dlc: fields.byte(&DLC)?,
            on_value: fields.word(&ON_VALUE)?,
            timeout: fields.scaled(&TIMEOUT)?,
            big_endian: fields.flag(&BIG_ENDIAN)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.flag(&TIMEOUT_ENABLED, self.timeout_enabled)?;
        fields.enumeration(&MODE, self.mode)?;
        fields.enumeration(&OPERATOR, self.operator)?;
        fields.uint(&START_BYTE, u64::from(self.start_byte))?;
        fields.uint(&DLC, u64::from(self.dlc))?;
        fields.uint(&ON_VALUE, u64::from(self.on_value))?;
        fields.scaled(&TIMEOUT, self.timeout)?;
        fields.flag(&BIG_ENDIAN, self.big_endian)
    }
}

/// Identifier a CAN input watches
///
/// The IDE flag follows the identifier: anything above 0x7FF is extended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct CanInputId {
    id: u32,
    ide: bool,
}

impl CanInputId {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ide: id > MAX_STANDARD_ID,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Extended (29-bit) identifier flag
    pub fn ide(&self) -> bool {
        self.ide
    }

    pub fn set_id(&mut self, id: u32) {
        *self = Self::new(id);
    }
}

impl From<u32> for CanInputId {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<CanInputId> for u32 {
    fn from(ident: CanInputId) -> Self {
        ident.id
    }
}

impl FunctionCodec for CanInputId {
    const PREFIX: MessagePrefix = MessagePrefix::CanInputsId;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = Some(ID_INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        let ide = fields.flag(&IDE)?;
        let id = if ide {
            fields.uint(&EXTENDED_ID)?
        } else {
            fields.uint(&STANDARD_ID)?
        };
        Ok(Self {
            id: id as u32,
            ide,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&IDE, self.ide)?;
        if self.ide {
            fields.uint(&EXTENDED_ID, u64::from(self.id))
        } else {
            fields.uint(&STANDARD_ID, u64::from(self.id))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanInput {
    number: u8,
    pub config: CanInputConfig,
    pub ident: CanInputId,
    /// Live boolean result
    #[serde(skip)]
    pub output: bool,
    /// Live raw value
    #[serde(skip)]
    pub value: u16,
}

impl CanInput {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: CanInputConfig::default(),
            ident: CanInputId::default(),
            output: false,
            value: 0,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn index(&self) -> u8 {
        self.number.saturating_sub(1)
    }

    pub fn request(tx_id: u32, index: u8) -> Frame {
        request_frame::<CanInputConfig>(tx_id, index)
    }

    pub fn request_id(tx_id: u32, index: u8) -> Frame {
        request_frame::<CanInputId>(tx_id, index)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn receive_id(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.ident, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, self.index())
    }

    pub fn write_id(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.ident, tx_id, self.index())
    }

    pub fn clear_live(&mut self) {
        self.output = false;
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::as_response;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_id_recomputes_ide() {
        let mut ident = CanInputId::new(0x100);
        assert!(!ident.ide());
        ident.set_id(0x800);
        assert!(ident.ide());
        ident.set_id(0x7FF);
        assert!(!ident.ide());
    }

    #[test]
    fn test_standard_id_layout() {
        let mut input = CanInput::new(5);
        input.ident.set_id(0x7FF);
        let frame = input.write_id(199).unwrap();
        assert_eq!(frame.payload(), &[61, 4, 0, 0xFF, 0x07, 0, 0, 0]);
    }

    #[test]
    fn test_extended_id_layout() {
        let mut input = CanInput::new(1);
        input.ident.set_id(0x18FF_1234);
        let frame = input.write_id(199).unwrap();
        assert_eq!(frame.payload(), &[61, 0, 1, 0x34, 0x12, 0xFF, 0x18, 0]);

        let mut target = CanInput::new(1);
        assert!(target.receive_id(&as_response(&frame)));
        assert_eq!(target.ident.id(), 0x18FF_1234);
        assert!(target.ident.ide());
    }

    #[test]
    fn test_standard_decode_ignores_extended_bits() {
        let mut input = CanInput::new(1);
        // IDE clear: only 11 bits are read
        assert!(input.receive_id(&[189, 0, 0, 0xFF, 0xFF, 0xFF, 0x1F, 0]));
        assert_eq!(input.ident.id(), 0x7FF);
        assert!(!input.ident.ide());
    }

    #[test]
    fn test_config_round_trip() {
        let mut source = CanInput::new(32);
        source.config = CanInputConfig {
            enabled: true,
            timeout_enabled: true,
            mode: InputMode::Latching,
            operator: Operator::BitwiseAnd,
            start_byte: 2,
            dlc: 2,
            on_value: 0x1234,
            timeout: 2.5,
            big_endian: true,
        };
        let frame = source.write(199).unwrap();
        assert_eq!(frame.payload(), &[60, 0x67, 31, 0x22, 0x34, 0x12, 25, 1]);

        let mut target = CanInput::new(32);
        assert!(target.receive(&as_response(&frame)));
        assert_eq!(target.config, source.config);
    }

    #[test]
    fn test_ident_serde_recomputes_ide() {
        let ident: CanInputId = serde_json::from_str("4096").unwrap();
        assert!(ident.ide());
        assert_eq!(serde_json::to_string(&ident).unwrap(), "4096");
    }
}
