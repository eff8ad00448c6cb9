//! Conditions: a variable compared against a constant

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;
use crate::types::Operator;

const INDEX: Signal = Signal::new(8, 8);
const ENABLED: Signal = Signal::flag(16);
const OPERATOR: Signal = Signal::new(20, 4);
const INPUT: Signal = Signal::new(24, 8);
const ARG: Signal = Signal::new(32, 16);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    pub enabled: bool,
    pub operator: Operator,
    pub input: u8,
    pub arg: u16,
}

impl FunctionCodec for ConditionConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Conditions;
    const LEN: usize = 6;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            operator: fields.enumeration(&OPERATOR, "operator")?,
            input: fields.byte(&INPUT)?,
            arg: fields.word(&ARG)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.enumeration(&OPERATOR, self.operator)?;
        fields.uint(&INPUT, u64::from(self.input))?;
        fields.uint(&ARG, u64::from(self.arg))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    number: u8,
    pub config: ConditionConfig,
    #[serde(skip)]
    pub value: bool,
}

impl Condition {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: ConditionConfig::default(),
            value: false,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn index(&self) -> u8 {
        self.number.saturating_sub(1)
    }

    pub fn request(tx_id: u32, index: u8) -> Frame {
        request_frame::<ConditionConfig>(tx_id, index)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, self.index())
    }

    pub fn clear_live(&mut self) {
        self.value = false;
    }
}
