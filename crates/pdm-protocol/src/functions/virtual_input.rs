//! Virtual inputs: up to three variables combined with boolean operators

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;
use crate::types::{BoolOperator, InputMode};

const ENABLED: Signal = Signal::flag(8);
const NOT0: Signal = Signal::flag(9);
const NOT1: Signal = Signal::flag(10);
const NOT2: Signal = Signal::flag(11);
const INDEX: Signal = Signal::new(12, 4);
const VAR0: Signal = Signal::new(16, 8);
const VAR1: Signal = Signal::new(24, 8);
const VAR2: Signal = Signal::new(32, 8);
const COND0: Signal = Signal::new(40, 4);
const COND1: Signal = Signal::new(44, 4);
const MODE: Signal = Signal::new(48, 2);

/// `((not0 var0) cond0 (not1 var1)) cond1 (not2 var2)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualInputConfig {
    pub enabled: bool,
    pub not0: bool,
    pub var0: u8,
    pub cond0: BoolOperator,
    pub not1: bool,
    pub var1: u8,
    pub cond1: BoolOperator,
    pub not2: bool,
    pub var2: u8,
    pub mode: InputMode,
}

impl FunctionCodec for VirtualInputConfig {
    const PREFIX: MessagePrefix = MessagePrefix::VirtualInputs;
    const LEN: usize = 7;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            not0: fields.flag(&NOT0)?,
            var0: fields.byte(&VAR0)?,
            cond0: fields.enumeration(&COND0, "condition 0")?,
            not1: fields.flag(&NOT1)?,
            var1: fields.byte(&VAR1)?,
            cond1: fields.enumeration(&COND1, "condition 1")?,
            not2: fields.flag(&NOT2)?,
            var2: fields.byte(&VAR2)?,
            mode: fields.enumeration(&MODE, "input mode")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.flag(&NOT0, self.not0)?;
        fields.flag(&NOT1, self.not1)?;
        fields.flag(&NOT2, self.not2)?;
        fields.uint(&VAR0, u64::from(self.var0))?;
        fields.uint(&VAR1, u64::from(self.var1))?;
        fields.uint(&VAR2, u64::from(self.var2))?;
        fields.enumeration(&COND0, self.cond0)?;
        fields.enumeration(&COND1, self.cond1)?;
        fields.enumeration(&MODE, self.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualInput {
    number: u8,
    pub config: VirtualInputConfig,
    #[serde(skip)]
    pub value: bool,
}

impl VirtualInput {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: VirtualInputConfig::default(),
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
        request_frame::<VirtualInputConfig>(tx_id, index)
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
