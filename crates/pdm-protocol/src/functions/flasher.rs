//! Flashers

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;

const ENABLED: Signal = Signal::flag(8);
const SINGLE_CYCLE: Signal = Signal::flag(9);
const INDEX: Signal = Signal::new(12, 4);
const INPUT: Signal = Signal::new(16, 8);
const ON_TIME: Signal = Signal::new(24, 8).scaled(0.1, 0.0);
const OFF_TIME: Signal = Signal::new(32, 8).scaled(0.1, 0.0);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlasherConfig {
    pub enabled: bool,
    pub single_cycle: bool,
    pub input: u8,
    /// Seconds on, 0.1 s resolution
    pub on_time: f64,
    /// Seconds off, 0.1 s resolution
    pub off_time: f64,
}

impl FunctionCodec for FlasherConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Flashers;
    const LEN: usize = 5;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            single_cycle: fields.flag(&SINGLE_CYCLE)?,
            input: fields.byte(&INPUT)?,
            on_time: fields.scaled(&ON_TIME)?,
            off_time: fields.scaled(&OFF_TIME)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.flag(&SINGLE_CYCLE, self.single_cycle)?;
        fields.uint(&INPUT, u64::from(self.input))?;
        fields.scaled(&ON_TIME, self.on_time)?;
        fields.scaled(&OFF_TIME, self.off_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flasher {
    number: u8,
    pub config: FlasherConfig,
    #[serde(skip)]
    pub value: bool,
}

impl Flasher {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: FlasherConfig::default(),
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
        request_frame::<FlasherConfig>(tx_id, index)
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
