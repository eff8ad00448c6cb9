//! Digital inputs

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;
use crate::types::{InputMode, InputPull};

const ENABLED: Signal = Signal::flag(8);
const INVERT: Signal = Signal::flag(9);
const MODE: Signal = Signal::new(10, 2);
const INDEX: Signal = Signal::new(12, 4);
const DEBOUNCE_MS: Signal = Signal::new(16, 8).scaled(10.0, 0.0);
const PULL: Signal = Signal::new(24, 2);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub enabled: bool,
    pub invert: bool,
    pub mode: InputMode,
    /// Debounce time in milliseconds, 10 ms resolution
    pub debounce_ms: u16,
    pub pull: InputPull,
}

impl FunctionCodec for InputConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Inputs;
    const LEN: usize = 4;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            invert: fields.flag(&INVERT)?,
            mode: fields.enumeration(&MODE, "input mode")?,
            debounce_ms: fields.scaled(&DEBOUNCE_MS)? as u16,
            pull: fields.enumeration(&PULL, "input pull")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.flag(&INVERT, self.invert)?;
        fields.enumeration(&MODE, self.mode)?;
        fields.scaled(&DEBOUNCE_MS, f64::from(self.debounce_ms))?;
        fields.enumeration(&PULL, self.pull)
    }
}

/// One physical input channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    number: u8,
    pub config: InputConfig,
    /// Live state from telemetry
    #[serde(skip)]
    pub state: bool,
}

impl Input {
    /// `number` is 1-based as shown to users
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: InputConfig::default(),
            state: false,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// 0-based index used on the wire
    pub fn index(&self) -> u8 {
        self.number.saturating_sub(1)
    }

    pub fn request(tx_id: u32, index: u8) -> Frame {
        request_frame::<InputConfig>(tx_id, index)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, self.index())
    }

    pub fn clear_live(&mut self) {
        self.state = false;
    }
}
