//! Edge counters

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;
use crate::types::InputEdge;

const ENABLED: Signal = Signal::flag(8);
const WRAP_AROUND: Signal = Signal::flag(9);
const INDEX: Signal = Signal::new(12, 4);
const INCREMENT_INPUT: Signal = Signal::new(16, 8);
const DECREMENT_INPUT: Signal = Signal::new(24, 8);
const RESET_INPUT: Signal = Signal::new(32, 8);
const MIN_COUNT: Signal = Signal::new(40, 8);
const MAX_COUNT: Signal = Signal::new(48, 8);
const INCREMENT_EDGE: Signal = Signal::new(56, 2);
const DECREMENT_EDGE: Signal = Signal::new(58, 2);
const RESET_EDGE: Signal = Signal::new(60, 2);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub enabled: bool,
    pub wrap_around: bool,
    pub increment_input: u8,
    pub decrement_input: u8,
    pub reset_input: u8,
    pub min_count: u8,
    pub max_count: u8,
    pub increment_edge: InputEdge,
    pub decrement_edge: InputEdge,
    pub reset_edge: InputEdge,
}

impl FunctionCodec for CounterConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Counters;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            wrap_around: fields.flag(&WRAP_AROUND)?,
            increment_input: fields.byte(&INCREMENT_INPUT)?,
            decrement_input: fields.byte(&DECREMENT_INPUT)?,
            reset_input: fields.byte(&RESET_INPUT)?,
            min_count: fields.byte(&MIN_COUNT)?,
            max_count: fields.byte(&MAX_COUNT)?,
            increment_edge: fields.enumeration(&INCREMENT_EDGE, "increment edge")?,
            decrement_edge: fields.enumeration(&DECREMENT_EDGE, "decrement edge")?,
            reset_edge: fields.enumeration(&RESET_EDGE, "reset edge")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.flag(&WRAP_AROUND, self.wrap_around)?;
        fields.uint(&INCREMENT_INPUT, u64::from(self.increment_input))?;
        fields.uint(&DECREMENT_INPUT, u64::from(self.decrement_input))?;
        fields.uint(&RESET_INPUT, u64::from(self.reset_input))?;
        fields.uint(&MIN_COUNT, u64::from(self.min_count))?;
        fields.uint(&MAX_COUNT, u64::from(self.max_count))?;
        fields.enumeration(&INCREMENT_EDGE, self.increment_edge)?;
        fields.enumeration(&DECREMENT_EDGE, self.decrement_edge)?;
        fields.enumeration(&RESET_EDGE, self.reset_edge)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    number: u8,
    pub config: CounterConfig,
    #[serde(skip)]
    pub value: u8,
}

impl Counter {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: CounterConfig::default(),
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
        request_frame::<CounterConfig>(tx_id, index)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, self.index())
    }

    pub fn clear_live(&mut self) {
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_layout() {
        let mut counter = Counter::new(4);
        counter.config = CounterConfig {
            enabled: true,
            wrap_around: true,
            increment_input: 10,
            decrement_input: 11,
            reset_input: 12,
            min_count: 0,
            max_count: 8,
            increment_edge: InputEdge::Rising,
            decrement_edge: InputEdge::Falling,
            reset_edge: InputEdge::Both,
        };
        let frame = counter.write(199).unwrap();
        assert_eq!(frame.payload(), &[70, 0x33, 10, 11, 12, 0, 8, 0x24]);
    }

    #[test]
    fn test_receive() {
        let mut counter = Counter::new(1);
        assert!(counter.receive(&[198, 0x01, 1, 2, 3, 1, 5, 0x01]));
        assert!(counter.config.enabled);
        assert!(!counter.config.wrap_around);
        assert_eq!(counter.config.max_count, 5);
        assert_eq!(counter.config.increment_edge, InputEdge::Falling);
    }
}
