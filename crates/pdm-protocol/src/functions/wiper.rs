//! Wiper controller
//!
//! The wiper is a singleton configured through three messages: the main
//! settings, the speed map and the intermittent delays.

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::prefix::MessagePrefix;
use crate::types::{WiperMode, WiperSpeed, WiperState};

const ENABLED: Signal = Signal::flag(8);
const MODE: Signal = Signal::new(9, 2);
const PARK_STOP_LEVEL: Signal = Signal::flag(11);
const SLOW_INPUT: Signal = Signal::new(16, 8);
const FAST_INPUT: Signal = Signal::new(24, 8);
const INTER_INPUT: Signal = Signal::new(32, 8);
const ON_INPUT: Signal = Signal::new(40, 8);
const PARK_INPUT: Signal = Signal::new(48, 8);
const WASH_INPUT: Signal = Signal::new(56, 8);

const SWIPE_INPUT: Signal = Signal::new(8, 8);
const SPEED_INPUT: Signal = Signal::new(16, 8);
const SPEED_MAP_START: u8 = 24;

const WASH_WIPE_CYCLES: Signal = Signal::new(8, 8);
const DELAYS_START: u8 = 16;

/// Number of entries in the speed map
pub const SPEED_MAP_LEN: usize = 8;

/// Number of intermittent delays
pub const DELAY_COUNT: usize = 6;

const fn speed_slot(slot: usize) -> Signal {
    Signal::new(SPEED_MAP_START + 4 * slot as u8, 4)
}

const fn delay_slot(slot: usize) -> Signal {
    Signal::new(DELAYS_START + 8 * slot as u8, 8).scaled(0.1, 0.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiperConfig {
    pub enabled: bool,
    pub mode: WiperMode,
    /// Park switch level that means parked
    pub park_stop_level: bool,
    pub slow_input: u8,
    pub fast_input: u8,
    pub inter_input: u8,
    pub on_input: u8,
    pub park_input: u8,
    pub wash_input: u8,
}

impl FunctionCodec for WiperConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Wiper;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            mode: fields.enumeration(&MODE, "wiper mode")?,
            park_stop_level: fields.flag(&PARK_STOP_LEVEL)?,
            slow_input: fields.byte(&SLOW_INPUT)?,
            fast_input: fields.byte(&FAST_INPUT)?,
            inter_input: fields.byte(&INTER_INPUT)?,
            on_input: fields.byte(&ON_INPUT)?,
            park_input: fields.byte(&PARK_INPUT)?,
            wash_input: fields.byte(&WASH_INPUT)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.enumeration(&MODE, self.mode)?;
        fields.flag(&PARK_STOP_LEVEL, self.park_stop_level)?;
        fields.uint(&SLOW_INPUT, u64::from(self.slow_input))?;
        fields.uint(&FAST_INPUT, u64::from(self.fast_input))?;
        fields.uint(&INTER_INPUT, u64::from(self.inter_input))?;
        fields.uint(&ON_INPUT, u64::from(self.on_input))?;
        fields.uint(&PARK_INPUT, u64::from(self.park_input))?;
        fields.uint(&WASH_INPUT, u64::from(self.wash_input))
    }
}

/// Maps the speed input value (0..8) to a wiper speed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiperSpeedMap {
    pub swipe_input: u8,
    pub speed_input: u8,
    pub speed_map: [WiperSpeed; SPEED_MAP_LEN],
}

impl FunctionCodec for WiperSpeedMap {
    const PREFIX: MessagePrefix = MessagePrefix::WiperSpeed;
    const LEN: usize = 7;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        let mut speed_map = [WiperSpeed::Park; SPEED_MAP_LEN];
        for (slot, speed) in speed_map.iter_mut().enumerate() {
            *speed = fields.enumeration(&speed_slot(slot), "wiper speed")?;
        }
        Ok(Self {
            swipe_input: fields.byte(&SWIPE_INPUT)?,
            speed_input: fields.byte(&SPEED_INPUT)?,
            speed_map,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.uint(&SWIPE_INPUT, u64::from(self.swipe_input))?;
        fields.uint(&SPEED_INPUT, u64::from(self.speed_input))?;
        for (slot, speed) in self.speed_map.iter().enumerate() {
            fields.enumeration(&speed_slot(slot), *speed)?;
        }
        Ok(())
    }
}

/// Intermittent pause lengths and wash behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiperDelays {
    /// Wipe cycles after washing stops
    pub wash_wipe_cycles: u8,
    /// Intermittent delays in seconds, 0.1 s resolution
    pub delays: [f64; DELAY_COUNT],
}

impl FunctionCodec for WiperDelays {
    const PREFIX: MessagePrefix = MessagePrefix::WiperDelays;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        let mut delays = [0.0; DELAY_COUNT];
        for (slot, delay) in delays.iter_mut().enumerate() {
            *delay = fields.scaled(&delay_slot(slot))?;
        }
        Ok(Self {
            wash_wipe_cycles: fields.byte(&WASH_WIPE_CYCLES)?,
            delays,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.uint(&WASH_WIPE_CYCLES, u64::from(self.wash_wipe_cycles))?;
        for (slot, delay) in self.delays.iter().enumerate() {
            fields.scaled(&delay_slot(slot), *delay)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wiper {
    pub config: WiperConfig,
    pub speeds: WiperSpeedMap,
    pub delays: WiperDelays,
    #[serde(skip)]
    pub slow_state: bool,
    #[serde(skip)]
    pub fast_state: bool,
    #[serde(skip)]
    pub state: WiperState,
    #[serde(skip)]
    pub speed: WiperSpeed,
}

impl Wiper {
    pub fn request(tx_id: u32) -> Frame {
        request_frame::<WiperConfig>(tx_id, 0)
    }

    pub fn request_speed(tx_id: u32) -> Frame {
        request_frame::<WiperSpeedMap>(tx_id, 0)
    }

    pub fn request_delays(tx_id: u32) -> Frame {
        request_frame::<WiperDelays>(tx_id, 0)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn receive_speed(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.speeds, payload)
    }

    pub fn receive_delays(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.delays, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, 0)
    }

    pub fn write_speed(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.speeds, tx_id, 0)
    }

    pub fn write_delays(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.delays, tx_id, 0)
    }

    pub fn clear_live(&mut self) {
        self.slow_state = false;
        self.fast_state = false;
        self.state = WiperState::Parked;
        self.speed = WiperSpeed::Park;
    }
}
