//! High-side outputs and their PWM settings

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::{encode_frame, receive_into, request_frame, FieldReader, FieldWriter, FunctionCodec};
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;
use crate::prefix::MessagePrefix;
use crate::types::{OutState, ResetMode};

const INDEX: Signal = Signal::new(12, 4);

const ENABLED: Signal = Signal::flag(8);
const INPUT: Signal = Signal::new(16, 8);
const CURRENT_LIMIT: Signal = Signal::new(24, 8);
const RESET_MODE: Signal = Signal::new(32, 4);
const RESET_LIMIT: Signal = Signal::new(36, 4);
const RESET_TIME: Signal = Signal::new(40, 8).scaled(0.1, 0.0);
const INRUSH_LIMIT: Signal = Signal::new(48, 8);
const INRUSH_TIME: Signal = Signal::new(56, 8).scaled(0.1, 0.0);

const PWM_ENABLED: Signal = Signal::flag(8);
const SOFT_START: Signal = Signal::flag(9);
const VARIABLE_DUTY: Signal = Signal::flag(10);
const DUTY_INPUT: Signal = Signal::new(16, 8);
// 9-bit frequency split across two fields
const FREQUENCY_UPPER: Signal = Signal::new(24, 8);
const FREQUENCY_LOW: Signal = Signal::flag(32);
const FIXED_DUTY: Signal = Signal::new(33, 7);
const SOFT_START_RAMP: Signal = Signal::new(40, 16);
const DUTY_DENOMINATOR: Signal = Signal::new(56, 8);

/// Largest PWM frequency the split field can carry, in Hz
pub const MAX_PWM_FREQUENCY: u16 = 511;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub enabled: bool,
    /// Variable number driving the output
    pub input: u8,
    /// Current limit in amps
    pub current_limit: u8,
    pub reset_mode: ResetMode,
    pub reset_count_limit: u8,
    /// Seconds before an automatic reset, 0.1 s resolution
    pub reset_time: f64,
    /// Inrush current limit in amps
    pub inrush_limit: u8,
    /// Inrush window in seconds, 0.1 s resolution
    pub inrush_time: f64,
}

impl FunctionCodec for OutputConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Outputs;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            enabled: fields.flag(&ENABLED)?,
            input: fields.byte(&INPUT)?,
            current_limit: fields.byte(&CURRENT_LIMIT)?,
            reset_mode: fields.enumeration(&RESET_MODE, "reset mode")?,
            reset_count_limit: fields.byte(&RESET_LIMIT)?,
            reset_time: fields.scaled(&RESET_TIME)?,
            inrush_limit: fields.byte(&INRUSH_LIMIT)?,
            inrush_time: fields.scaled(&INRUSH_TIME)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ENABLED, self.enabled)?;
        fields.uint(&INPUT, u64::from(self.input))?;
        fields.uint(&CURRENT_LIMIT, u64::from(self.current_limit))?;
        fields.enumeration(&RESET_MODE, self.reset_mode)?;
        fields.uint(&RESET_LIMIT, u64::from(self.reset_count_limit))?;
        fields.scaled(&RESET_TIME, self.reset_time)?;
        fields.uint(&INRUSH_LIMIT, u64::from(self.inrush_limit))?;
        fields.scaled(&INRUSH_TIME, self.inrush_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPwmConfig {
    pub enabled: bool,
    pub soft_start: bool,
    pub variable_duty_cycle: bool,
    /// Variable number supplying the duty cycle when variable
    pub duty_cycle_input: u8,
    /// PWM frequency in Hz, up to [`MAX_PWM_FREQUENCY`]
    pub frequency: u16,
    /// Fixed duty cycle in percent
    pub fixed_duty_cycle: u8,
    /// Soft-start ramp in milliseconds
    pub soft_start_ramp_ms: u16,
    pub duty_cycle_denominator: u8,
}

impl FunctionCodec for OutputPwmConfig {
    const PREFIX: MessagePrefix = MessagePrefix::OutputsPwm;
    const LEN: usize = 8;
    const INDEX: Option<Signal> = Some(INDEX);

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        let upper = fields.uint(&FREQUENCY_UPPER)?;
        let low = fields.uint(&FREQUENCY_LOW)?;
        Ok(Self {
            enabled: fields.flag(&PWM_ENABLED)?,
            soft_start: fields.flag(&SOFT_START)?,
            variable_duty_cycle: fields.flag(&VARIABLE_DUTY)?,
            duty_cycle_input: fields.byte(&DUTY_INPUT)?,
            frequency: ((upper << 1) | low) as u16,
            fixed_duty_cycle: fields.byte(&FIXED_DUTY)?,
            soft_start_ramp_ms: fields.word(&SOFT_START_RAMP)?,
            duty_cycle_denominator: fields.byte(&DUTY_DENOMINATOR)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        if self.fixed_duty_cycle > 100 {
            return Err(ProtocolError::InvalidValue {
                field: "fixed duty cycle",
                value: u64::from(self.fixed_duty_cycle),
            });
        }
        if self.frequency > MAX_PWM_FREQUENCY {
            return Err(ProtocolError::InvalidValue {
                field: "pwm frequency",
                value: u64::from(self.frequency),
            });
        }
        fields.flag(&PWM_ENABLED, self.enabled)?;
        fields.flag(&SOFT_START, self.soft_start)?;
        fields.flag(&VARIABLE_DUTY, self.variable_duty_cycle)?;
        fields.uint(&DUTY_INPUT, u64::from(self.duty_cycle_input))?;
        fields.uint(&FREQUENCY_UPPER, u64::from(self.frequency >> 1))?;
        fields.uint(&FREQUENCY_LOW, u64::from(self.frequency & 1))?;
        fields.uint(&FIXED_DUTY, u64::from(self.fixed_duty_cycle))?;
        fields.uint(&SOFT_START_RAMP, u64::from(self.soft_start_ramp_ms))?;
        fields.uint(&DUTY_DENOMINATOR, u64::from(self.duty_cycle_denominator))
    }
}

/// One output channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    number: u8,
    pub config: OutputConfig,
    pub pwm: OutputPwmConfig,
    /// Live current in amps
    #[serde(skip)]
    pub current: f64,
    #[serde(skip)]
    pub state: OutState,
    #[serde(skip)]
    pub reset_count: u8,
}

impl Output {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            config: OutputConfig::default(),
            pwm: OutputPwmConfig::default(),
            current: 0.0,
            state: OutState::Off,
            reset_count: 0,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn index(&self) -> u8 {
        self.number.saturating_sub(1)
    }

    pub fn request(tx_id: u32, index: u8) -> Frame {
        request_frame::<OutputConfig>(tx_id, index)
    }

    pub fn request_pwm(tx_id: u32, index: u8) -> Frame {
        request_frame::<OutputPwmConfig>(tx_id, index)
    }

    pub fn receive(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.config, payload)
    }

    pub fn receive_pwm(&mut self, payload: &[u8]) -> bool {
        receive_into(&mut self.pwm, payload)
    }

    pub fn write(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.config, tx_id, self.index())
    }

    pub fn write_pwm(&self, tx_id: u32) -> ProtocolResult<Frame> {
        encode_frame(&self.pwm, tx_id, self.index())
    }

    pub fn clear_live(&mut self) {
        self.current = 0.0;
        self.state = OutState::Off;
        self.reset_count = 0;
    }
}
