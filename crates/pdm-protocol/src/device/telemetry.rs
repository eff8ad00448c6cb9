//! Cyclic telemetry frames (offsets 0-15) and the device log (offset 31)
//!
//! Each frame is decoded in full before anything is written to the device,
//! so a frame carrying an invalid enumerated value changes nothing.

use pdm_signal::Signal;
use serde::Serialize;

use super::PdmDevice;
use crate::error::ProtocolResult;
use crate::frame::padded;
use crate::functions::FieldReader;
use crate::types::{DeviceState, LogLevel, OutState, WiperSpeed, WiperState};

const DEVICE_STATE: Signal = Signal::new(8, 4);
const TYPE_CODE: Signal = Signal::new(12, 4);
const TOTAL_CURRENT: Signal = Signal::new(16, 16).scaled(0.1, 0.0);
const BATTERY_VOLTAGE: Signal = Signal::new(32, 16).scaled(0.01, 0.0);
const BOARD_TEMPERATURE: Signal = Signal::new(48, 16).signed().scaled(0.1, 0.0);

const WIPER_SLOW: Signal = Signal::flag(52);
const WIPER_FAST: Signal = Signal::flag(53);
const STARTER_ACTIVE: Signal = Signal::flag(54);
const WIPER_STATE: Signal = Signal::new(56, 4);
const WIPER_SPEED: Signal = Signal::new(60, 4);

const LOG_LEVEL: Signal = Signal::new(0, 8);
const LOG_CODE: Signal = Signal::new(8, 16);

/// Device-wide values from telemetry offset 0
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceTelemetry {
    pub state: DeviceState,
    pub type_code: u8,
    /// Amps
    pub total_current: f64,
    /// Volts
    pub battery_voltage: f64,
    /// Degrees Celsius
    pub board_temperature: f64,
}

/// Last log message pushed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceLog {
    pub level: LogLevel,
    pub code: u16,
    pub params: [u8; 5],
}

impl DeviceLog {
    pub(super) fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let data = padded(payload);
        let fields = FieldReader::new(&data);
        let mut params = [0u8; 5];
        params.copy_from_slice(&data[3..8]);
        Ok(Self {
            level: fields.enumeration(&LOG_LEVEL, "log level")?,
            code: fields.word(&LOG_CODE)?,
            params,
        })
    }
}

const fn bit(n: usize) -> Signal {
    Signal::flag(n as u8)
}

const fn nibble(slot: usize) -> Signal {
    Signal::new(4 * slot as u8, 4)
}

/// Apply telemetry frame `offset` to the device's live fields
pub(super) fn apply(device: &mut PdmDevice, offset: u32, data: &[u8; 8]) -> ProtocolResult<()> {
    let fields = FieldReader::new(data);
    match offset {
        0 => apply_status(device, &fields),
        1..=3 => {
            let first = (offset as usize - 1) * 4;
            let mut currents = [0.0; 4];
            for (k, current) in currents.iter_mut().enumerate() {
                *current = fields.scaled(&Signal::new(16 * k as u8, 16).scaled(0.1, 0.0))?;
            }
            for (output, current) in device.outputs.iter_mut().skip(first).zip(currents) {
                output.current = current;
            }
            Ok(())
        }
        4 => {
            let mut states = [OutState::Off; 16];
            for (slot, state) in states.iter_mut().enumerate() {
                *state = fields.enumeration(&nibble(slot), "output state")?;
            }
            for (output, state) in device.outputs.iter_mut().zip(states) {
                output.state = state;
            }
            Ok(())
        }
        5 => {
            for (slot, output) in device.outputs.iter_mut().enumerate().take(16) {
                output.reset_count = fields.byte(&nibble(slot))?;
            }
            Ok(())
        }
        6 => {
            for (k, counter) in device.counters.iter_mut().enumerate().take(4) {
                counter.value = fields.byte(&Signal::new(8 * k as u8, 8))?;
            }
            for (k, condition) in device.conditions.iter_mut().enumerate().take(32) {
                condition.value = fields.flag(&bit(32 + k))?;
            }
            Ok(())
        }
        7 => apply_states(device, &fields),
        8..=15 => {
            let first = (offset as usize - 8) * 4;
            for (k, input) in device.can_inputs.iter_mut().skip(first).take(4).enumerate() {
                input.value = fields.word(&Signal::new(16 * k as u8, 16))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn apply_status(device: &mut PdmDevice, fields: &FieldReader<'_>) -> ProtocolResult<()> {
    let telemetry = DeviceTelemetry {
        state: fields.enumeration(&DEVICE_STATE, "device state")?,
        type_code: fields.byte(&TYPE_CODE)?,
        total_current: fields.scaled(&TOTAL_CURRENT)?,
        battery_voltage: fields.scaled(&BATTERY_VOLTAGE)?,
        board_temperature: fields.scaled(&BOARD_TEMPERATURE)?,
    };
    for (k, input) in device.inputs.iter_mut().enumerate().take(8) {
        input.state = fields.flag(&bit(k))?;
    }
    device.telemetry = telemetry;
    Ok(())
}

fn apply_states(device: &mut PdmDevice, fields: &FieldReader<'_>) -> ProtocolResult<()> {
    let wiper_state: WiperState = fields.enumeration(&WIPER_STATE, "wiper state")?;
    let wiper_speed: WiperSpeed = fields.enumeration(&WIPER_SPEED, "wiper speed")?;

    for (k, input) in device.can_inputs.iter_mut().enumerate().take(32) {
        input.output = fields.flag(&bit(k))?;
    }
    for (k, input) in device.virtual_inputs.iter_mut().enumerate().take(16) {
        input.value = fields.flag(&bit(32 + k))?;
    }
    for (k, flasher) in device.flashers.iter_mut().enumerate().take(4) {
        flasher.value = fields.flag(&bit(48 + k))?;
    }
    device.wiper.slow_state = fields.flag(&WIPER_SLOW)?;
    device.wiper.fast_state = fields.flag(&WIPER_FAST)?;
    device.starter_disable.active = fields.flag(&STARTER_ACTIVE)?;
    device.wiper.state = wiper_state;
    device.wiper.speed = wiper_speed;
    Ok(())
}
