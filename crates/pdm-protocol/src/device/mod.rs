//! PDM device model and frame router
//!
//! A [`PdmDevice`] owns a 32-identifier window starting at its base ID:
//!
//! | Offset | Content |
//! |--------|---------|
//! | 0-15   | cyclic telemetry |
//! | 30     | settings responses (`prefix + 128` in byte 0) |
//! | 31     | device log |
//!
//! Host commands go out on `base_id - 1`, just below the window.

mod settings;
mod telemetry;
mod variant;

pub use settings::{BurnAck, CanConfig, CanSettings, SleepAck};
pub use telemetry::{DeviceLog, DeviceTelemetry};
pub use variant::{FirmwareVersion, PdmKind, VariantSpec};

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{Frame, MAX_STANDARD_ID};
use crate::functions::{
    decode_payload, encode_frame, request_frame, response_index, CanInput, CanInputConfig,
    CanInputId, Condition, ConditionConfig, Counter, CounterConfig, Flasher, FlasherConfig,
    FunctionCodec, Input, InputConfig, Output, OutputConfig, OutputPwmConfig, StarterDisable,
    StarterDisableConfig, VirtualInput, VirtualInputConfig, Wiper, WiperConfig, WiperDelays,
    WiperSpeedMap,
};
use crate::pending::{PendingKey, PendingRequests};
use crate::prefix::MessagePrefix;

/// Number of identifiers owned by one device
pub const WINDOW_SIZE: u32 = 32;

/// Window offset carrying settings responses
pub const SETTINGS_RESPONSE_OFFSET: u32 = 30;

/// Window offset carrying device log messages
pub const LOG_OFFSET: u32 = 31;

/// Silence after which a device counts as disconnected
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(500);

pub const NUM_VIRTUAL_INPUTS: usize = 16;
pub const NUM_CAN_INPUTS: usize = 32;
pub const NUM_COUNTERS: usize = 4;
pub const NUM_CONDITIONS: usize = 32;
pub const NUM_FLASHERS: usize = 4;

/// A frame bound for a device plus what it should be answered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMessage {
    pub frame: Frame,
    pub prefix: MessagePrefix,
    pub index: u8,
    pub expects_response: bool,
}

impl DeviceMessage {
    fn answered(frame: Frame, prefix: MessagePrefix, index: u8) -> Self {
        Self {
            frame,
            prefix,
            index,
            expects_response: true,
        }
    }

    fn unanswered(frame: Frame, prefix: MessagePrefix) -> Self {
        Self {
            frame,
            prefix,
            index: 0,
            expects_response: false,
        }
    }

    /// Key of the settings response that completes this message
    pub fn pending_key(&self, base_id: u32) -> Option<PendingKey> {
        self.expects_response
            .then(|| PendingKey::new(base_id, self.prefix, self.index))
    }
}

fn request_msg<C: FunctionCodec>(tx_id: u32, index: u8) -> DeviceMessage {
    DeviceMessage::answered(request_frame::<C>(tx_id, index), C::PREFIX, index)
}

fn write_msg<C: FunctionCodec>(frame: Frame, index: u8) -> DeviceMessage {
    DeviceMessage::answered(frame, C::PREFIX, index)
}

/// Apply a settings response to the instance it names
fn receive_indexed<T>(
    items: &mut [T],
    payload: &[u8],
    index_of: fn(&[u8]) -> Option<u8>,
    receive: fn(&mut T, &[u8]) -> bool,
) -> Option<u8> {
    let index = index_of(payload)?;
    let item = items.get_mut(usize::from(index))?;
    receive(item, payload).then_some(index)
}

fn validate_base_id(base_id: u32) -> ProtocolResult<()> {
    if base_id == 0 || base_id + (WINDOW_SIZE - 1) > MAX_STANDARD_ID {
        return Err(ProtocolError::InvalidBaseId(base_id));
    }
    Ok(())
}

fn numbered<T>(count: usize, new: fn(u8) -> T) -> Vec<T> {
    (1..=count).map(|number| new(number as u8)).collect()
}

/// One PDM on the bus
#[derive(Debug, Clone)]
pub struct PdmDevice {
    id: Uuid,
    pub name: String,
    kind: PdmKind,
    base_id: u32,
    pub can: CanSettings,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub virtual_inputs: Vec<VirtualInput>,
    pub can_inputs: Vec<CanInput>,
    pub counters: Vec<Counter>,
    pub conditions: Vec<Condition>,
    pub flashers: Vec<Flasher>,
    pub wiper: Wiper,
    pub starter_disable: StarterDisable,
    pub telemetry: DeviceTelemetry,
    /// Last firmware version reported by the device
    pub firmware: Option<FirmwareVersion>,
    pub last_log: Option<DeviceLog>,
    last_rx: Option<Instant>,
    connected: bool,
}

impl PdmDevice {
    pub fn new(name: impl Into<String>, kind: PdmKind, base_id: u32) -> ProtocolResult<Self> {
        validate_base_id(base_id)?;
        let spec = kind.spec();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            base_id,
            can: CanSettings::default(),
            inputs: numbered(spec.num_inputs, Input::new),
            outputs: numbered(spec.num_outputs, Output::new),
            virtual_inputs: numbered(NUM_VIRTUAL_INPUTS, VirtualInput::new),
            can_inputs: numbered(NUM_CAN_INPUTS, CanInput::new),
            counters: numbered(NUM_COUNTERS, Counter::new),
            conditions: numbered(NUM_CONDITIONS, Condition::new),
            flashers: numbered(NUM_FLASHERS, Flasher::new),
            wiper: Wiper::default(),
            starter_disable: StarterDisable::default(),
            telemetry: DeviceTelemetry::default(),
            firmware: None,
            last_log: None,
            last_rx: None,
            connected: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> PdmKind {
        self.kind
    }

    pub fn base_id(&self) -> u32 {
        self.base_id
    }

    /// Identifier host commands are sent on
    pub fn tx_id(&self) -> u32 {
        self.base_id - 1
    }

    /// Move the device window, typically after an update message was acknowledged
    pub fn set_base_id(&mut self, base_id: u32) -> ProtocolResult<()> {
        validate_base_id(base_id)?;
        self.base_id = base_id;
        Ok(())
    }

    pub fn in_id_range(&self, id: u32) -> bool {
        id >= self.base_id && id < self.base_id + WINDOW_SIZE
    }

    pub fn last_rx(&self) -> Option<Instant> {
        self.last_rx
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ========================================================================
    // Receive path
    // ========================================================================

    /// Route a received frame; false when the identifier is outside the window
    pub fn read(&mut self, frame: &Frame, pending: &PendingRequests) -> bool {
        self.read_at(frame, pending, Instant::now())
    }

    pub fn read_at(&mut self, frame: &Frame, pending: &PendingRequests, now: Instant) -> bool {
        if !self.in_id_range(frame.id()) {
            return false;
        }

        let offset = frame.id() - self.base_id;
        match offset {
            0..=15 => {
                if let Err(e) = telemetry::apply(self, offset, frame.data()) {
                    debug!(device = %self.name, offset, error = %e, "Ignoring telemetry frame");
                }
            }
            SETTINGS_RESPONSE_OFFSET => self.read_settings(frame.payload(), pending),
            LOG_OFFSET => self.read_log(frame.payload()),
            _ => trace!(device = %self.name, offset, "Frame on unassigned offset"),
        }

        self.last_rx = Some(now);
        self.refresh_connection(now);
        true
    }

    fn read_settings(&mut self, payload: &[u8], pending: &PendingRequests) {
        let Some(&first) = payload.first() else {
            debug!(device = %self.name, "Empty settings response");
            return;
        };
        let prefix = match MessagePrefix::from_response(first) {
            Ok(prefix) => prefix,
            Err(e) => {
                debug!(device = %self.name, error = %e, "Ignoring settings response");
                return;
            }
        };

        match self.apply_settings(prefix, payload) {
            Some(index) => {
                let key = PendingKey::new(self.base_id, prefix, index);
                if pending.resolve(&key) {
                    trace!(device = %self.name, ?key, "Resolved pending request");
                }
            }
            None => debug!(
                device = %self.name,
                ?prefix,
                len = payload.len(),
                "Settings response not applied"
            ),
        }
    }

    /// Dispatch a settings response; returns the index it applied to
    fn apply_settings(&mut self, prefix: MessagePrefix, payload: &[u8]) -> Option<u8> {
        match prefix {
            MessagePrefix::Can => {
                let config = decode_payload::<CanConfig>(payload)?;
                if u32::from(config.base_id) != self.base_id {
                    warn!(
                        device = %self.name,
                        reported = config.base_id,
                        base_id = self.base_id,
                        "Device reports a different base ID"
                    );
                }
                self.can = config.settings;
                Some(0)
            }
            MessagePrefix::Inputs => receive_indexed(
                &mut self.inputs,
                payload,
                response_index::<InputConfig>,
                Input::receive,
            ),
            MessagePrefix::Outputs => receive_indexed(
                &mut self.outputs,
                payload,
                response_index::<OutputConfig>,
                Output::receive,
            ),
            MessagePrefix::OutputsPwm => receive_indexed(
                &mut self.outputs,
                payload,
                response_index::<OutputPwmConfig>,
                Output::receive_pwm,
            ),
            MessagePrefix::VirtualInputs => receive_indexed(
                &mut self.virtual_inputs,
                payload,
                response_index::<VirtualInputConfig>,
                VirtualInput::receive,
            ),
            MessagePrefix::CanInputs => receive_indexed(
                &mut self.can_inputs,
                payload,
                response_index::<CanInputConfig>,
                CanInput::receive,
            ),
            MessagePrefix::CanInputsId => receive_indexed(
                &mut self.can_inputs,
                payload,
                response_index::<CanInputId>,
                CanInput::receive_id,
            ),
            MessagePrefix::Counters => receive_indexed(
                &mut self.counters,
                payload,
                response_index::<CounterConfig>,
                Counter::receive,
            ),
            MessagePrefix::Conditions => receive_indexed(
                &mut self.conditions,
                payload,
                response_index::<ConditionConfig>,
                Condition::receive,
            ),
            MessagePrefix::Flashers => receive_indexed(
                &mut self.flashers,
                payload,
                response_index::<FlasherConfig>,
                Flasher::receive,
            ),
            MessagePrefix::Wiper => self.wiper.receive(payload).then_some(0),
            MessagePrefix::WiperSpeed => self.wiper.receive_speed(payload).then_some(0),
            MessagePrefix::WiperDelays => self.wiper.receive_delays(payload).then_some(0),
            MessagePrefix::StarterDisable => self.starter_disable.receive(payload).then_some(0),
            MessagePrefix::Version => {
                let version = decode_payload::<FirmwareVersion>(payload)?;
                if self.check_version(version.major, version.minor, version.build) {
                    info!(device = %self.name, %version, "Firmware version");
                } else {
                    warn!(
                        device = %self.name,
                        %version,
                        minimum = %self.kind.spec().min_version,
                        "Firmware older than supported minimum"
                    );
                }
                self.firmware = Some(version);
                Some(0)
            }
            MessagePrefix::Sleep => {
                let ack = decode_payload::<SleepAck>(payload)?;
                if ack.accepted {
                    info!(device = %self.name, "Device going to sleep");
                } else {
                    warn!(device = %self.name, "Device refused sleep");
                }
                Some(0)
            }
            MessagePrefix::BurnSettings => {
                let ack = decode_payload::<BurnAck>(payload)?;
                if ack.success {
                    info!(device = %self.name, "Settings burned to flash");
                } else {
                    warn!(device = %self.name, "Burning settings failed");
                }
                Some(0)
            }
            MessagePrefix::Null | MessagePrefix::Bootloader => None,
        }
    }

    fn read_log(&mut self, payload: &[u8]) {
        match DeviceLog::decode(payload) {
            Ok(log) => {
                debug!(device = %self.name, level = ?log.level, code = log.code, "Device log");
                self.last_log = Some(log);
            }
            Err(e) => debug!(device = %self.name, error = %e, "Ignoring device log frame"),
        }
    }

    // ========================================================================
    // Connection state
    // ========================================================================

    /// Going from connected to disconnected clears every live field
    pub fn set_connected(&mut self, connected: bool) {
        if self.connected && !connected {
            self.clear_live_state();
        }
        self.connected = connected;
    }

    /// Recompute `connected` from the last receive time
    ///
    /// Returns the new state when it changed.
    pub fn refresh_connection(&mut self, now: Instant) -> Option<bool> {
        let connected = self
            .last_rx
            .is_some_and(|last| now.saturating_duration_since(last) < CONNECTION_TIMEOUT);
        if connected == self.connected {
            return None;
        }

        if connected {
            info!(device = %self.name, base_id = self.base_id, "Device connected");
        } else {
            warn!(device = %self.name, base_id = self.base_id, "Device disconnected");
        }
        self.set_connected(connected);
        Some(connected)
    }

    pub fn clear_live_state(&mut self) {
        self.telemetry = DeviceTelemetry::default();
        self.inputs.iter_mut().for_each(Input::clear_live);
        self.outputs.iter_mut().for_each(Output::clear_live);
        self.virtual_inputs
            .iter_mut()
            .for_each(VirtualInput::clear_live);
        self.can_inputs.iter_mut().for_each(CanInput::clear_live);
        self.counters.iter_mut().for_each(Counter::clear_live);
        self.conditions.iter_mut().for_each(Condition::clear_live);
        self.flashers.iter_mut().for_each(Flasher::clear_live);
        self.wiper.clear_live();
        self.starter_disable.clear_live();
    }

    // ========================================================================
    // Message builders
    // ========================================================================

    /// Requests for every setting on the device
    pub fn get_upload_msgs(&self) -> Vec<DeviceMessage> {
        let tx = self.tx_id();
        let mut msgs = vec![
            request_msg::<FirmwareVersion>(tx, 0),
            request_msg::<CanConfig>(tx, 0),
        ];
        msgs.extend(self.inputs.iter().map(|f| request_msg::<InputConfig>(tx, f.index())));
        msgs.extend(self.outputs.iter().map(|f| request_msg::<OutputConfig>(tx, f.index())));
        msgs.extend(
            self.outputs
                .iter()
                .map(|f| request_msg::<OutputPwmConfig>(tx, f.index())),
        );
        msgs.extend(
            self.virtual_inputs
                .iter()
                .map(|f| request_msg::<VirtualInputConfig>(tx, f.index())),
        );
        msgs.extend(
            self.can_inputs
                .iter()
                .map(|f| request_msg::<CanInputConfig>(tx, f.index())),
        );
        msgs.extend(
            self.can_inputs
                .iter()
                .map(|f| request_msg::<CanInputId>(tx, f.index())),
        );
        msgs.extend(self.counters.iter().map(|f| request_msg::<CounterConfig>(tx, f.index())));
        msgs.extend(
            self.conditions
                .iter()
                .map(|f| request_msg::<ConditionConfig>(tx, f.index())),
        );
        msgs.extend(self.flashers.iter().map(|f| request_msg::<FlasherConfig>(tx, f.index())));
        msgs.push(request_msg::<WiperConfig>(tx, 0));
        msgs.push(request_msg::<WiperSpeedMap>(tx, 0));
        msgs.push(request_msg::<WiperDelays>(tx, 0));
        msgs.push(request_msg::<StarterDisableConfig>(tx, 0));
        msgs
    }

    /// Writes for every setting on the device, CAN settings last
    pub fn get_download_msgs(&self) -> ProtocolResult<Vec<DeviceMessage>> {
        let tx = self.tx_id();
        let mut msgs = Vec::new();
        for f in &self.inputs {
            msgs.push(write_msg::<InputConfig>(f.write(tx)?, f.index()));
        }
        for f in &self.outputs {
            msgs.push(write_msg::<OutputConfig>(f.write(tx)?, f.index()));
        }
        for f in &self.outputs {
            msgs.push(write_msg::<OutputPwmConfig>(f.write_pwm(tx)?, f.index()));
        }
        for f in &self.virtual_inputs {
            msgs.push(write_msg::<VirtualInputConfig>(f.write(tx)?, f.index()));
        }
        for f in &self.can_inputs {
            msgs.push(write_msg::<CanInputConfig>(f.write(tx)?, f.index()));
        }
        for f in &self.can_inputs {
            msgs.push(write_msg::<CanInputId>(f.write_id(tx)?, f.index()));
        }
        for f in &self.counters {
            msgs.push(write_msg::<CounterConfig>(f.write(tx)?, f.index()));
        }
        for f in &self.conditions {
            msgs.push(write_msg::<ConditionConfig>(f.write(tx)?, f.index()));
        }
        for f in &self.flashers {
            msgs.push(write_msg::<FlasherConfig>(f.write(tx)?, f.index()));
        }
        msgs.push(write_msg::<WiperConfig>(self.wiper.write(tx)?, 0));
        msgs.push(write_msg::<WiperSpeedMap>(self.wiper.write_speed(tx)?, 0));
        msgs.push(write_msg::<WiperDelays>(self.wiper.write_delays(tx)?, 0));
        msgs.push(write_msg::<StarterDisableConfig>(
            self.starter_disable.write(tx)?,
            0,
        ));
        msgs.push(write_msg::<CanConfig>(self.can_settings_frame(self.base_id)?, 0));
        Ok(msgs)
    }

    /// Move the device to `new_id`
    ///
    /// The frame goes to the current command ID. The device answers from its
    /// new window, so no pending entry is expected; call [`set_base_id`]
    /// once the device shows up there.
    ///
    /// [`set_base_id`]: PdmDevice::set_base_id
    pub fn get_update_msgs(&self, new_id: u32) -> ProtocolResult<Vec<DeviceMessage>> {
        validate_base_id(new_id)?;
        let frame = self.can_settings_frame(new_id)?;
        Ok(vec![DeviceMessage::unanswered(frame, MessagePrefix::Can)])
    }

    fn can_settings_frame(&self, base_id: u32) -> ProtocolResult<Frame> {
        let config = CanConfig {
            base_id: u16::try_from(base_id).map_err(|_| ProtocolError::InvalidBaseId(base_id))?,
            settings: self.can.clone(),
        };
        encode_frame(&config, self.tx_id(), 0)
    }

    pub fn get_burn_msg(&self) -> DeviceMessage {
        let frame = settings::command_frame(self.tx_id(), &settings::BURN_COMMAND);
        DeviceMessage::answered(frame, MessagePrefix::BurnSettings, 0)
    }

    pub fn get_sleep_msg(&self) -> DeviceMessage {
        let frame = settings::command_frame(self.tx_id(), &settings::SLEEP_COMMAND);
        DeviceMessage::answered(frame, MessagePrefix::Sleep, 0)
    }

    pub fn get_version_msg(&self) -> DeviceMessage {
        request_msg::<FirmwareVersion>(self.tx_id(), 0)
    }

    pub fn get_wake_msg(&self) -> DeviceMessage {
        let frame = settings::command_frame(self.tx_id(), &settings::WAKE_COMMAND);
        DeviceMessage::unanswered(frame, MessagePrefix::Null)
    }

    pub fn get_bootloader_msg(&self) -> DeviceMessage {
        let frame = settings::command_frame(self.tx_id(), &settings::BOOTLOADER_COMMAND);
        DeviceMessage::unanswered(frame, MessagePrefix::Bootloader)
    }

    /// True when `major.minor.build` meets the variant's minimum firmware
    pub fn check_version(&self, major: u8, minor: u8, build: u16) -> bool {
        FirmwareVersion::new(major, minor, build) >= self.kind.spec().min_version
    }
}
