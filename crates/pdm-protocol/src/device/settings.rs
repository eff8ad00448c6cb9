//! Device-level settings and command frames

use pdm_signal::Signal;
use serde::{Deserialize, Serialize};

use super::variant::FirmwareVersion;
use crate::error::ProtocolResult;
use crate::frame::Frame;
use crate::functions::{FieldReader, FieldWriter, FunctionCodec};
use crate::prefix::MessagePrefix;
use crate::types::CanBitRate;

const SLEEP_ENABLED: Signal = Signal::flag(8);
const CAN_FILTERS_ENABLED: Signal = Signal::flag(9);
const BITRATE: Signal = Signal::new(12, 4);
const BASE_ID: Signal = Signal::new(16, 16);

const VERSION_MAJOR: Signal = Signal::new(8, 8);
const VERSION_MINOR: Signal = Signal::new(16, 8);
const VERSION_BUILD: Signal = Signal::new(31, 16).big_endian();

const ACK: Signal = Signal::flag(8);

pub(crate) const SLEEP_COMMAND: [u8; 5] = [MessagePrefix::Sleep.raw(), b'Q', b'U', b'I', b'T'];
pub(crate) const BURN_COMMAND: [u8; 4] = [MessagePrefix::BurnSettings.raw(), 1, 3, 8];
pub(crate) const BOOTLOADER_COMMAND: [u8; 5] =
    [MessagePrefix::Bootloader.raw(), b'B', b'O', b'O', b'T'];
pub(crate) const WAKE_COMMAND: [u8; 1] = [b'!'];

/// Bus settings held by the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanSettings {
    pub sleep_enabled: bool,
    pub can_filters_enabled: bool,
    pub bitrate: CanBitRate,
}

/// Wire record of the Can message: the settings plus the device base ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanConfig {
    pub base_id: u16,
    pub settings: CanSettings,
}

impl FunctionCodec for CanConfig {
    const PREFIX: MessagePrefix = MessagePrefix::Can;
    const LEN: usize = 4;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            base_id: fields.word(&BASE_ID)?,
            settings: CanSettings {
                sleep_enabled: fields.flag(&SLEEP_ENABLED)?,
                can_filters_enabled: fields.flag(&CAN_FILTERS_ENABLED)?,
                bitrate: fields.enumeration(&BITRATE, "bitrate")?,
            },
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&SLEEP_ENABLED, self.settings.sleep_enabled)?;
        fields.flag(&CAN_FILTERS_ENABLED, self.settings.can_filters_enabled)?;
        fields.enumeration(&BITRATE, self.settings.bitrate)?;
        fields.uint(&BASE_ID, u64::from(self.base_id))
    }
}

impl FunctionCodec for FirmwareVersion {
    const PREFIX: MessagePrefix = MessagePrefix::Version;
    const LEN: usize = 5;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(FirmwareVersion::new(
            fields.byte(&VERSION_MAJOR)?,
            fields.byte(&VERSION_MINOR)?,
            fields.word(&VERSION_BUILD)?,
        ))
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.uint(&VERSION_MAJOR, u64::from(self.major))?;
        fields.uint(&VERSION_MINOR, u64::from(self.minor))?;
        fields.uint(&VERSION_BUILD, u64::from(self.build))
    }
}

/// Response to the sleep command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepAck {
    pub accepted: bool,
}

impl FunctionCodec for SleepAck {
    const PREFIX: MessagePrefix = MessagePrefix::Sleep;
    const LEN: usize = 2;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            accepted: fields.flag(&ACK)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ACK, self.accepted)
    }
}

/// Response to the burn-settings command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnAck {
    pub success: bool,
}

impl FunctionCodec for BurnAck {
    const PREFIX: MessagePrefix = MessagePrefix::BurnSettings;
    const LEN: usize = 2;
    const INDEX: Option<Signal> = None;

    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            success: fields.flag(&ACK)?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()> {
        fields.flag(&ACK, self.success)
    }
}

/// Frame carrying a fixed command payload
pub(crate) fn command_frame(tx_id: u32, payload: &[u8]) -> Frame {
    Frame::from_buffer(tx_id, payload.len(), crate::frame::padded(payload))
}
