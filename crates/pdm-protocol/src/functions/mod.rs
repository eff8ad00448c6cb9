//! Device function codecs
//!
//! Every configurable function kind owns a configuration record implementing
//! [`FunctionCodec`]. The record knows its prefix, its fixed response length,
//! where the function index sits in the payload, and how to move its fields in
//! and out of the 8-byte buffer. The helpers here turn that into the three
//! operations every kind exposes:
//!
//! - `request(tx_id, index)` builds the poll frame (`[prefix, index]`, or
//!   `[prefix]` for singletons)
//! - `receive(payload)` validates the length and replaces the configuration
//!   only if the whole payload decodes
//! - `write(tx_id)` serialises the configuration with the kind's prefix

mod can_input;
mod condition;
mod counter;
mod flasher;
mod input;
mod output;
mod starter_disable;
mod virtual_input;
mod wiper;

pub use can_input::{CanInput, CanInputConfig, CanInputId};
pub use condition::{Condition, ConditionConfig};
pub use counter::{Counter, CounterConfig};
pub use flasher::{Flasher, FlasherConfig};
pub use input::{Input, InputConfig};
pub use output::{Output, OutputConfig, OutputPwmConfig};
pub use starter_disable::{StarterDisable, StarterDisableConfig};
pub use virtual_input::{VirtualInput, VirtualInputConfig};
pub use wiper::{Wiper, WiperConfig, WiperDelays, WiperSpeedMap};

use pdm_signal::{extract, extract_uint, insert, insert_uint, Signal};
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{padded, Frame};
use crate::prefix::MessagePrefix;

/// Wire format of one settings message kind
pub trait FunctionCodec: Sized {
    /// Prefix carried in byte 0
    const PREFIX: MessagePrefix;
    /// Fixed payload length of writes and responses
    const LEN: usize;
    /// Position of the function index, `None` for singletons
    const INDEX: Option<Signal>;

    /// Decode the configuration fields of a settings payload
    fn decode(fields: &FieldReader<'_>) -> ProtocolResult<Self>;

    /// Encode the configuration fields into a settings payload
    fn encode(&self, fields: &mut FieldWriter<'_>) -> ProtocolResult<()>;
}

/// Typed read access to a payload buffer
pub struct FieldReader<'a> {
    data: &'a [u8; 8],
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8; 8]) -> Self {
        Self { data }
    }

    pub fn flag(&self, signal: &Signal) -> ProtocolResult<bool> {
        Ok(self.uint(signal)? != 0)
    }

    pub fn uint(&self, signal: &Signal) -> ProtocolResult<u64> {
        Ok(extract_uint(
            self.data,
            signal.start_bit,
            signal.length,
            signal.byte_order,
        )?)
    }

    /// Read a field declared at most 8 bits wide
    pub fn byte(&self, signal: &Signal) -> ProtocolResult<u8> {
        let value = self.uint(signal)?;
        u8::try_from(value).map_err(|_| ProtocolError::InvalidValue {
            field: "byte",
            value,
        })
    }

    /// Read a field declared at most 16 bits wide
    pub fn word(&self, signal: &Signal) -> ProtocolResult<u16> {
        let value = self.uint(signal)?;
        u16::try_from(value).map_err(|_| ProtocolError::InvalidValue {
            field: "word",
            value,
        })
    }

    pub fn scaled(&self, signal: &Signal) -> ProtocolResult<f64> {
        Ok(extract(self.data, signal)?)
    }

    pub fn enumeration<T: TryFrom<u8>>(
        &self,
        signal: &Signal,
        field: &'static str,
    ) -> ProtocolResult<T> {
        let value = self.uint(signal)?;
        u8::try_from(value)
            .ok()
            .and_then(|raw| T::try_from(raw).ok())
            .ok_or(ProtocolError::InvalidValue { field, value })
    }
}

/// Typed write access to a payload buffer
pub struct FieldWriter<'a> {
    data: &'a mut [u8; 8],
}

impl<'a> FieldWriter<'a> {
    pub fn new(data: &'a mut [u8; 8]) -> Self {
        Self { data }
    }

    pub fn flag(&mut self, signal: &Signal, value: bool) -> ProtocolResult<()> {
        self.uint(signal, u64::from(value))
    }

    pub fn uint(&mut self, signal: &Signal, value: u64) -> ProtocolResult<()> {
        Ok(insert_uint(
            self.data,
            value,
            signal.start_bit,
            signal.length,
            signal.byte_order,
        )?)
    }

    pub fn scaled(&mut self, signal: &Signal, value: f64) -> ProtocolResult<()> {
        Ok(insert(self.data, value, signal)?)
    }

    pub fn enumeration<T: Into<u8>>(&mut self, signal: &Signal, value: T) -> ProtocolResult<()> {
        self.uint(signal, u64::from(value.into()))
    }
}

/// Build the poll frame for one function instance
pub fn request_frame<C: FunctionCodec>(tx_id: u32, index: u8) -> Frame {
    let mut data = [0u8; 8];
    data[0] = C::PREFIX.raw();
    let len = if C::INDEX.is_some() {
        data[1] = index;
        2
    } else {
        1
    };
    Frame::from_buffer(tx_id, len, data)
}

/// Decode a settings payload, rejecting any length but the kind's own
pub fn decode_payload<C: FunctionCodec>(payload: &[u8]) -> Option<C> {
    if payload.len() != C::LEN {
        debug!(
            prefix = ?C::PREFIX,
            expected = C::LEN,
            actual = payload.len(),
            "Ignoring settings payload with wrong length"
        );
        return None;
    }

    let data = padded(payload);
    match C::decode(&FieldReader::new(&data)) {
        Ok(config) => Some(config),
        Err(e) => {
            debug!(prefix = ?C::PREFIX, error = %e, "Ignoring undecodable settings payload");
            None
        }
    }
}

/// Replace `target` with the decoded payload; false leaves it untouched
pub fn receive_into<C: FunctionCodec>(target: &mut C, payload: &[u8]) -> bool {
    match decode_payload::<C>(payload) {
        Some(config) => {
            *target = config;
            true
        }
        None => false,
    }
}

/// Serialise a configuration record into a write frame
pub fn encode_frame<C: FunctionCodec>(config: &C, tx_id: u32, index: u8) -> ProtocolResult<Frame> {
    let mut data = [0u8; 8];
    data[0] = C::PREFIX.raw();
    {
        let mut fields = FieldWriter::new(&mut data);
        if let Some(signal) = C::INDEX {
            fields.uint(&signal, u64::from(index))?;
        }
        config.encode(&mut fields)?;
    }
    Ok(Frame::from_buffer(tx_id, C::LEN, data))
}

/// Function index carried by a settings response (0 for singletons)
pub fn response_index<C: FunctionCodec>(payload: &[u8]) -> Option<u8> {
    match C::INDEX {
        Some(signal) => FieldReader::new(&padded(payload)).byte(&signal).ok(),
        None => Some(0),
    }
}
