//! Device protocol tests
//!
//! Drive a `PdmDevice` the way the comms pipeline does: build messages, track
//! them in the pending table, then feed back the frames a PDM would answer with.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use pdm_protocol::functions::{CanInputConfig, InputConfig};
use pdm_protocol::{
    Frame, InputMode, MessagePrefix, OutState, PdmDevice, PdmKind, PendingKey, PendingRequests,
    RequestOutcome, ResetMode,
};
use pretty_assertions::assert_eq;

const BASE_ID: u32 = 200;

/// Settings response a device sends for a write frame
fn echo(frame: &Frame) -> Frame {
    let mut payload = frame.payload().to_vec();
    payload[0] += 128;
    Frame::new(BASE_ID + 30, &payload).unwrap()
}

#[test]
fn test_upload_messages() {
    let device = PdmDevice::new("front", PdmKind::Standard, BASE_ID).unwrap();
    let msgs = device.get_upload_msgs();

    assert!(msgs.iter().all(|m| m.frame.id() == 199));
    assert!(msgs.iter().all(|m| m.expects_response));
    assert_eq!(msgs[0].prefix, MessagePrefix::Version);
    assert_eq!(msgs[0].frame.payload(), &[120]);
    assert_eq!(msgs[1].prefix, MessagePrefix::Can);
    assert_eq!(msgs[1].frame.payload(), &[1]);

    let inputs: Vec<&[u8]> = msgs
        .iter()
        .filter(|m| m.prefix == MessagePrefix::Inputs)
        .map(|m| m.frame.payload())
        .collect();
    assert_eq!(inputs, vec![&[5u8, 0][..], &[5, 1][..]]);

    let count = |prefix| msgs.iter().filter(|m| m.prefix == prefix).count();
    assert_eq!(count(MessagePrefix::Outputs), 8);
    assert_eq!(count(MessagePrefix::OutputsPwm), 8);
    assert_eq!(count(MessagePrefix::VirtualInputs), 16);
    assert_eq!(count(MessagePrefix::CanInputs), 32);
    assert_eq!(count(MessagePrefix::CanInputsId), 32);
    assert_eq!(count(MessagePrefix::Counters), 4);
    assert_eq!(count(MessagePrefix::Conditions), 32);
    assert_eq!(count(MessagePrefix::Flashers), 4);
    assert_eq!(count(MessagePrefix::Wiper), 1);
    assert_eq!(count(MessagePrefix::WiperSpeed), 1);
    assert_eq!(count(MessagePrefix::WiperDelays), 1);
    assert_eq!(count(MessagePrefix::StarterDisable), 1);

    // every message has its own pending slot
    let keys: HashSet<PendingKey> = msgs
        .iter()
        .filter_map(|m| m.pending_key(BASE_ID))
        .collect();
    assert_eq!(keys.len(), msgs.len());
}

#[test]
fn test_download_then_upload_round_trip() {
    let mut source = PdmDevice::new("source", PdmKind::Max, BASE_ID).unwrap();
    source.inputs[3].config = InputConfig {
        enabled: true,
        invert: false,
        mode: InputMode::Latching,
        debounce_ms: 30,
        ..Default::default()
    };
    source.outputs[11].config.enabled = true;
    source.outputs[11].config.current_limit = 25;
    source.outputs[11].config.reset_mode = ResetMode::Count;
    source.outputs[0].pwm.frequency = 200;
    source.can_inputs[7].config = CanInputConfig {
        enabled: true,
        on_value: 42,
        dlc: 1,
        ..Default::default()
    };
    source.can_inputs[7].ident.set_id(0x1ABC_DEF0);
    source.conditions[31].config.arg = 1000;
    source.wiper.delays.delays[5] = 2.5;
    source.starter_disable.config.output_mask = 0x0F0F;

    // A PDM stores each write and echoes it back as a settings response
    let mut target = PdmDevice::new("target", PdmKind::Max, BASE_ID).unwrap();
    let pending = PendingRequests::default();
    let now = Instant::now();
    let msgs = source.get_download_msgs().unwrap();
    let mut waiters = Vec::new();
    for msg in &msgs {
        let key = msg.pending_key(BASE_ID).unwrap();
        waiters.push(pending.insert(key, msg.frame, now));
    }
    for msg in &msgs {
        assert!(target.read_at(&echo(&msg.frame), &pending, now));
    }

    assert!(pending.is_empty());
    for mut waiter in waiters {
        assert_eq!(waiter.try_recv().unwrap(), RequestOutcome::Completed);
    }
    assert_eq!(target.inputs[3].config, source.inputs[3].config);
    assert_eq!(target.outputs[11].config, source.outputs[11].config);
    assert_eq!(target.outputs[0].pwm.frequency, 200);
    assert_eq!(target.can_inputs[7].config, source.can_inputs[7].config);
    assert_eq!(target.can_inputs[7].ident.id(), 0x1ABC_DEF0);
    assert!(target.can_inputs[7].ident.ide());
    assert_eq!(target.conditions[31].config.arg, 1000);
    assert_eq!(target.wiper.delays, source.wiper.delays);
    assert_eq!(target.starter_disable.config.output_mask, 0x0F0F);
}

#[test]
fn test_responses_for_other_devices_do_not_resolve() {
    let mut front = PdmDevice::new("front", PdmKind::Standard, BASE_ID).unwrap();
    let pending = PendingRequests::default();
    let other_key = PendingKey::new(300, MessagePrefix::Inputs, 0);
    let _rx = pending.insert(other_key, Frame::new(299, &[5, 0]).unwrap(), Instant::now());

    assert!(front.read(&Frame::new(230, &[133, 0x01, 0, 0]).unwrap(), &pending));
    assert!(pending.contains(&other_key));

    // the other device's response frame is outside this window
    assert!(!front.read(&Frame::new(330, &[133, 0x01, 0, 0]).unwrap(), &pending));
    assert!(pending.contains(&other_key));
}

#[test]
fn test_liveness_cycle() {
    let mut device = PdmDevice::new("front", PdmKind::Standard, BASE_ID).unwrap();
    let pending = PendingRequests::default();
    let start = Instant::now();

    assert_eq!(device.refresh_connection(start), None);
    device.read_at(
        &Frame::new(BASE_ID + 4, &[0x11, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
        &pending,
        start,
    );
    assert!(device.is_connected());
    assert_eq!(device.outputs[1].state, OutState::On);

    let later = start + Duration::from_secs(1);
    assert_eq!(device.refresh_connection(later), Some(false));
    assert_eq!(device.outputs[1].state, OutState::Off);

    device.read_at(
        &Frame::new(BASE_ID + 31, &[1, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
        &pending,
        later,
    );
    assert!(device.is_connected());
}
