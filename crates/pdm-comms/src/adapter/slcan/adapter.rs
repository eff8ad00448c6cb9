//! slcan adapter over a serial port

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pdm_protocol::{CanBitRate, Frame};
use serialport::SerialPort;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{self, SlcanDecoder};
use crate::adapter::{CommsAdapter, FrameHandler};
use crate::config::SlcanConfig;
use crate::error::TransportError;

const OPEN_CHANNEL: &[u8] = b"O\r";
const CLOSE_CHANNEL: &[u8] = b"C\r";

/// Serial read timeout; bounds how long `stop` waits for the reader
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Time the interface needs to digest a setup command
const COMMAND_SETTLE: Duration = Duration::from_millis(50);

const IDLE_SLEEP: Duration = Duration::from_millis(10);

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// State shared with the blocking reader
struct ReaderContext {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handler: Arc<RwLock<Option<FrameHandler>>>,
    last_rx: Arc<Mutex<Option<Instant>>>,
}

/// slcan adapter
pub struct SlcanAdapter {
    config: SlcanConfig,
    port: SharedPort,
    reader: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handler: Arc<RwLock<Option<FrameHandler>>>,
    last_rx: Arc<Mutex<Option<Instant>>>,
}

impl SlcanAdapter {
    pub fn new(config: &SlcanConfig) -> Result<Self, TransportError> {
        if config.port.is_empty() {
            return Err(TransportError::InvalidConfig(
                "slcan port must not be empty".to_string(),
            ));
        }
        if config.baud_rate == 0 {
            return Err(TransportError::InvalidConfig(
                "slcan baud rate must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            config: config.clone(),
            port: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            handler: Arc::new(RwLock::new(None)),
            last_rx: Arc::new(Mutex::new(None)),
        })
    }

    /// Configured serial device
    pub fn configured_port(&self) -> &str {
        &self.config.port
    }

    fn reader_context(&self) -> ReaderContext {
        ReaderContext {
            stop: self.stop.clone(),
            running: self.running.clone(),
            handler: self.handler.clone(),
            last_rx: self.last_rx.clone(),
        }
    }
}

fn send_command(port: &mut Box<dyn SerialPort>, command: &[u8]) -> Result<(), TransportError> {
    port.write_all(command)
        .and_then(|_| port.flush())
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}

/// Open the port, close any open channel and set the bitrate
fn open_port(
    path: &str,
    baud_rate: u32,
    bitrate: CanBitRate,
) -> Result<Box<dyn SerialPort>, TransportError> {
    let mut port = serialport::new(path, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", path, e)))?;

    let _ = port.clear(serialport::ClearBuffer::All);

    send_command(&mut port, CLOSE_CHANNEL)?;
    std::thread::sleep(COMMAND_SETTLE);

    send_command(&mut port, codec::bitrate_command(bitrate))?;
    std::thread::sleep(COMMAND_SETTLE);

    Ok(port)
}

fn read_loop(mut port: Box<dyn SerialPort>, ctx: ReaderContext) {
    let mut decoder = SlcanDecoder::new();
    let mut buf = [0u8; 256];

    while !ctx.stop.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => std::thread::sleep(IDLE_SLEEP),
            Ok(n) => {
                let frames = decoder.feed(&buf[..n]);
                if frames.is_empty() {
                    continue;
                }
                *ctx.last_rx.lock() = Some(Instant::now());
                let handler = ctx.handler.read().clone();
                if let Some(handler) = handler {
                    for frame in frames {
                        handler(frame);
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                error!(error = %e, "slcan read failed");
                ctx.running.store(false, Ordering::SeqCst);
                break;
            }
        }
    }

    debug!("slcan reader stopped");
}

#[async_trait]
impl CommsAdapter for SlcanAdapter {
    fn name(&self) -> &str {
        "slcan"
    }

    async fn init(&self, port: &str, bitrate: CanBitRate) -> Result<(), TransportError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidConfig(
                "slcan adapter is already started".to_string(),
            ));
        }

        let path = port.to_string();
        let baud_rate = self.config.baud_rate;
        let opened = tokio::task::spawn_blocking(move || open_port(&path, baud_rate, bitrate))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))??;

        *self.port.lock() = Some(opened);
        info!(port, baud_rate, ?bitrate, "slcan interface initialized");
        Ok(())
    }

    async fn start(&self) -> Result<(), TransportError> {
        let mut reader = self.reader.lock();
        if reader.is_some() {
            return Ok(());
        }

        let reader_port = {
            let mut guard = self.port.lock();
            let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
            send_command(port, OPEN_CHANNEL)?;
            port.try_clone()
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
        };

        self.stop.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let ctx = self.reader_context();
        *reader = Some(tokio::task::spawn_blocking(move || read_loop(reader_port, ctx)));

        info!("slcan channel open");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stop.store(true, Ordering::SeqCst);
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!(error = %e, "slcan reader ended abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);

        let port = self.port.lock().take();
        if let Some(mut port) = port {
            if let Err(e) = send_command(&mut port, CLOSE_CHANNEL) {
                debug!(error = %e, "Failed to close slcan channel");
            }
            info!("slcan interface closed");
        }
        Ok(())
    }

    async fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let bytes = codec::encode(frame)?;

        // write_all and flush block for up to the port timeout
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock();
            let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
            send_command(port, &bytes)
        })
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?
    }

    fn set_frame_handler(&self, handler: Option<FrameHandler>) {
        *self.handler.write() = handler;
    }

    fn rx_time_delta(&self) -> Option<Duration> {
        self.last_rx.lock().map(|at| at.elapsed())
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: &str) -> SlcanConfig {
        SlcanConfig {
            port: port.to_string(),
            baud_rate: 115_200,
            bitrate: CanBitRate::Kbps500,
        }
    }

    #[test]
    fn test_new_validates_config() {
        assert!(SlcanAdapter::new(&config("/dev/ttyACM0")).is_ok());
        assert!(matches!(
            SlcanAdapter::new(&SlcanConfig {
                baud_rate: 0,
                ..config("/dev/ttyACM0")
            }),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unopened_adapter() {
        let adapter = SlcanAdapter::new(&config("/dev/ttyACM0")).unwrap();
        let frame = Frame::new(0x100, &[1]).unwrap();

        assert!(!adapter.is_connected());
        assert_eq!(adapter.rx_time_delta(), None);
        assert_eq!(adapter.start().await, Err(TransportError::NotConnected));
        assert_eq!(adapter.write(&frame).await, Err(TransportError::NotConnected));
        assert_eq!(adapter.stop().await, Ok(()));
    }

    #[tokio::test]
    async fn test_write_checks_port_off_the_runtime() {
        let adapter = SlcanAdapter::new(&config("/dev/ttyACM0")).unwrap();
        adapter.running.store(true, Ordering::SeqCst);

        let frame = Frame::new(0x100, &[1]).unwrap();
        assert_eq!(adapter.write(&frame).await, Err(TransportError::NotConnected));

        let extended = Frame::new(0x800, &[1]).unwrap();
        assert!(matches!(
            adapter.write(&extended).await,
            Err(TransportError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_init_missing_port_fails() {
        let adapter = SlcanAdapter::new(&config("/dev/pdm-missing-port")).unwrap();
        let result = adapter
            .init("/dev/pdm-missing-port", CanBitRate::Kbps500)
            .await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!adapter.is_connected());
    }
}
