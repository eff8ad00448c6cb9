//! Mock adapter for testing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pdm_protocol::{CanBitRate, Frame};
use tracing::debug;

use super::{CommsAdapter, FrameHandler};
use crate::config::MockConfig;
use crate::error::TransportError;

/// Produces the frames a simulated bus answers a write with
pub type Responder = Arc<dyn Fn(&Frame) -> Vec<Frame> + Send + Sync>;

/// Mock adapter for testing
///
/// Written frames are recorded. Frames reach the pipeline through
/// [`MockAdapter::inject`] or through a responder run on every write.
pub struct MockAdapter {
    latency: Duration,
    initialized: AtomicBool,
    running: AtomicBool,
    handler: RwLock<Option<FrameHandler>>,
    responder: RwLock<Option<Responder>>,
    written: Mutex<Vec<Frame>>,
    last_rx: Mutex<Option<Instant>>,
    settings: Mutex<Option<(String, CanBitRate)>>,
    fail_init: AtomicBool,
    fail_start: AtomicBool,
    fail_write: AtomicBool,
    init_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            handler: RwLock::new(None),
            responder: RwLock::new(None),
            written: Mutex::new(Vec::new()),
            last_rx: Mutex::new(None),
            settings: Mutex::new(None),
            fail_init: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_write: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Deliver a frame as if it had been received from the bus
    ///
    /// Returns false when the adapter is stopped or no handler is installed.
    pub fn inject(&self, frame: Frame) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(handler) = self.handler.read().clone() else {
            return false;
        };
        *self.last_rx.lock() = Some(Instant::now());
        handler(frame);
        true
    }

    /// Answer every subsequent write with the frames `responder` returns
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Frame) -> Vec<Frame> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Arc::new(responder));
    }

    pub fn clear_responder(&self) {
        *self.responder.write() = None;
    }

    /// Frames written so far
    pub fn written(&self) -> Vec<Frame> {
        self.written.lock().clone()
    }

    pub fn take_written(&self) -> Vec<Frame> {
        std::mem::take(&mut *self.written.lock())
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Port and bitrate from the last successful `init`
    pub fn settings(&self) -> Option<(String, CanBitRate)> {
        self.settings.lock().clone()
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new(&MockConfig::default())
    }
}

#[async_trait]
impl CommsAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn init(&self, port: &str, bitrate: CanBitRate) -> Result<(), TransportError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "mock init failure on {}",
                port
            )));
        }
        *self.settings.lock() = Some((port.to_string(), bitrate));
        self.initialized.store(true, Ordering::SeqCst);
        debug!(port, ?bitrate, "Mock adapter initialized");
        Ok(())
    }

    async fn start(&self) -> Result<(), TransportError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "mock start failure".to_string(),
            ));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock write failure".to_string()));
        }

        // Simulate latency
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.written.lock().push(*frame);
        debug!(%frame, "Mock adapter: wrote frame");

        let responder = self.responder.read().clone();
        if let Some(responder) = responder {
            for reply in responder(frame) {
                self.inject(reply);
            }
        }
        Ok(())
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

    fn collecting_handler() -> (FrameHandler, Arc<Mutex<Vec<Frame>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let handler: FrameHandler = Arc::new(move |frame| sink.lock().push(frame));
        (handler, received)
    }

    #[tokio::test]
    async fn test_write_requires_start() {
        let adapter = MockAdapter::default();
        let frame = Frame::new(0x100, &[1, 2]).unwrap();

        assert_eq!(
            adapter.write(&frame).await,
            Err(TransportError::NotConnected)
        );

        adapter.init("mock", CanBitRate::Kbps500).await.unwrap();
        adapter.start().await.unwrap();
        adapter.write(&frame).await.unwrap();
        assert_eq!(adapter.written(), vec![frame]);
        assert_eq!(
            adapter.settings(),
            Some(("mock".to_string(), CanBitRate::Kbps500))
        );
    }

    #[tokio::test]
    async fn test_responder_replies_through_handler() {
        let adapter = MockAdapter::default();
        let (handler, received) = collecting_handler();
        adapter.set_frame_handler(Some(handler));
        adapter.set_responder(|frame| {
            vec![Frame::new(frame.id() + 1, frame.payload()).unwrap()]
        });
        adapter.init("mock", CanBitRate::Kbps250).await.unwrap();
        adapter.start().await.unwrap();

        adapter
            .write(&Frame::new(0x200, &[0xAA]).unwrap())
            .await
            .unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id(), 0x201);
        assert!(adapter.rx_time_delta().is_some());
    }

    #[tokio::test]
    async fn test_inject_needs_running_adapter_and_handler() {
        let adapter = MockAdapter::default();
        let frame = Frame::new(0x10, &[]).unwrap();
        assert!(!adapter.inject(frame));

        adapter.init("mock", CanBitRate::Kbps500).await.unwrap();
        adapter.start().await.unwrap();
        assert!(!adapter.inject(frame));

        let (handler, received) = collecting_handler();
        adapter.set_frame_handler(Some(handler));
        assert!(adapter.inject(frame));
        assert_eq!(received.lock().len(), 1);

        adapter.stop().await.unwrap();
        assert!(!adapter.inject(frame));
        assert_eq!(adapter.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let adapter = MockAdapter::default();
        adapter.set_fail_init(true);
        assert!(matches!(
            adapter.init("mock", CanBitRate::Kbps500).await,
            Err(TransportError::ConnectionFailed(_))
        ));
        assert_eq!(adapter.init_calls(), 1);

        adapter.set_fail_init(false);
        adapter.set_fail_start(true);
        adapter.init("mock", CanBitRate::Kbps500).await.unwrap();
        assert!(adapter.start().await.is_err());
        assert!(!adapter.is_connected());

        adapter.set_fail_start(false);
        adapter.start().await.unwrap();
        adapter.set_fail_write(true);
        assert!(matches!(
            adapter.write(&Frame::new(1, &[0]).unwrap()).await,
            Err(TransportError::SendFailed(_))
        ));
        assert!(adapter.written().is_empty());
    }
}
