//! RX/TX pipeline
//!
//! Received frames go from the adapter callback into a bounded RX queue and
//! are routed to every device whose window contains the identifier. Outbound
//! frames wait in a bounded TX queue until the TX loop writes them to the
//! active adapter. The TX loop also runs housekeeping: request expiry and
//! device liveness.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use pdm_protocol::{
    CanBitRate, DeviceMessage, DeviceRegistry, Expiry, Frame, PendingKey, PendingRequests,
    RequestOutcome, SharedDevice,
};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::adapter::{create_adapter, CommsAdapter, FrameHandler, Subscription};
use crate::config::{AdapterConfig, CommsConfig, PipelineConfig};
use crate::error::{CommsError, CommsResult, TransportError};
use crate::queue::FrameQueue;

const EVENT_CAPACITY: usize = 256;

/// Something observers of the pipeline may care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    DeviceConnected { device: Uuid },
    DeviceDisconnected { device: Uuid },
    /// A settings request ran out of retries
    RequestFailed { key: PendingKey, retries: u32 },
    AdapterConnected { name: String },
    AdapterDisconnected { name: String },
}

struct Outbound {
    frame: Frame,
    key: Option<PendingKey>,
}

struct Inner {
    config: PipelineConfig,
    registry: Arc<dyn DeviceRegistry>,
    pending: PendingRequests,
    rx_queue: Arc<FrameQueue<Frame>>,
    tx_queue: FrameQueue<Outbound>,
    active: RwLock<Option<Arc<dyn CommsAdapter>>>,
    events: broadcast::Sender<PipelineEvent>,
    shutdown: watch::Sender<bool>,
}

impl Inner {
    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn enqueue(&self, frame: Frame, key: Option<PendingKey>) {
        if !self.tx_queue.push(Outbound { frame, key }) {
            debug!(%frame, "TX queue full, dropped oldest frame");
        }
    }

    fn route(&self, frame: Frame) {
        let now = Instant::now();
        let mut routed = false;
        for device in self.registry.get_all_devices() {
            let mut device = device.lock();
            let was_connected = device.is_connected();
            if !device.read_at(&frame, &self.pending, now) {
                continue;
            }
            routed = true;
            if !was_connected && device.is_connected() {
                self.publish(PipelineEvent::DeviceConnected {
                    device: device.id(),
                });
            }
        }
        if !routed {
            trace!(%frame, "Frame outside every device window");
        }
    }

    fn after_write(
        &self,
        adapter: &dyn CommsAdapter,
        outbound: Outbound,
        result: Result<(), TransportError>,
    ) {
        match result {
            Ok(()) => {
                trace!(frame = %outbound.frame, "Frame written");
                if let Some(key) = outbound.key {
                    self.pending.mark_sent(&key, Instant::now());
                }
            }
            Err(e) => {
                // Tracked requests are re-sent on expiry
                warn!(
                    adapter = adapter.name(),
                    frame = %outbound.frame,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    fn housekeeping(&self, now: Instant) {
        for expiry in self.pending.poll_expired(now) {
            match expiry {
                Expiry::Retry {
                    key,
                    frame,
                    attempt,
                } => {
                    debug!(?key, attempt, "Re-sending request");
                    self.enqueue(frame, Some(key));
                }
                Expiry::Failed { key, retries } => {
                    self.publish(PipelineEvent::RequestFailed { key, retries });
                }
            }
        }

        for device in self.registry.get_all_devices() {
            let mut device = device.lock();
            match device.refresh_connection(now) {
                Some(true) => self.publish(PipelineEvent::DeviceConnected {
                    device: device.id(),
                }),
                Some(false) => self.publish(PipelineEvent::DeviceDisconnected {
                    device: device.id(),
                }),
                None => {}
            }
        }
    }
}

async fn rx_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    debug!("RX loop started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopping| *stopping) => break,
            frame = inner.rx_queue.pop() => inner.route(frame),
        }
    }
    debug!("RX loop stopped");
}

async fn tx_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    debug!("TX loop started");
    let poll_interval = inner.config.tx_poll_interval();
    let housekeeping_interval = inner.config.housekeeping_interval();
    let mut last_housekeeping = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Instant::now();
        if now.saturating_duration_since(last_housekeeping) >= housekeeping_interval {
            inner.housekeeping(now);
            last_housekeeping = now;
        }

        let adapter = inner.active.read().clone();
        let next = match adapter {
            Some(adapter) => inner.tx_queue.try_pop().map(|outbound| (adapter, outbound)),
            None => None,
        };

        match next {
            Some((adapter, outbound)) => {
                let frame = outbound.frame;
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stopping| *stopping) => break,
                    result = adapter.write(&frame) => {
                        inner.after_write(adapter.as_ref(), outbound, result);
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stopping| *stopping) => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
    debug!("TX loop stopped");
}

/// Frame pipeline between one adapter and the registered devices
pub struct CommsPipeline {
    inner: Arc<Inner>,
    adapter_config: AdapterConfig,
    lifecycle: tokio::sync::Mutex<Option<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CommsPipeline {
    pub fn new(config: &CommsConfig, registry: Arc<dyn DeviceRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let inner = Inner {
            config: config.pipeline.clone(),
            registry,
            pending: PendingRequests::new(config.requests.policy()),
            rx_queue: Arc::new(FrameQueue::new(config.pipeline.rx_capacity)),
            tx_queue: FrameQueue::new(config.pipeline.tx_capacity),
            active: RwLock::new(None),
            events,
            shutdown,
        };

        Self {
            inner: Arc::new(inner),
            adapter_config: config.adapter.clone(),
            lifecycle: tokio::sync::Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // Loops
    // ========================================================================

    /// Spawn the RX and TX loops; must be called inside a Tokio runtime
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        self.inner.shutdown.send_replace(false);
        tasks.push(tokio::spawn(rx_loop(
            self.inner.clone(),
            self.inner.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(tx_loop(
            self.inner.clone(),
            self.inner.shutdown.subscribe(),
        )));
        info!("Comms pipeline started");
    }

    /// Stop both loops and disconnect the adapter
    ///
    /// Queued frames are discarded and outstanding requests are cancelled.
    pub async fn shutdown(&self) -> CommsResult<()> {
        self.inner.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Pipeline task ended abnormally");
            }
        }

        let cancelled = self.inner.pending.len();
        self.inner.pending.clear();
        self.inner.tx_queue.clear();
        info!(cancelled, "Comms pipeline stopped");
        self.disconnect().await
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    // ========================================================================
    // Adapter lifecycle
    // ========================================================================

    /// Make `adapter` the active adapter
    ///
    /// Any active adapter is disconnected first. If `init` or `start` fails
    /// the frame handler is unregistered before the error is returned.
    pub async fn connect(
        &self,
        adapter: Arc<dyn CommsAdapter>,
        port: &str,
        bitrate: CanBitRate,
    ) -> CommsResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Err(e) = self.teardown(&mut lifecycle).await {
            warn!(error = %e, "Previous adapter did not stop cleanly");
        }

        let rx_queue = self.inner.rx_queue.clone();
        let handler: FrameHandler = Arc::new(move |frame| {
            if !rx_queue.push(frame) {
                trace!("RX queue full, dropped oldest frame");
            }
        });
        let subscription = Subscription::register(adapter.clone(), handler);

        if let Err(e) = adapter.init(port, bitrate).await {
            warn!(adapter = adapter.name(), port, error = %e, "Adapter init failed");
            drop(subscription);
            return Err(e.into());
        }
        if let Err(e) = adapter.start().await {
            warn!(adapter = adapter.name(), port, error = %e, "Adapter start failed");
            if let Err(stop_err) = adapter.stop().await {
                debug!(error = %stop_err, "Adapter stop after failed start");
            }
            drop(subscription);
            return Err(e.into());
        }

        *self.inner.active.write() = Some(adapter.clone());
        *lifecycle = Some(subscription);
        info!(adapter = adapter.name(), port, ?bitrate, "Adapter connected");
        self.inner.publish(PipelineEvent::AdapterConnected {
            name: adapter.name().to_string(),
        });
        Ok(())
    }

    /// Connect the adapter named in the configuration
    pub async fn connect_from_config(&self) -> CommsResult<()> {
        let adapter = create_adapter(&self.adapter_config)?;
        self.connect(
            adapter,
            self.adapter_config.port(),
            self.adapter_config.bitrate(),
        )
        .await
    }

    /// Unregister the handler, stop the adapter and drop it
    pub async fn disconnect(&self) -> CommsResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown(&mut lifecycle).await?;
        Ok(())
    }

    async fn teardown(&self, lifecycle: &mut Option<Subscription>) -> Result<(), TransportError> {
        let Some(subscription) = lifecycle.take() else {
            return Ok(());
        };
        *self.inner.active.write() = None;
        let adapter = subscription.adapter().clone();
        drop(subscription);

        let result = adapter.stop().await;
        info!(adapter = adapter.name(), "Adapter disconnected");
        self.inner.publish(PipelineEvent::AdapterDisconnected {
            name: adapter.name().to_string(),
        });
        result
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .active
            .read()
            .as_ref()
            .is_some_and(|adapter| adapter.is_connected())
    }

    /// Name of the active adapter
    pub fn adapter_name(&self) -> Option<String> {
        self.inner
            .active
            .read()
            .as_ref()
            .map(|adapter| adapter.name().to_string())
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queue a frame with no response tracking
    pub fn send(&self, frame: Frame) -> CommsResult<()> {
        if !self.is_running() {
            return Err(CommsError::NotRunning);
        }
        self.inner.enqueue(frame, None);
        Ok(())
    }

    /// Queue a device message
    ///
    /// Messages that expect a settings response are tracked and their
    /// outcome arrives on the returned receiver.
    pub fn submit(
        &self,
        message: &DeviceMessage,
        base_id: u32,
    ) -> CommsResult<Option<oneshot::Receiver<RequestOutcome>>> {
        if !self.is_running() {
            return Err(CommsError::NotRunning);
        }
        let Some(key) = message.pending_key(base_id) else {
            self.inner.enqueue(message.frame, None);
            return Ok(None);
        };
        let waiter = self.inner.pending.insert(key, message.frame, Instant::now());
        if !self.is_running() {
            // raced with shutdown, which may already have cleared the table
            self.inner.pending.cancel(&key);
            return Err(CommsError::NotRunning);
        }
        self.inner.enqueue(message.frame, Some(key));
        Ok(Some(waiter))
    }

    /// Send a device message and wait for its settings response
    pub async fn request(&self, message: &DeviceMessage, base_id: u32) -> CommsResult<()> {
        match self.submit(message, base_id)? {
            Some(waiter) => wait_for_outcome(message.pending_key(base_id), waiter).await,
            None => Ok(()),
        }
    }

    /// Request every setting from the device
    pub async fn upload(&self, device: &SharedDevice) -> CommsResult<()> {
        let (name, base_id, messages) = {
            let device = device.lock();
            (device.name.clone(), device.base_id(), device.get_upload_msgs())
        };
        info!(device = %name, count = messages.len(), "Uploading settings");
        self.request_all(&messages, base_id).await
    }

    /// Write every setting to the device
    pub async fn download(&self, device: &SharedDevice) -> CommsResult<()> {
        let (name, base_id, messages) = {
            let device = device.lock();
            (device.name.clone(), device.base_id(), device.get_download_msgs()?)
        };
        info!(device = %name, count = messages.len(), "Downloading settings");
        self.request_all(&messages, base_id).await
    }

    /// Store the device's settings in non-volatile memory
    pub async fn burn(&self, device: &SharedDevice) -> CommsResult<()> {
        let (base_id, message) = {
            let device = device.lock();
            (device.base_id(), device.get_burn_msg())
        };
        self.request(&message, base_id).await
    }

    /// Move the device to a new base identifier
    ///
    /// The device answers from its new window, so nothing is awaited.
    /// Outstanding requests for the old window are dropped.
    pub fn change_base_id(&self, device: &SharedDevice, new_base_id: u32) -> CommsResult<()> {
        let mut device = device.lock();
        for message in device.get_update_msgs(new_base_id)? {
            self.send(message.frame)?;
        }
        let old_base_id = device.base_id();
        device.set_base_id(new_base_id)?;
        self.inner.pending.clear_device(old_base_id);
        info!(device = %device.name, old_base_id, new_base_id, "Base id changed");
        Ok(())
    }

    async fn request_all(&self, messages: &[DeviceMessage], base_id: u32) -> CommsResult<()> {
        let mut waiters = Vec::with_capacity(messages.len());
        for message in messages {
            if let Some(waiter) = self.submit(message, base_id)? {
                waiters.push((message.pending_key(base_id), waiter));
            }
        }

        let mut first_error = None;
        for (key, waiter) in waiters {
            if let Err(e) = wait_for_outcome(key, waiter).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.inner.pending
    }

    /// Frames discarded because the RX queue was full
    pub fn rx_dropped(&self) -> u64 {
        self.inner.rx_queue.dropped()
    }

    /// Frames discarded because the TX queue was full
    pub fn tx_dropped(&self) -> u64 {
        self.inner.tx_queue.dropped()
    }
}

impl Drop for CommsPipeline {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
    }
}

async fn wait_for_outcome(
    key: Option<PendingKey>,
    waiter: oneshot::Receiver<RequestOutcome>,
) -> CommsResult<()> {
    match waiter.await {
        Ok(RequestOutcome::Completed) => Ok(()),
        Ok(RequestOutcome::TimedOut { retries }) => match key {
            Some(key) => Err(CommsError::RequestFailed { key, retries }),
            None => Err(CommsError::RequestCancelled),
        },
        Err(_) => Err(CommsError::RequestCancelled),
    }
}
