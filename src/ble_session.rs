use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::BleError;
use crate::lifecycle::connection_state::ConnectionSnapshot;
use crate::lifecycle::coordinator::run_coordinator;
use crate::lifecycle::lifecycle_events::{LifecycleEvent, LinkCallbacks, ScanListener};
use crate::lifecycle::lifecycle_manager::ConnectionLifecycleManager;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::platform::link_handles::LinkHandleSet;
use crate::platform::{LinkEventSink, PeerId, PlatformDriver};
use crate::sender::reliable_sender::ReliableSender;
use crate::sender::send_queue::{spawn_send_worker, SendRequest};

/// The application's handle to a link session.
///
/// All operations are non-blocking triggers: they hand a command to the session's coordinating
///  task and return, and their outcome is observed through callbacks or the published
///  [ConnectionSnapshot]. Dropping the handle closes the session and terminates its tasks.
pub struct BleSession {
    config: Arc<LinkConfig>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    send_queue: mpsc::UnboundedSender<SendRequest>,
    state: watch::Receiver<ConnectionSnapshot>,
    shutdown: Arc<ShutdownSignal>,
    link_handles: Arc<LinkHandleSet>,
    tasks: Option<SessionTasks>,
}

struct SessionTasks {
    coordinator: JoinHandle<()>,
    send_worker: JoinHandle<()>,
}

impl Debug for BleSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BleSession{{service:{},characteristic:{},state:{:?}}}", self.config.service_id, self.config.characteristic_id, self.state.borrow().state)
    }
}

impl BleSession {
    /// Starts the session's coordinating task and send worker, and attaches the driver's events
    ///  to the session. This must be called from within a tokio runtime.
    pub fn start(config: LinkConfig, driver: Arc<dyn PlatformDriver>) -> Result<BleSession, BleError> {
        config.validate()?;
        let config = Arc::new(config);

        info!("starting link session for service {} / characteristic {}", config.service_id, config.characteristic_id);

        let (events_send, events_recv) = mpsc::unbounded_channel();
        let (state_send, state_recv) = watch::channel(ConnectionSnapshot::idle());
        let shutdown = Arc::new(ShutdownSignal::new());
        let link_handles = Arc::new(LinkHandleSet::new());

        driver.attach(LinkEventSink::new(events_send.clone()));

        let manager = ConnectionLifecycleManager::new(
            config.clone(),
            driver.clone(),
            events_send.clone(),
            state_send,
            link_handles.clone(),
            shutdown.clone(),
        );
        let coordinator = tokio::spawn(run_coordinator(manager, events_recv));

        let sender = ReliableSender::new(config.clone(), driver, state_recv.clone(), shutdown.clone());
        let (send_queue, send_worker) = spawn_send_worker(sender, events_send.clone());

        Ok(BleSession {
            config,
            events: events_send,
            send_queue,
            state: state_recv,
            shutdown,
            link_handles,
            tasks: Some(SessionTasks {
                coordinator,
                send_worker,
            }),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn post(&self, event: LifecycleEvent) -> Result<(), BleError> {
        self.events.send(event)
            .map_err(|_| BleError::SessionClosed)
    }

    /// Starts a timed discovery session, replacing one that is running. Found peers are
    ///  reported to the listener until the scan is stopped, times out or a connection is
    ///  initiated.
    pub fn scan(&self, timeout: Duration, listener: Arc<dyn ScanListener>) -> Result<(), BleError> {
        if timeout.is_zero() {
            return Err(BleError::InvalidArgument("scan timeout must not be zero".to_string()));
        }
        self.post(LifecycleEvent::StartScan { timeout, listener })
    }

    pub fn scan_with_default_timeout(&self, listener: Arc<dyn ScanListener>) -> Result<(), BleError> {
        self.scan(self.config.scan_timeout, listener)
    }

    pub fn stop_scan(&self) -> Result<(), BleError> {
        self.post(LifecycleEvent::StopScan)
    }

    /// Tears down any existing link and starts connecting to the peer, reconnecting after
    ///  transient failures
    pub fn connect(&self, peer: impl Into<PeerId>) -> Result<(), BleError> {
        let peer = peer.into();
        if peer.0.trim().is_empty() {
            return Err(BleError::InvalidArgument("peer id must not be empty".to_string()));
        }
        self.post(LifecycleEvent::Connect(peer))
    }

    /// Enqueues a message for delivery. Messages are delivered one at a time, in the order in
    ///  which they were enqueued.
    ///
    /// A message is only accepted while the link is ready, there is no queuing across
    ///  connection states. A message that can not be delivered after exhausting its retries is
    ///  reported through [LinkCallbacks::on_delivery_failed].
    pub fn send(&self, message: impl Into<Bytes>) -> Result<(), BleError> {
        let message = message.into();
        if message.len() > self.config.max_message_size {
            return Err(BleError::MessageTooLarge { len: message.len(), max: self.config.max_message_size });
        }

        if self.state.borrow().ready_link().is_none() {
            debug!("link is not ready - dropping message of {} bytes", message.len());
            return Err(BleError::NotReady);
        }

        self.send_queue.send(SendRequest {
            message,
            epoch: self.shutdown.epoch(),
        }).map_err(|_| BleError::SessionClosed)
    }

    pub fn set_receive_callback(&self, callbacks: Arc<dyn LinkCallbacks>) -> Result<(), BleError> {
        self.post(LifecycleEvent::SetCallbacks(callbacks))
    }

    /// Releases every link handle and stops reconnecting. Messages that were not delivered yet
    ///  are abandoned. A subsequent `connect` starts over.
    pub fn close(&self) -> Result<(), BleError> {
        self.post(LifecycleEvent::Close)
    }

    pub fn state(&self) -> ConnectionSnapshot {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state.clone()
    }

    pub async fn tracked_link_count(&self) -> usize {
        self.link_handles.len().await
    }

    /// Closes the session and waits for the coordinating task to terminate. Messages that are
    ///  still queued are abandoned.
    pub async fn shutdown(mut self) {
        let _ = self.events.send(LifecycleEvent::Terminate);

        if let Some(tasks) = self.tasks.take() {
            let _ = tasks.coordinator.await;
            tasks.send_worker.abort();
            let _ = tasks.send_worker.await;
        }
    }
}

impl Drop for BleSession {
    fn drop(&mut self) {
        if self.tasks.is_some() {
            let _ = self.events.send(LifecycleEvent::Terminate);
        }
    }
}
