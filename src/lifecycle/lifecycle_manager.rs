use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::chunk::reassembly::ReassemblyEngine;
use crate::config::LinkConfig;
use crate::lifecycle::connection_state::{ConnectionSnapshot, ConnectionState, RetryContext, RetryDecision};
use crate::lifecycle::lifecycle_events::{LifecycleEvent, LinkCallbacks, ScanListener};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::platform::link_handles::LinkHandleSet;
use crate::platform::{LinkEvent, LinkHandle, PeerId, PlatformDriver};
use crate::scan_coordinator::ScanCoordinator;

/// The connection state machine. It lives on the coordinating task and is the sole owner of the
///  connection state, the retry context, the active link and its reassembly buffer; other tasks
///  only see the published [ConnectionSnapshot].
///
/// Every link handle the driver hands out is tracked in the shared [LinkHandleSet], and the set
///  is drained whenever the session loses its link, is reconnected or closed.
pub struct ConnectionLifecycleManager {
    config: Arc<LinkConfig>,
    driver: Arc<dyn PlatformDriver>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    published: watch::Sender<ConnectionSnapshot>,
    link_handles: Arc<LinkHandleSet>,
    shutdown: Arc<ShutdownSignal>,
    scanner: ScanCoordinator,
    state: ConnectionState,
    retry: RetryContext,
    peer: Option<PeerId>,
    active_link: Option<LinkHandle>,
    reassembly: ReassemblyEngine,
    callbacks: Option<Arc<dyn LinkCallbacks>>,
    retry_generation: u64,
    retry_handle: Option<JoinHandle<()>>,
}
impl ConnectionLifecycleManager {
    pub fn new(
        config: Arc<LinkConfig>,
        driver: Arc<dyn PlatformDriver>,
        events: mpsc::UnboundedSender<LifecycleEvent>,
        published: watch::Sender<ConnectionSnapshot>,
        link_handles: Arc<LinkHandleSet>,
        shutdown: Arc<ShutdownSignal>,
    ) -> ConnectionLifecycleManager {
        let retry = RetryContext::new(config.max_reconnect_attempts, config.reconnect_delay);
        let scanner = ScanCoordinator::new(driver.clone(), events.clone());

        ConnectionLifecycleManager {
            config,
            driver,
            events,
            published,
            link_handles,
            shutdown,
            scanner,
            state: ConnectionState::Idle,
            retry,
            peer: None,
            active_link: None,
            reassembly: ReassemblyEngine::new(),
            callbacks: None,
            retry_generation: 0,
            retry_handle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn active_link(&self) -> Option<LinkHandle> {
        self.active_link
    }

    /// number of failures in the current connection sequence
    pub fn retry_attempt(&self) -> u32 {
        self.retry.attempt()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// the single dispatch entry point for everything that happens to the session
    pub async fn on_event(&mut self, event: LifecycleEvent) {
        trace!("lifecycle event {:?} in state {:?}", event, self.state);

        match event {
            LifecycleEvent::StartScan { timeout, listener } => self.on_start_scan(timeout, listener).await,
            LifecycleEvent::StopScan => self.on_stop_scan().await,
            LifecycleEvent::Connect(peer) => self.on_connect(peer).await,
            LifecycleEvent::Close => self.close().await,
            LifecycleEvent::SetCallbacks(callbacks) => {
                debug!("application callbacks registered");
                self.callbacks = Some(callbacks);
            }
            LifecycleEvent::Link(evt) => self.on_link_event(evt).await,
            LifecycleEvent::RetryDue { generation } => self.on_retry_due(generation).await,
            LifecycleEvent::ScanTimeout { generation } => {
                if self.scanner.on_timeout(generation).await {
                    self.leave_scanning();
                }
            }
            LifecycleEvent::DeliveryFailed(message) => {
                match &self.callbacks {
                    Some(callbacks) => callbacks.on_delivery_failed(message),
                    None => warn!("message of {} bytes could not be delivered, and there is no callback to report it to", message.len()),
                }
            }
            LifecycleEvent::Terminate => {
                debug!("session terminated");
                self.close().await;
            }
        }
    }

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::PeerFound(peer) => self.scanner.on_peer_found(&peer),
            LinkEvent::LinkConnected(link) => self.on_link_connected(link).await,
            LinkEvent::LinkDropped { link, status } => self.on_link_dropped(link, status).await,
            LinkEvent::ServicesDiscovered { link, success } => self.on_services_discovered(link, success).await,
            LinkEvent::DataReceived { link, data } => self.on_data_received(link, &data),
        }
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if new_state != self.state {
            debug!("connection state {:?} -> {:?}", self.state, new_state);
        }
        self.state = new_state;
        self.published.send_replace(ConnectionSnapshot {
            state: new_state,
            link: self.active_link,
        });
    }

    async fn on_start_scan(&mut self, timeout: Duration, listener: Arc<dyn ScanListener>) {
        if self.state == ConnectionState::ShuttingDown {
            warn!("scan requested while the session is closed - ignoring");
            return;
        }

        if let Err(e) = self.scanner.start_scan(timeout, listener).await {
            error!("could not start scan: {}", e);
            self.leave_scanning();
            return;
        }

        if matches!(self.state, ConnectionState::Idle | ConnectionState::Disconnected) {
            self.set_state(ConnectionState::Scanning);
        }
    }

    async fn on_stop_scan(&mut self) {
        self.scanner.stop_scan().await;
        self.leave_scanning();
    }

    fn leave_scanning(&mut self) {
        if self.state == ConnectionState::Scanning {
            self.set_state(ConnectionState::Idle);
        }
    }

    /// Tears down whatever link exists and starts a fresh connection sequence. This is also the
    ///  only way out of `ShuttingDown`.
    async fn on_connect(&mut self, peer: PeerId) {
        info!("connecting to {}", peer);

        self.scanner.stop_scan().await;
        self.cancel_retry_timer();
        self.shutdown.reset();

        self.active_link = None;
        self.reassembly.reset();
        self.release_all_handles().await;
        self.retry.reset();

        if self.state == ConnectionState::ShuttingDown {
            self.set_state(ConnectionState::Idle);
        }

        self.peer = Some(peer);
        self.begin_connect().await;
    }

    async fn begin_connect(&mut self) {
        let peer = match &self.peer {
            Some(peer) => peer.clone(),
            None => {
                warn!("no peer to connect to");
                return;
            }
        };

        self.set_state(ConnectionState::Connecting);

        match self.driver.connect(&peer).await {
            Ok(link) => {
                debug!("initiated connection to {} as {:?}", peer, link);
                self.link_handles.track(link).await;
                self.active_link = Some(link);
                self.set_state(ConnectionState::Connecting);
            }
            Err(e) => {
                warn!("error connecting to {}: {}", peer, e);
                self.on_link_failure().await;
            }
        }
    }

    async fn on_link_connected(&mut self, link: LinkHandle) {
        if self.link_handles.track(link).await {
            debug!("link {:?} was reported without being initiated", link);
        }

        if self.state.is_at_rest() {
            debug!("link {:?} established while there is no connection sequence - releasing it", link);
            self.release_all_handles().await;
            return;
        }

        if self.active_link != Some(link) || self.state != ConnectionState::Connecting {
            debug!("ignoring establishment of superseded link {:?}", link);
            return;
        }

        info!("link {:?} established, discovering services", link);
        self.set_state(ConnectionState::Discovering);

        if let Err(e) = self.driver.discover_services(link).await {
            warn!("error starting service discovery on {:?}: {}", link, e);
            self.on_link_failure().await;
        }
    }

    async fn on_services_discovered(&mut self, link: LinkHandle, success: bool) {
        if self.active_link != Some(link) || self.state != ConnectionState::Discovering {
            debug!("ignoring service discovery result for {:?} in state {:?}", link, self.state);
            return;
        }

        if !success {
            warn!("service discovery failed on {:?}", link);
            self.on_link_failure().await;
            return;
        }

        let service = self.config.service_id;
        let characteristic = self.config.characteristic_id;

        // NB: notifications are toggled off first to reset the peer's subscription state
        if let Err(e) = self.driver.set_notification(link, service, characteristic, false).await {
            debug!("error disabling notifications on {:?}: {}", link, e);
        }
        if let Err(e) = self.driver.set_notification(link, service, characteristic, true).await {
            warn!("could not enable notifications for {} / {} on {:?}: {}", service, characteristic, link, e);
            self.on_link_failure().await;
            return;
        }

        info!("link {:?} is ready", link);
        self.retry.reset();
        self.reassembly.reset();
        self.set_state(ConnectionState::Ready);
    }

    async fn on_link_dropped(&mut self, link: LinkHandle, status: i32) {
        self.link_handles.track(link).await;

        if self.state.is_at_rest() {
            debug!("link {:?} dropped (status {}) while there is no connection sequence", link, status);
            self.release_all_handles().await;
            return;
        }

        if self.active_link != Some(link) || !self.state.is_establishing_or_ready() {
            debug!("ignoring drop of superseded link {:?} (status {})", link, status);
            return;
        }

        warn!("link {:?} dropped unexpectedly in state {:?}, status {}", link, self.state, status);
        self.on_link_failure().await;
    }

    /// A transient failure of the active connection sequence: all handles are released, and a
    ///  reconnection is scheduled unless the retry bound is exceeded.
    async fn on_link_failure(&mut self) {
        self.active_link = None;
        self.reassembly.reset();
        self.release_all_handles().await;

        match self.retry.on_failure() {
            RetryDecision::RetryAfter(delay) => {
                info!("reconnecting in {:?} (attempt {} of {})", delay, self.retry.attempt(), self.retry.max_attempts());
                self.set_state(ConnectionState::Retrying);
                self.schedule_retry(delay);
            }
            RetryDecision::GiveUp => {
                warn!("giving up after {} failed connection attempts", self.retry.attempt());
                self.set_state(ConnectionState::Disconnected);
                match &self.callbacks {
                    Some(callbacks) => callbacks.on_permanent_failure(),
                    None => warn!("connection permanently lost, and there is no callback to report it to"),
                }
            }
        }
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_retry_timer();

        let generation = self.retry_generation;
        let events = self.events.clone();
        self.retry_handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(LifecycleEvent::RetryDue { generation });
        }));
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(handle) = self.retry_handle.take() {
            handle.abort();
        }
        self.retry_generation += 1;
    }

    async fn on_retry_due(&mut self, generation: u64) {
        if generation != self.retry_generation || self.state != ConnectionState::Retrying {
            trace!("ignoring outdated retry timer");
            return;
        }
        self.retry_handle = None;
        self.begin_connect().await;
    }

    fn on_data_received(&mut self, link: LinkHandle, data: &[u8]) {
        if self.state != ConnectionState::Ready || self.active_link != Some(link) {
            trace!("ignoring {} bytes received on {:?} in state {:?}", data.len(), link, self.state);
            return;
        }

        match self.reassembly.feed_frame(data) {
            Ok(Some(message)) => {
                debug!("received message of {} bytes", message.len());
                match &self.callbacks {
                    Some(callbacks) => callbacks.on_message(message),
                    None => warn!("received message of {} bytes, but there is no callback - dropping it", message.len()),
                }
            }
            Ok(None) => trace!("{} bytes of message pending", self.reassembly.pending().len()),
            Err(e) => warn!("dropping malformed frame {:?}: {}", data, e),
        }
    }

    /// Stops all activity and releases every tracked handle. No automatic reconnection happens
    ///  after this, regardless of late link events.
    pub async fn close(&mut self) {
        info!("closing session");

        self.shutdown.trigger();
        self.cancel_retry_timer();
        self.scanner.stop_scan().await;

        self.active_link = None;
        self.reassembly.reset();
        self.release_all_handles().await;
        self.set_state(ConnectionState::ShuttingDown);
    }

    async fn release_all_handles(&self) {
        let num_failed = self.link_handles.drain_and_release_all(self.driver.as_ref(), self.config.release_settle_delay).await;
        if num_failed > 0 {
            warn!("{} link handle(s) could not be released cleanly", num_failed);
        }
    }
}
