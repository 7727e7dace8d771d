use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace};

use crate::lifecycle::lifecycle_events::{LifecycleEvent, ScanListener};
use crate::platform::{PeerInfo, PlatformDriver};

/// Runs a single timed discovery session at a time. It lives on the coordinating task, the
///  timeout is a deferred task that posts back into the coordinator's event queue.
pub struct ScanCoordinator {
    driver: Arc<dyn PlatformDriver>,
    events: mpsc::UnboundedSender<LifecycleEvent>,
    listener: Option<Arc<dyn ScanListener>>,
    is_scanning: bool,
    generation: u64,
    timeout_handle: Option<JoinHandle<()>>,
}
impl ScanCoordinator {
    pub fn new(driver: Arc<dyn PlatformDriver>, events: mpsc::UnboundedSender<LifecycleEvent>) -> ScanCoordinator {
        ScanCoordinator {
            driver,
            events,
            listener: None,
            is_scanning: false,
            generation: 0,
            timeout_handle: None,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.is_scanning
    }

    /// Starts discovery, stopping a scan that is already running first. Peers are reported to
    ///  the listener until the scan is stopped or times out; finding a peer does not stop the
    ///  scan.
    pub async fn start_scan(&mut self, timeout: Duration, listener: Arc<dyn ScanListener>) -> anyhow::Result<()> {
        self.stop_scan().await;

        debug!("starting scan with timeout {:?}", timeout);
        self.driver.start_scan().await?;

        self.is_scanning = true;
        self.listener = Some(listener);
        self.generation += 1;

        let generation = self.generation;
        let events = self.events.clone();
        self.timeout_handle = Some(tokio::spawn(async move {
            sleep(timeout).await;
            let _ = events.send(LifecycleEvent::ScanTimeout { generation });
        }));
        Ok(())
    }

    /// Idempotent - calling this while not scanning does nothing
    pub async fn stop_scan(&mut self) {
        if let Some(handle) = self.timeout_handle.take() {
            handle.abort();
        }

        if self.is_scanning {
            debug!("stopping scan");
            self.is_scanning = false;
            self.listener = None;
            self.driver.stop_scan().await;
        }
    }

    /// returns `true` if the scan actually timed out, `false` for stale timer events
    pub async fn on_timeout(&mut self, generation: u64) -> bool {
        if !self.is_scanning || generation != self.generation {
            trace!("ignoring outdated scan timeout");
            return false;
        }

        info!("scan timed out");
        if let Some(listener) = self.listener.clone() {
            listener.on_scan_timeout();
        }
        self.stop_scan().await;
        true
    }

    pub fn on_peer_found(&self, peer: &PeerInfo) {
        match (&self.listener, self.is_scanning) {
            (Some(listener), true) => {
                debug!("found peer {} (rssi {})", peer.peer, peer.rssi);
                listener.on_peer_found(peer);
            }
            _ => trace!("peer {} reported while not scanning - ignoring", peer.peer),
        }
    }
}


#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use mockall::predicate::eq;
    use crate::lifecycle::lifecycle_events::MockScanListener;
    use crate::platform::{MockPlatformDriver, PeerId};
    use super::*;

    fn peer_info(id: &str) -> PeerInfo {
        PeerInfo {
            peer: PeerId::from(id),
            rssi: -60,
            scan_record: Bytes::new(),
        }
    }

    fn scanning_driver(num_scans: usize) -> MockPlatformDriver {
        let mut driver = MockPlatformDriver::new();
        driver.expect_start_scan()
            .times(num_scans)
            .returning(|| Ok(()));
        driver.expect_stop_scan()
            .times(num_scans)
            .return_const(());
        driver
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (send, mut recv) = mpsc::unbounded_channel();
        let mut scanner = ScanCoordinator::new(Arc::new(scanning_driver(1)), send);

        let mut listener = MockScanListener::new();
        listener.expect_on_scan_timeout()
            .times(1)
            .return_const(());

        scanner.start_scan(Duration::from_secs(10), Arc::new(listener)).await.unwrap();
        assert!(scanner.is_scanning());

        let start = tokio::time::Instant::now();
        let generation = match recv.recv().await {
            Some(LifecycleEvent::ScanTimeout { generation }) => generation,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        assert!(scanner.on_timeout(generation).await);
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_ignores_previous_timeout() {
        let (send, _recv) = mpsc::unbounded_channel();
        let mut scanner = ScanCoordinator::new(Arc::new(scanning_driver(2)), send);

        let mut first = MockScanListener::new();
        first.expect_on_scan_timeout().never();
        let mut second = MockScanListener::new();
        second.expect_on_scan_timeout().never();

        scanner.start_scan(Duration::from_secs(10), Arc::new(first)).await.unwrap();
        scanner.start_scan(Duration::from_secs(10), Arc::new(second)).await.unwrap();

        assert!(!scanner.on_timeout(1).await);
        assert!(scanner.is_scanning());

        scanner.stop_scan().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (send, _recv) = mpsc::unbounded_channel();
        let mut driver = MockPlatformDriver::new();
        driver.expect_stop_scan().never();
        let mut scanner = ScanCoordinator::new(Arc::new(driver), send);

        scanner.stop_scan().await;
        scanner.stop_scan().await;
        assert!(!scanner.is_scanning());
    }

    #[tokio::test]
    async fn test_peer_found_does_not_stop_scan() {
        let (send, _recv) = mpsc::unbounded_channel();
        let mut scanner = ScanCoordinator::new(Arc::new(scanning_driver(1)), send);

        let mut listener = MockScanListener::new();
        listener.expect_on_peer_found()
            .with(eq(peer_info("aa:bb")))
            .times(1)
            .return_const(());
        listener.expect_on_peer_found()
            .with(eq(peer_info("cc:dd")))
            .times(1)
            .return_const(());

        scanner.start_scan(Duration::from_secs(10), Arc::new(listener)).await.unwrap();
        scanner.on_peer_found(&peer_info("aa:bb"));
        scanner.on_peer_found(&peer_info("cc:dd"));
        assert!(scanner.is_scanning());

        scanner.stop_scan().await;
        scanner.on_peer_found(&peer_info("ee:ff"));
    }

    #[tokio::test]
    async fn test_failing_start() {
        let (send, _recv) = mpsc::unbounded_channel();
        let mut driver = MockPlatformDriver::new();
        driver.expect_start_scan()
            .returning(|| Err(anyhow::anyhow!("radio off")));
        let mut scanner = ScanCoordinator::new(Arc::new(driver), send);

        assert!(scanner.start_scan(Duration::from_secs(1), Arc::new(MockScanListener::new())).await.is_err());
        assert!(!scanner.is_scanning());
    }
}
