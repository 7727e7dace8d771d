use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use crate::lifecycle::lifecycle_events::{LinkCallbacks, ScanListener};
use crate::platform::PeerInfo;

#[derive(Default)]
struct Recorded {
    messages: Vec<Bytes>,
    permanent_failures: usize,
    delivery_failures: Vec<Bytes>,
    peers: Vec<PeerInfo>,
    scan_timeouts: usize,
}

/// Records everything a session reports to the application, both as [LinkCallbacks] and as
///  [ScanListener]
#[derive(Default)]
pub struct RecordingCallbacks {
    recorded: Mutex<Recorded>,
}
impl RecordingCallbacks {
    pub fn new() -> RecordingCallbacks {
        Default::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn messages(&self) -> Vec<Bytes> {
        self.recorded().messages.clone()
    }

    pub fn permanent_failures(&self) -> usize {
        self.recorded().permanent_failures
    }

    pub fn delivery_failures(&self) -> Vec<Bytes> {
        self.recorded().delivery_failures.clone()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.recorded().peers.clone()
    }

    pub fn scan_timeouts(&self) -> usize {
        self.recorded().scan_timeouts
    }
}

impl LinkCallbacks for RecordingCallbacks {
    fn on_message(&self, message: Bytes) {
        self.recorded().messages.push(message);
    }

    fn on_permanent_failure(&self) {
        self.recorded().permanent_failures += 1;
    }

    fn on_delivery_failed(&self, message: Bytes) {
        self.recorded().delivery_failures.push(message);
    }
}

impl ScanListener for RecordingCallbacks {
    fn on_peer_found(&self, peer: &PeerInfo) {
        self.recorded().peers.push(peer.clone());
    }

    fn on_scan_timeout(&self) {
        self.recorded().scan_timeouts += 1;
    }
}
