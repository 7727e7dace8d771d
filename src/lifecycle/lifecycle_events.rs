use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
#[cfg(test)] use mockall::automock;

use crate::platform::{LinkEvent, PeerId, PeerInfo};

/// Everything the coordinating task reacts to. Commands from the application, events from the
///  platform driver, timer expiry and reports from the send worker all go through this single
///  type, and they are processed strictly one at a time.
pub enum LifecycleEvent {
    StartScan { timeout: Duration, listener: Arc<dyn ScanListener> },
    StopScan,
    Connect(PeerId),
    Close,
    SetCallbacks(Arc<dyn LinkCallbacks>),
    Link(LinkEvent),
    /// Timer events carry the generation of the timer that was scheduled. A timer that was
    ///  cancelled after its event was queued is recognized by an outdated generation.
    RetryDue { generation: u64 },
    ScanTimeout { generation: u64 },
    /// a message could not be delivered after exhausting all retries
    DeliveryFailed(Bytes),
    /// the session handle was dropped - close and stop processing
    Terminate,
}

impl Debug for LifecycleEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::StartScan { timeout, .. } => write!(f, "StartScan{{timeout:{:?}}}", timeout),
            LifecycleEvent::StopScan => write!(f, "StopScan"),
            LifecycleEvent::Connect(peer) => write!(f, "Connect({})", peer),
            LifecycleEvent::Close => write!(f, "Close"),
            LifecycleEvent::SetCallbacks(_) => write!(f, "SetCallbacks"),
            LifecycleEvent::Link(evt) => write!(f, "Link({:?})", evt),
            LifecycleEvent::RetryDue { generation } => write!(f, "RetryDue{{generation:{}}}", generation),
            LifecycleEvent::ScanTimeout { generation } => write!(f, "ScanTimeout{{generation:{}}}", generation),
            LifecycleEvent::DeliveryFailed(msg) => write!(f, "DeliveryFailed({} bytes)", msg.len()),
            LifecycleEvent::Terminate => write!(f, "Terminate"),
        }
    }
}

/// Application callbacks for an established session. They are invoked on the coordinating task
///  and should return quickly.
#[cfg_attr(test, automock)]
pub trait LinkCallbacks: Send + Sync + 'static {
    fn on_message(&self, message: Bytes);

    /// reconnection attempts are exhausted, the session settles in `Disconnected`
    fn on_permanent_failure(&self);

    fn on_delivery_failed(&self, _message: Bytes) {}
}

/// Callbacks for a single timed discovery session
#[cfg_attr(test, automock)]
pub trait ScanListener: Send + Sync + 'static {
    fn on_peer_found(&self, peer: &PeerInfo);
    fn on_scan_timeout(&self);
}
