//! This is the seam to the platform's wireless stack. Radio scanning, the platform's connection
//!  objects and characteristic addressing all live behind [PlatformDriver], which is implemented
//!  per platform outside this crate.
//!
//! The driver reports asynchronous link events through a [LinkEventSink]. Events may be posted
//!  from any thread; the sink marshals them onto the coordinating task, which is the only place
//!  where connection state is touched.

pub mod link_handles;

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::lifecycle::lifecycle_events::LifecycleEvent;

/// Opaque identifier of a platform connection object. A single connection sequence can create
///  several of them (e.g. through reconnection attempts), and every one of them must be released.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct LinkHandle(pub u64);

/// Identifies a peer device, typically its hardware address
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PeerId(pub String);

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        PeerId(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        PeerId(value)
    }
}

/// a peer seen during discovery
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PeerInfo {
    pub peer: PeerId,
    pub rssi: i16,
    /// raw advertisement record as received over the air
    pub scan_record: Bytes,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LinkEvent {
    PeerFound(PeerInfo),
    LinkConnected(LinkHandle),
    /// The link was lost or could not be established. `status` is the platform's raw status
    ///  code, it is logged but not interpreted.
    LinkDropped { link: LinkHandle, status: i32 },
    ServicesDiscovered { link: LinkHandle, success: bool },
    DataReceived { link: LinkHandle, data: Bytes },
}

#[derive(Clone, Debug)]
pub struct LinkEventSink {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}
impl LinkEventSink {
    pub fn new(sender: mpsc::UnboundedSender<LifecycleEvent>) -> LinkEventSink {
        LinkEventSink { sender }
    }

    pub fn post(&self, event: LinkEvent) {
        if self.sender.send(LifecycleEvent::Link(event)).is_err() {
            debug!("link event posted after the session was terminated - ignoring");
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlatformDriver: Send + Sync + 'static {
    /// called once when a session is started, handing the driver the sink for its events
    fn attach(&self, sink: LinkEventSink);

    async fn start_scan(&self) -> anyhow::Result<()>;
    async fn stop_scan(&self);

    /// Initiates a connection, returning the handle of the new connection object immediately.
    ///  Establishment (or failure) is reported asynchronously as a link event.
    async fn connect(&self, peer: &PeerId) -> anyhow::Result<LinkHandle>;

    /// starts service discovery on an established link, the result is reported asynchronously
    async fn discover_services(&self, link: LinkHandle) -> anyhow::Result<()>;

    /// Fails if the service or characteristic does not exist on the peer
    async fn set_notification(&self, link: LinkHandle, service: Uuid, characteristic: Uuid, enable: bool) -> anyhow::Result<()>;

    async fn write(&self, link: LinkHandle, service: Uuid, characteristic: Uuid, frame: &[u8]) -> bool;

    async fn disconnect(&self, link: LinkHandle) -> anyhow::Result<()>;
    async fn release(&self, link: LinkHandle) -> anyhow::Result<()>;

    /// Optional capability: drop the platform's cached view of the peer's services. Drivers
    ///  that can not do this keep the default.
    async fn try_refresh(&self, _link: LinkHandle) -> bool {
        false
    }
}
