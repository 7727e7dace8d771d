use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::lifecycle::lifecycle_events::LifecycleEvent;
use crate::sender::reliable_sender::{ReliableSender, SendOutcome};

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub message: Bytes,
    /// shutdown epoch in which the message was accepted
    pub epoch: u64,
}

/// Spawns the dedicated send worker. It takes requests from the queue strictly one at a time,
///  so messages are delivered in submission order and their chunks never interleave on the
///  link.
///
/// Delivery failures are reported to the coordinating task, which owns the application
///  callbacks. The worker terminates when all queue senders are dropped.
pub fn spawn_send_worker(sender: ReliableSender, events: mpsc::UnboundedSender<LifecycleEvent>) -> (mpsc::UnboundedSender<SendRequest>, JoinHandle<()>) {
    let (queue_send, queue_recv) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_send_worker(sender, queue_recv, events));
    (queue_send, handle)
}

async fn run_send_worker(sender: ReliableSender, mut queue: mpsc::UnboundedReceiver<SendRequest>, events: mpsc::UnboundedSender<LifecycleEvent>) {
    info!("starting send worker");

    while let Some(request) = queue.recv().await {
        let outcome = sender.send(&request.message, request.epoch).await;
        debug!("send outcome for message of {} bytes: {:?}", request.message.len(), outcome);

        if outcome.is_delivery_failure() {
            warn!("could not deliver message of {} bytes", request.message.len());
            let _ = events.send(LifecycleEvent::DeliveryFailed(request.message));
        }
        else if outcome == SendOutcome::Abandoned {
            debug!("discarding message of {} bytes after shutdown", request.message.len());
        }
    }

    info!("send queue closed - terminating send worker");
}
