use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::chunk::chunk_codec::{encode, Chunk};
use crate::config::LinkConfig;
use crate::lifecycle::connection_state::ConnectionSnapshot;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::platform::{LinkHandle, PlatformDriver};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SendOutcome {
    /// all chunks were written in order
    Delivered,
    /// every message attempt failed on some chunk
    Exhausted,
    /// there was no ready link when an attempt started
    LinkUnavailable,
    /// the session was shut down during delivery
    Abandoned,
}
impl SendOutcome {
    /// failures that should be reported to the application
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, SendOutcome::Exhausted | SendOutcome::LinkUnavailable)
    }
}

enum AttemptResult {
    Complete,
    FailedAtChunk(usize),
    LinkLost,
    Abandoned,
}

enum WriteResult {
    Written,
    Failed,
    LinkLost,
    Abandoned,
}

/// Delivers one message at a time over the ready link, chunk by chunk.
///
/// Each chunk gets a bounded number of write attempts. A chunk exhausting them fails the whole
///  message attempt, and the next attempt starts over with the first chunk - the receiving side
///  discards the partial message when it sees the START chunk again. Every write is followed by
///  a pacing delay to avoid overrunning the link's internal buffer.
///
/// All waiting happens on the caller's task, which is the dedicated send worker.
pub struct ReliableSender {
    config: Arc<LinkConfig>,
    driver: Arc<dyn PlatformDriver>,
    link_state: watch::Receiver<ConnectionSnapshot>,
    shutdown: Arc<ShutdownSignal>,
}
impl ReliableSender {
    pub fn new(
        config: Arc<LinkConfig>,
        driver: Arc<dyn PlatformDriver>,
        link_state: watch::Receiver<ConnectionSnapshot>,
        shutdown: Arc<ShutdownSignal>,
    ) -> ReliableSender {
        ReliableSender {
            config,
            driver,
            link_state,
            shutdown,
        }
    }

    /// Sends a message that was accepted in the given shutdown epoch. The message is abandoned
    ///  as soon as a shutdown for that epoch is observed.
    pub async fn send(&self, message: &[u8], epoch: u64) -> SendOutcome {
        let frames = encode(message).iter()
            .map(Chunk::to_frame)
            .collect::<Vec<_>>();

        trace!("sending message of {} bytes in {} chunk(s)", message.len(), frames.len());

        for attempt in 1..=self.config.message_retry_limit {
            if self.shutdown.is_cancelled(epoch) {
                debug!("giving up on message - shut down by the application");
                return SendOutcome::Abandoned;
            }

            let ready_link = self.link_state.borrow().ready_link();
            let link = match ready_link {
                Some(link) => link,
                None => {
                    debug!("no ready link for sending a message");
                    return SendOutcome::LinkUnavailable;
                }
            };

            match self.try_send_frames(link, &frames, epoch).await {
                AttemptResult::Complete => {
                    trace!("message delivered on attempt {}", attempt);
                    return SendOutcome::Delivered;
                }
                AttemptResult::Abandoned => {
                    debug!("giving up on message - shut down by the application");
                    return SendOutcome::Abandoned;
                }
                AttemptResult::LinkLost => {
                    debug!("link {:?} is no longer ready - giving up on message", link);
                    return SendOutcome::LinkUnavailable;
                }
                AttemptResult::FailedAtChunk(idx) => {
                    debug!("sending message failed at chunk {} of {}, attempt {} of {}", idx + 1, frames.len(), attempt, self.config.message_retry_limit);
                }
            }
        }

        warn!("sending message failed after {} attempts", self.config.message_retry_limit);
        SendOutcome::Exhausted
    }

    async fn try_send_frames(&self, link: LinkHandle, frames: &[Bytes], epoch: u64) -> AttemptResult {
        for (idx, frame) in frames.iter().enumerate() {
            match self.write_with_retry(link, frame, epoch).await {
                WriteResult::Written => {}
                WriteResult::Failed => return AttemptResult::FailedAtChunk(idx),
                WriteResult::LinkLost => return AttemptResult::LinkLost,
                WriteResult::Abandoned => return AttemptResult::Abandoned,
            }
        }
        AttemptResult::Complete
    }

    async fn write_with_retry(&self, link: LinkHandle, frame: &[u8], epoch: u64) -> WriteResult {
        for try_no in 1..=self.config.chunk_retry_limit {
            if self.shutdown.is_cancelled(epoch) {
                return WriteResult::Abandoned;
            }

            // chunks may only be written while the link they were started on is ready
            let ready_link = self.link_state.borrow().ready_link();
            if ready_link != Some(link) {
                return WriteResult::LinkLost;
            }

            if self.driver.write(link, self.config.service_id, self.config.characteristic_id, frame).await {
                trace!("wrote frame {:?}", frame);
                sleep(self.config.write_success_pacing).await;
                return WriteResult::Written;
            }

            debug!("writing frame {:?} failed, try {} of {}", frame, try_no, self.config.chunk_retry_limit);
            sleep(self.config.write_failure_pacing).await;
        }
        WriteResult::Failed
    }
}
