use tokio::sync::mpsc;
use tracing::info;

use crate::lifecycle::lifecycle_events::LifecycleEvent;
use crate::lifecycle::lifecycle_manager::ConnectionLifecycleManager;

/// The coordinating task: applies events to the lifecycle manager strictly one at a time, in the
///  order they were posted. Timer expiry, platform callbacks and application commands are all
///  serialized here, so none of them can race another.
pub async fn run_coordinator(mut manager: ConnectionLifecycleManager, mut events: mpsc::UnboundedReceiver<LifecycleEvent>) {
    info!("starting link coordinator");

    while let Some(evt) = events.recv().await {
        let is_terminate = matches!(evt, LifecycleEvent::Terminate);
        manager.on_event(evt).await;
        if is_terminate {
            break;
        }
    }

    info!("link coordinator terminated");
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use tokio::sync::watch;
    use uuid::Uuid;
    use crate::config::LinkConfig;
    use crate::lifecycle::connection_state::{ConnectionSnapshot, ConnectionState};
    use crate::lifecycle::shutdown::ShutdownSignal;
    use crate::platform::link_handles::LinkHandleSet;
    use crate::platform::{LinkEventSink, PeerId, PlatformDriver};
    use crate::test_util::fake_driver::FakeDriver;
    use super::*;

    #[tokio::test]
    async fn test_terminate_closes_and_stops() {
        let driver = Arc::new(FakeDriver::with_auto_establish());
        let (send, recv) = mpsc::unbounded_channel();
        driver.attach(LinkEventSink::new(send.clone()));
        let (published_send, mut published) = watch::channel(ConnectionSnapshot::idle());
        let link_handles = Arc::new(LinkHandleSet::new());

        let mut config = LinkConfig::new(Uuid::from_u128(1), Uuid::from_u128(2));
        config.release_settle_delay = std::time::Duration::ZERO;

        let manager = ConnectionLifecycleManager::new(
            Arc::new(config),
            driver.clone(),
            send.clone(),
            published_send,
            link_handles.clone(),
            Arc::new(ShutdownSignal::new()),
        );
        let coordinator = tokio::spawn(run_coordinator(manager, recv));

        send.send(LifecycleEvent::Connect(PeerId::from("aa"))).unwrap();
        published.wait_for(|s| s.state == ConnectionState::Ready).await.unwrap();

        send.send(LifecycleEvent::Terminate).unwrap();
        coordinator.await.unwrap();

        assert!(link_handles.is_empty().await);
        assert_eq!(driver.released(), vec![crate::platform::LinkHandle(1)]);
    }
}
