use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::platform::{LinkHandle, PlatformDriver};

/// Keeps track of every link handle that was ever observed, including handles of attempts that
///  were superseded or failed half-way. Platform connection objects are a scarce resource, and
///  leaking one can block the radio until the process terminates.
#[derive(Debug, Default)]
pub struct LinkHandleSet {
    handles: Mutex<FxHashSet<LinkHandle>>,
}
impl LinkHandleSet {
    pub fn new() -> LinkHandleSet {
        Default::default()
    }

    /// returns `true` if the handle was not tracked before
    pub async fn track(&self, link: LinkHandle) -> bool {
        let newly_tracked = self.handles.lock().await.insert(link);
        if newly_tracked {
            trace!("tracking link handle {:?}", link);
        }
        newly_tracked
    }

    pub async fn contains(&self, link: LinkHandle) -> bool {
        self.handles.lock().await.contains(&link)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    /// Removes all handles from the set and releases them. A handle failing to release is logged
    ///  and skipped, it does not keep the remaining handles from being released. The set is
    ///  empty afterwards in any case.
    ///
    /// Returns the number of handles whose release failed.
    pub async fn drain_and_release_all(&self, driver: &dyn PlatformDriver, settle_delay: Duration) -> usize {
        let drained = std::mem::take(&mut *self.handles.lock().await);
        if drained.is_empty() {
            return 0;
        }

        debug!("releasing {} link handle(s)", drained.len());

        let mut handles = drained.into_iter().collect::<Vec<_>>();
        handles.sort();

        let mut num_failed = 0;
        for link in handles {
            if !release_one(driver, link, settle_delay).await {
                num_failed += 1;
            }
        }
        num_failed
    }
}

async fn release_one(driver: &dyn PlatformDriver, link: LinkHandle, settle_delay: Duration) -> bool {
    trace!("closing link handle {:?}", link);

    // NB: a failed disconnect does not keep us from releasing the handle
    let disconnected = match driver.disconnect(link).await {
        Ok(()) => true,
        Err(e) => {
            warn!("error disconnecting link handle {:?}: {}", link, e);
            false
        }
    };

    let refreshed = driver.try_refresh(link).await;
    trace!("refreshing cache for {:?}: {}", link, refreshed);

    if !settle_delay.is_zero() {
        sleep(settle_delay).await;
    }

    match driver.release(link).await {
        Ok(()) => disconnected,
        Err(e) => {
            warn!("error releasing link handle {:?} - skipping: {}", link, e);
            false
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use anyhow::anyhow;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use crate::platform::MockPlatformDriver;
    use super::*;

    #[tokio::test]
    async fn test_track() {
        let set = LinkHandleSet::new();
        assert!(set.is_empty().await);

        assert!(set.track(LinkHandle(1)).await);
        assert!(!set.track(LinkHandle(1)).await);
        assert!(set.track(LinkHandle(2)).await);

        assert_eq!(set.len().await, 2);
        assert!(set.contains(LinkHandle(2)).await);
        assert!(!set.contains(LinkHandle(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_sequence() {
        let mut driver = MockPlatformDriver::new();
        let mut seq = Sequence::new();
        driver.expect_disconnect()
            .with(eq(LinkHandle(5)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        driver.expect_try_refresh()
            .with(eq(LinkHandle(5)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(true);
        driver.expect_release()
            .with(eq(LinkHandle(5)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let set = LinkHandleSet::new();
        set.track(LinkHandle(5)).await;

        let start = tokio::time::Instant::now();
        assert_eq!(set.drain_and_release_all(&driver, Duration::from_millis(600)).await, 0);
        assert_eq!(start.elapsed(), Duration::from_millis(600));
        assert!(set.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_continues_after_failure() {
        let released = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut driver = MockPlatformDriver::new();
        driver.expect_disconnect()
            .returning(|link| if link == LinkHandle(2) { Err(anyhow!("gone")) } else { Ok(()) });
        driver.expect_try_refresh()
            .return_const(false);
        let released_clone = released.clone();
        driver.expect_release()
            .times(3)
            .returning(move |link| {
                released_clone.lock().unwrap().push(link);
                if link == LinkHandle(1) { Err(anyhow!("platform error")) } else { Ok(()) }
            });

        let set = LinkHandleSet::new();
        for i in 1..=3 {
            set.track(LinkHandle(i)).await;
        }

        assert_eq!(set.drain_and_release_all(&driver, Duration::ZERO).await, 2);
        assert!(set.is_empty().await);
        assert_eq!(*released.lock().unwrap(), vec![LinkHandle(1), LinkHandle(2), LinkHandle(3)]);
    }

    #[tokio::test]
    async fn test_drain_empty_set() {
        let driver = MockPlatformDriver::new();
        let set = LinkHandleSet::new();
        assert_eq!(set.drain_and_release_all(&driver, Duration::ZERO).await, 0);
    }
}
