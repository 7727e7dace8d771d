use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The single cancellation primitive shared by the coordinating task and the send worker.
///  Cancellation is cooperative: loops check the signal at their boundaries, and a write that is
///  in flight completes regardless.
///
/// Every trigger starts a new epoch. Work that was accepted in an earlier epoch stays cancelled
///  even after the signal is reset by a fresh `connect`.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    epoch: AtomicU64,
}
impl ShutdownSignal {
    pub fn new() -> ShutdownSignal {
        Default::default()
    }

    pub fn trigger(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.triggered.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// `true` if the signal is triggered, or work from the given epoch was cancelled since
    pub fn is_cancelled(&self, epoch: u64) -> bool {
        self.is_triggered() || self.epoch() != epoch
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_and_reset() {
        let signal = ShutdownSignal::new();
        let epoch = signal.epoch();
        assert!(!signal.is_cancelled(epoch));

        signal.trigger();
        assert!(signal.is_triggered());
        assert!(signal.is_cancelled(epoch));

        signal.reset();
        assert!(!signal.is_triggered());
        assert!(signal.is_cancelled(epoch));
        assert!(!signal.is_cancelled(signal.epoch()));
    }
}
