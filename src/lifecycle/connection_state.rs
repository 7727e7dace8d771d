use std::time::Duration;

use crate::platform::LinkHandle;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    /// a connection was initiated, waiting for the platform to report the link as established
    Connecting,
    /// link is established, looking for the configured service and characteristic
    Discovering,
    /// Notifications are enabled on the configured characteristic. This is the only state in
    ///  which chunks may be written.
    Ready,
    /// the link dropped unexpectedly, and a reconnection attempt is scheduled
    Retrying,
    /// reconnection attempts were exhausted
    Disconnected,
    /// Closed by the application. No automatic reconnection happens from here, only an
    ///  explicit `connect` leaves this state.
    ShuttingDown,
}
impl ConnectionState {
    /// states in which events for the active link are expected
    pub fn is_establishing_or_ready(&self) -> bool {
        use ConnectionState::*;

        match self {
            Connecting | Discovering | Ready => true,
            Idle | Scanning | Retrying | Disconnected | ShuttingDown => false,
        }
    }

    /// states without any link that should be kept alive
    pub fn is_at_rest(&self) -> bool {
        use ConnectionState::*;

        match self {
            Idle | Scanning | Disconnected | ShuttingDown => true,
            Connecting | Discovering | Ready | Retrying => false,
        }
    }
}

/// The connection state as published by the coordinating task. This is a read-only copy for
///  other tasks, the coordinating task remains the sole owner of the actual state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub link: Option<LinkHandle>,
}
impl ConnectionSnapshot {
    pub fn idle() -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: ConnectionState::Idle,
            link: None,
        }
    }

    /// the link to write to, if there is one that is ready for it
    pub fn ready_link(&self) -> Option<LinkHandle> {
        match self.state {
            ConnectionState::Ready => self.link,
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Counts reconnection attempts for a single connection sequence
#[derive(Debug, Clone)]
pub struct RetryContext {
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
}
impl RetryContext {
    pub fn new(max_attempts: u32, delay: Duration) -> RetryContext {
        RetryContext {
            attempt: 0,
            max_attempts,
            delay,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn on_failure(&mut self) -> RetryDecision {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt <= self.max_attempts {
            RetryDecision::RetryAfter(self.delay)
        }
        else {
            RetryDecision::GiveUp
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
