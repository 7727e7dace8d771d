use std::time::Duration;

use uuid::Uuid;

use crate::error::BleError;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// the service on the peer that hosts the characteristic used for data exchange
    pub service_id: Uuid,
    /// the characteristic that chunks are written to, and that notifies received chunks
    pub characteristic_id: Uuid,

    /// number of reconnection attempts after an unexpected link drop before the connection is
    ///  considered permanently lost. The counter is reset whenever the link becomes ready.
    pub max_reconnect_attempts: u32,
    /// fixed backoff between an unexpected link drop and the next reconnection attempt
    pub reconnect_delay: Duration,

    /// number of attempts to deliver a message, each starting with the first chunk
    pub message_retry_limit: u32,
    /// number of write attempts per chunk in a single message attempt
    pub chunk_retry_limit: u32,
    /// Pause after a successful chunk write. The link has limited internal buffering, and writing
    ///  faster than it drains causes frames to be lost silently. This is a throughput / stability
    ///  trade-off rather than a correctness requirement.
    pub write_success_pacing: Duration,
    /// pause after a failed chunk write, before the next attempt
    pub write_failure_pacing: Duration,

    pub scan_timeout: Duration,

    /// pause between disconnecting a link handle and releasing it, giving the platform stack
    ///  time to wind down the connection
    pub release_settle_delay: Duration,

    pub max_message_size: usize,
}

impl LinkConfig {
    pub fn new(service_id: Uuid, characteristic_id: Uuid) -> LinkConfig {
        LinkConfig {
            service_id,
            characteristic_id,
            max_reconnect_attempts: 4,
            reconnect_delay: Duration::from_millis(3000),
            message_retry_limit: 3,
            chunk_retry_limit: 3,
            write_success_pacing: Duration::from_millis(200),
            write_failure_pacing: Duration::from_millis(400),
            scan_timeout: Duration::from_secs(60),
            release_settle_delay: Duration::from_millis(600),
            max_message_size: 64 * 1024,
        }
    }

    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), BleError> {
        if self.message_retry_limit == 0 {
            return Err(BleError::InvalidArgument("message retry limit must be at least 1".to_string()));
        }
        if self.chunk_retry_limit == 0 {
            return Err(BleError::InvalidArgument("chunk retry limit must be at least 1".to_string()));
        }
        if self.scan_timeout.is_zero() {
            return Err(BleError::InvalidArgument("scan timeout must not be zero".to_string()));
        }
        Ok(())
    }
}

/// Builds a [LinkConfig], enforcing that service and characteristic ids are configured exactly
///  once. All other settings default to the values of [LinkConfig::new].
#[derive(Debug, Default)]
pub struct LinkConfigBuilder {
    ids: Option<(Uuid, Uuid)>,
    max_reconnect_attempts: Option<u32>,
    reconnect_delay: Option<Duration>,
    message_retry_limit: Option<u32>,
    chunk_retry_limit: Option<u32>,
    write_pacing: Option<(Duration, Duration)>,
    scan_timeout: Option<Duration>,
    release_settle_delay: Option<Duration>,
    max_message_size: Option<usize>,
}
impl LinkConfigBuilder {
    pub fn configure(mut self, service_id: &str, characteristic_id: &str) -> Result<Self, BleError> {
        if self.ids.is_some() {
            return Err(BleError::AlreadyConfigured);
        }

        let service_id = parse_id("service", service_id)?;
        let characteristic_id = parse_id("characteristic", characteristic_id)?;
        self.ids = Some((service_id, characteristic_id));
        Ok(self)
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    pub fn message_retry_limit(mut self, limit: u32) -> Self {
        self.message_retry_limit = Some(limit);
        self
    }

    pub fn chunk_retry_limit(mut self, limit: u32) -> Self {
        self.chunk_retry_limit = Some(limit);
        self
    }

    pub fn write_pacing(mut self, after_success: Duration, after_failure: Duration) -> Self {
        self.write_pacing = Some((after_success, after_failure));
        self
    }

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = Some(timeout);
        self
    }

    pub fn release_settle_delay(mut self, delay: Duration) -> Self {
        self.release_settle_delay = Some(delay);
        self
    }

    pub fn max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self
    }

    pub fn build(self) -> Result<LinkConfig, BleError> {
        let (service_id, characteristic_id) = self.ids.ok_or(BleError::NotConfigured)?;

        let mut config = LinkConfig::new(service_id, characteristic_id);
        if let Some(v) = self.max_reconnect_attempts { config.max_reconnect_attempts = v; }
        if let Some(v) = self.reconnect_delay { config.reconnect_delay = v; }
        if let Some(v) = self.message_retry_limit { config.message_retry_limit = v; }
        if let Some(v) = self.chunk_retry_limit { config.chunk_retry_limit = v; }
        if let Some((success, failure)) = self.write_pacing {
            config.write_success_pacing = success;
            config.write_failure_pacing = failure;
        }
        if let Some(v) = self.scan_timeout { config.scan_timeout = v; }
        if let Some(v) = self.release_settle_delay { config.release_settle_delay = v; }
        if let Some(v) = self.max_message_size { config.max_message_size = v; }

        config.validate()?;
        Ok(config)
    }
}

fn parse_id(kind: &str, raw: &str) -> Result<Uuid, BleError> {
    if raw.trim().is_empty() {
        return Err(BleError::InvalidArgument(format!("{} id is empty", kind)));
    }
    Uuid::parse_str(raw.trim())
        .map_err(|e| BleError::InvalidArgument(format!("{} id {:?} is not a valid UUID: {}", kind, raw, e)))
}


#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    const SERVICE: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";
    const CHARACTERISTIC: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

    #[test]
    fn test_defaults() {
        let config = LinkConfig::builder()
            .configure(SERVICE, CHARACTERISTIC).unwrap()
            .build().unwrap();

        assert_eq!(config.service_id, Uuid::parse_str(SERVICE).unwrap());
        assert_eq!(config.characteristic_id, Uuid::parse_str(CHARACTERISTIC).unwrap());
        assert_eq!(config.max_reconnect_attempts, 4);
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.message_retry_limit, 3);
        assert_eq!(config.chunk_retry_limit, 3);
        assert_eq!(config.write_success_pacing, Duration::from_millis(200));
        assert_eq!(config.write_failure_pacing, Duration::from_millis(400));
        assert_eq!(config.scan_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = LinkConfig::builder()
            .configure(SERVICE, CHARACTERISTIC).unwrap()
            .max_reconnect_attempts(7)
            .reconnect_delay(Duration::from_millis(10))
            .write_pacing(Duration::from_millis(1), Duration::from_millis(2))
            .max_message_size(100)
            .build().unwrap();

        assert_eq!(config.max_reconnect_attempts, 7);
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
        assert_eq!(config.write_success_pacing, Duration::from_millis(1));
        assert_eq!(config.write_failure_pacing, Duration::from_millis(2));
        assert_eq!(config.max_message_size, 100);
    }

    #[test]
    fn test_configure_twice() {
        let result = LinkConfig::builder()
            .configure(SERVICE, CHARACTERISTIC).unwrap()
            .configure(SERVICE, CHARACTERISTIC);
        assert_eq!(result.err(), Some(BleError::AlreadyConfigured));
    }

    #[test]
    fn test_not_configured() {
        assert_eq!(LinkConfig::builder().build().err(), Some(BleError::NotConfigured));
    }

    #[rstest]
    #[case::empty_service("", CHARACTERISTIC)]
    #[case::blank_service("  ", CHARACTERISTIC)]
    #[case::empty_characteristic(SERVICE, "")]
    #[case::garbage(SERVICE, "not-a-uuid")]
    fn test_invalid_ids(#[case] service: &str, #[case] characteristic: &str) {
        let result = LinkConfig::builder().configure(service, characteristic);
        assert!(matches!(result, Err(BleError::InvalidArgument(_))));
    }

    #[rstest]
    #[case::message_retries(|b: LinkConfigBuilder| b.message_retry_limit(0))]
    #[case::chunk_retries(|b: LinkConfigBuilder| b.chunk_retry_limit(0))]
    #[case::scan_timeout(|b: LinkConfigBuilder| b.scan_timeout(Duration::ZERO))]
    fn test_validation(#[case] modifier: fn(LinkConfigBuilder) -> LinkConfigBuilder) {
        let builder = LinkConfig::builder()
            .configure(SERVICE, CHARACTERISTIC).unwrap();
        assert!(matches!(modifier(builder).build(), Err(BleError::InvalidArgument(_))));
    }
}
