use thiserror::Error;

/// Errors that are reported synchronously at the call site. Transient link errors are never
///  surfaced this way - they are handled by the retry policies of the sender and the lifecycle
///  manager.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BleError {
    #[error("service and characteristic ids are configured already")]
    AlreadyConfigured,
    #[error("service and characteristic ids were not configured")]
    NotConfigured,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("link is not ready - message dropped")]
    NotReady,
    #[error("message of {len} bytes exceeds the maximum message size of {max} bytes")]
    MessageTooLarge { len: usize, max: usize },
    #[error("session was terminated")]
    SessionClosed,
}

/// Errors parsing a single frame received from the link
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ChunkError {
    #[error("frame is empty, there is no tag byte")]
    EmptyFrame,
    #[error("unknown chunk tag 0x{0:02X}")]
    UnknownTag(u8),
    #[error("chunk body has {len} bytes, maximum is {max}")]
    BodyTooLong { len: usize, max: usize },
}
