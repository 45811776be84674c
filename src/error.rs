use crate::resp::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("key must not be empty")]
    EmptyKey,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("redis error: {0}")]
    Redis(String),
    #[error("unexpected {command} response: {kind}")]
    UnexpectedResponse {
        command: &'static str,
        kind: &'static str,
    },
    #[error("value of {len} bytes does not fit in {capacity} byte buffer")]
    ValueTooLarge { len: usize, capacity: usize },
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the error leaves the transport unusable.
    ///
    /// A failed read or write, a closed socket or an unparseable reply means
    /// the request/response stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionClosed | ClientError::Protocol(_) | ClientError::Io(_)
        )
    }
}
