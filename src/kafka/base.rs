use crate::conf::KnepConfigError;

use std::time::Duration;

use rdkafka::error::KafkaError;

/// How long a message fetch collects records before returning what it has.
pub const FETCH_DEADLINE: Duration = Duration::from_millis(5000);
/// Bound on metadata requests made through an administrative session.
pub const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on waiting for a produced record to be acknowledged.
pub const PRODUCE_TIMEOUT: Duration = Duration::from_secs(30);
/// Number of records fetched when the caller does not say.
pub const DEFAULT_FETCH_LIMIT: usize = 50;

/// Broad class of a gateway failure, used at the boundary to choose how the
/// failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Config,
    Connection,
    Validation,
}

#[derive(Debug, thiserror::Error)]
pub enum KafkaGatewayError {
    #[error("{0}")]
    Auth(String),
    #[error(transparent)]
    Config(#[from] KnepConfigError),
    #[error("{0}")]
    Connection(#[from] KafkaError),
    #[error("kafka session task failed: {0}")]
    Session(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Validation(String),
}

impl KafkaGatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) | Self::Session(_) => ErrorKind::Connection,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}
