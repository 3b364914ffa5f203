use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't encode or decode the envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(Arc<str>),

    #[error("Subscription to '{0}' has already been closed")]
    SubscriptionClosed(Arc<str>),

    #[error("Consumer task join error: {0}")]
    ConsumerJoinError(#[from] tokio::task::JoinError),

    #[error("Service has already started.")]
    ServiceAlreadyStarted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Error {
    pub fn broker<M: Into<Arc<str>>>(message: M) -> Self {
        Error::Broker(message.into())
    }
}
