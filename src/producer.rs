use std::{sync::Arc, time::Duration};

use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::{Broker, Config, Envelope, Message};

/// How a publish task reacts to broker errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        RetryPolicy {
            attempts: config.publish_attempts.max(1),
            backoff: config.retry_backoff,
        }
    }
}

/// Fire-and-forget publisher.
///
/// [`publish`](Producer::publish) seals the message right away, so
/// `occurredAt` is the call time, then hands delivery to a background task and
/// returns. Delivery failures are retried per [`RetryPolicy`] and logged; they
/// never reach the caller. Publishes run concurrently and may land out of
/// order relative to each other.
///
/// Clones share the same set of in-flight tasks.
#[derive(Clone)]
pub struct Producer {
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
    tasks: TaskTracker,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, retry: RetryPolicy) -> Self {
        Self {
            broker,
            retry,
            tasks: TaskTracker::new(),
        }
    }

    /// Publish `message` to `topic` without waiting for delivery.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn publish<M: Message>(&self, message: &M, topic: &str) {
        let message_type = message.label();
        let saga_id = message.meta().saga_id;

        let bytes = match Envelope::seal(message).and_then(|envelope| envelope.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%message_type, %saga_id, error = %e, "Couldn't seal message, dropping it");
                return;
            }
        };

        let broker = self.broker.clone();
        let retry = self.retry;
        let topic = topic.to_string();
        self.tasks.spawn(async move {
            let attempts = retry.attempts.max(1);
            for attempt in 1..=attempts {
                match broker.send(&topic, bytes.clone()).await {
                    Ok(offset) => {
                        debug!(%topic, %message_type, %saga_id, offset, "Published");
                        return;
                    }
                    Err(e) if attempt < attempts => {
                        warn!(%topic, %message_type, %saga_id, attempt, error = %e, "Publish failed, retrying");
                        tokio::time::sleep(retry.backoff).await;
                    }
                    Err(e) => {
                        error!(%topic, %message_type, %saga_id, attempt, error = %e, "Publish failed, message dropped");
                    }
                }
            }
        });
    }

    /// Wait until every publish started so far has finished.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Number of publishes still in flight.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
