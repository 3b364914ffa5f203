use std::{future::Future, sync::Arc, time::Duration};

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Broker, Command, Delivery, Envelope, Label, Message, Result};

/// Handles one decoded command.
///
/// Implementations must not fail: every outcome, good or bad, is reported by
/// publishing an event. You can implement `handle` as an `async fn`.
pub trait CommandHandler: Send + Sync + 'static {
    fn handle(&self, command: Command) -> impl Future<Output = ()> + Send;
}

impl<H: CommandHandler> CommandHandler for Arc<H> {
    fn handle(&self, command: Command) -> impl Future<Output = ()> + Send {
        H::handle(self, command)
    }
}

/// Counters reported by [`Consumer::run`] when it returns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Commands passed to the handler.
    pub handled: usize,
    /// Well-formed messages that aren't commands (e.g. events).
    pub skipped: usize,
    /// Messages that couldn't be decoded.
    pub malformed: usize,
    /// Failed polls or commits.
    pub transport_errors: usize,
}

/// Single-reader command loop over one topic.
///
/// Messages are handled one at a time, in the order the broker delivers
/// them, and the group position is committed after each one. Bad messages
/// and broker errors are logged and skipped; only a failure to subscribe or
/// to close stops the loop with an error.
pub struct Consumer<H: CommandHandler> {
    broker: Arc<dyn Broker>,
    handler: H,
    topic: String,
    group: String,
    error_backoff: Duration,
}

impl<H: CommandHandler> Consumer<H> {
    pub fn new(
        broker: Arc<dyn Broker>,
        handler: H,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            handler,
            topic: topic.into(),
            group: group.into(),
            error_backoff: Duration::from_millis(100),
        }
    }

    /// Pause after a failed poll before trying again.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Consume until `cancel_token` is cancelled.
    ///
    /// Cancellation is checked between messages and also interrupts a poll
    /// that is waiting for data. A command already being handled runs to
    /// completion. Before returning, the subscription commits its position
    /// and leaves the group.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<ConsumerStats> {
        let mut subscription = match self.broker.subscribe(&self.topic, &self.group).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(topic = %self.topic, group = %self.group, error = %e, "Couldn't subscribe, consumer not running");
                return Err(e);
            }
        };
        info!(topic = %self.topic, group = %self.group, "Consumer subscribed");

        let mut stats = ConsumerStats::default();
        loop {
            let polled = select! {
                biased;
                _ = cancel_token.cancelled() => break,
                polled = subscription.poll() => polled,
            };

            match polled {
                Ok(delivery) => {
                    self.dispatch(delivery, &mut stats).await;
                    if let Err(e) = subscription.commit().await {
                        stats.transport_errors += 1;
                        warn!(topic = %self.topic, error = %e, "Commit failed");
                    }
                }
                Err(e) => {
                    stats.transport_errors += 1;
                    warn!(topic = %self.topic, error = %e, "Poll failed");
                    select! {
                        _ = cancel_token.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        subscription.close().await?;
        info!(topic = %self.topic, group = %self.group, ?stats, "Consumer left group");
        Ok(stats)
    }

    async fn dispatch(&self, delivery: Delivery, stats: &mut ConsumerStats) {
        let offset = delivery.offset;
        let envelope = match Envelope::from_bytes(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                stats.malformed += 1;
                warn!(topic = %self.topic, offset, error = %e, "Malformed envelope, skipping");
                return;
            }
        };

        let message_type = envelope.message_type.clone();
        match Command::decode(envelope) {
            Ok(Some(command)) => {
                debug!(
                    topic = %self.topic,
                    offset,
                    message_type = %command.label(),
                    saga_id = %command.meta().saga_id,
                    "Handling command"
                );
                self.handler.handle(command).await;
                stats.handled += 1;
            }
            Ok(None) => {
                stats.skipped += 1;
                debug!(topic = %self.topic, offset, %message_type, "Not a command, skipping");
            }
            Err(e) => {
                stats.malformed += 1;
                warn!(topic = %self.topic, offset, %message_type, error = %e, "Undecodable command, skipping");
            }
        }
    }
}
