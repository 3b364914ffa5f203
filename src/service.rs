use std::sync::Arc;

use axum::Router;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    Broker, Config, Consumer, ConsumerStats, Error, MethodCommandHandler, MethodRepository,
    Producer, Result, RetryPolicy,
    http::{self, AppState},
};

/// Owns the consumer task and the producer, and runs the shutdown sequence.
///
/// - Build with `new(config, broker, repository)`.
/// - `start()` spawns the command consumer.
/// - `router()` gives the HTTP boundary, wired to the same producer.
/// - `stop()` cancels the consumer, waits for it to leave its group, then
///   waits for every in-flight publish.
pub struct Service {
    config: Config,
    broker: Arc<dyn Broker>,
    repository: Arc<dyn MethodRepository>,
    producer: Producer,
    tasks: JoinSet<Result<ConsumerStats>>,
    cancel_token: CancellationToken,
    started: bool,
}

impl Service {
    pub fn new(
        config: Config,
        broker: Arc<dyn Broker>,
        repository: Arc<dyn MethodRepository>,
    ) -> Self {
        let producer = Producer::new(broker.clone(), RetryPolicy::from(&config));
        Self {
            config,
            broker,
            repository,
            producer,
            tasks: JoinSet::new(),
            cancel_token: CancellationToken::new(),
            started: false,
        }
    }

    /// Publisher shared by the HTTP boundary and the command handler.
    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn router(&self) -> Router {
        http::router(AppState::new(
            self.producer.clone(),
            self.config.methods_topic.as_str(),
        ))
    }

    /// Spawn the command consumer. Fails if called twice.
    pub fn start(&mut self) -> Result {
        if self.started {
            return Err(Error::ServiceAlreadyStarted);
        }
        self.started = true;

        let handler = MethodCommandHandler::new(
            self.repository.clone(),
            self.producer.clone(),
            self.config.methods_topic.as_str(),
        );
        let consumer = Consumer::new(
            self.broker.clone(),
            handler,
            self.config.methods_topic.as_str(),
            self.config.consumer_group.as_str(),
        )
        .with_error_backoff(self.config.retry_backoff);

        self.tasks.spawn(consumer.run(self.cancel_token.clone()));
        info!(
            topic = %self.config.methods_topic,
            group = %self.config.consumer_group,
            "Service started"
        );
        Ok(())
    }

    /// Request a graceful shutdown and wait for it to complete.
    ///
    /// Returns what the consumer saw while it ran. Publishes started before
    /// this call, including events for commands handled during shutdown, are
    /// delivered (or given up on) before it returns, even when the consumer
    /// task failed; that failure is returned afterwards.
    pub async fn stop(&mut self) -> Result<ConsumerStats> {
        self.cancel_token.cancel();

        let mut stats = ConsumerStats::default();
        let mut failure = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined.map_err(Error::from).and_then(|run| run) {
                Ok(run) => {
                    stats.handled += run.handled;
                    stats.skipped += run.skipped;
                    stats.malformed += run.malformed;
                    stats.transport_errors += run.transport_errors;
                }
                Err(e) => {
                    error!(error = %e, "Consumer task failed");
                    failure.get_or_insert(e);
                }
            }
        }

        // Requests already answered with 202 still get their publish.
        self.producer.flush().await;
        match failure {
            Some(e) => Err(e),
            None => {
                info!(?stats, "Service stopped");
                Ok(stats)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Command, DeleteMethod, InMemoryBroker, InMemoryMethodRepository, Meta, Subscription,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    /// Refuses every subscription; sends are slow but succeed.
    struct NoGroupsBroker {
        inner: InMemoryBroker,
    }

    #[async_trait]
    impl Broker for NoGroupsBroker {
        async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<u64> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.send(topic, payload).await
        }

        async fn subscribe(&self, _topic: &str, _group: &str) -> Result<Box<dyn Subscription>> {
            Err(Error::broker("group coordinator unavailable"))
        }
    }

    fn service(broker: &InMemoryBroker) -> Service {
        Service::new(
            Config::default(),
            Arc::new(broker.clone()),
            Arc::new(InMemoryMethodRepository::new()),
        )
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let broker = InMemoryBroker::new();
        let mut service = service(&broker);
        service.start().unwrap();
        assert!(matches!(service.start(), Err(Error::ServiceAlreadyStarted)));
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_leaves_consumer_group() {
        let broker = InMemoryBroker::new();
        let mut service = service(&broker);
        service.start().unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while broker
                .members("methods", "methods-microservice-consumer")
                .await
                == 0
            {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let stats = service.stop().await.unwrap();
        assert_eq!(stats, ConsumerStats::default());
        assert_eq!(
            broker
                .members("methods", "methods-microservice-consumer")
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let broker = InMemoryBroker::new();
        let mut service = service(&broker);
        assert_eq!(service.stop().await.unwrap(), ConsumerStats::default());
    }

    #[tokio::test]
    async fn test_stop_flushes_publishes_when_consumer_failed() {
        let inner = InMemoryBroker::new();
        let mut service = Service::new(
            Config::default(),
            Arc::new(NoGroupsBroker {
                inner: inner.clone(),
            }),
            Arc::new(InMemoryMethodRepository::new()),
        );
        service.start().unwrap();

        let command = Command::DeleteMethod(DeleteMethod {
            id: 1,
            meta: Meta::new(1),
        });
        service.producer().publish(&command, "methods");

        let stopped = service.stop().await;
        assert!(matches!(stopped, Err(Error::Broker(_))));
        assert_eq!(service.producer().in_flight(), 0);
        assert_eq!(inner.records("methods").await.len(), 1);
    }
}
