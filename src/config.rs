use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use crate::{Error, Result};

/// Runtime configuration for the service.
///
/// Use the builder methods to customize, [`Default`] for local development,
/// or [`Config::from_env`] in deployments.
///
/// # Examples
///
/// ```rust
/// use methods::Config;
///
/// let config = Config::default()
///     .with_methods_topic("methods-staging")
///     .with_publish_attempts(5);
/// assert_eq!(config.methods_topic, "methods-staging");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Topic carrying both commands and events.
    /// Default: `methods`
    pub methods_topic: String,

    /// Consumer group the command consumer joins.
    /// Default: `methods-microservice-consumer`
    pub consumer_group: String,

    /// Address the HTTP boundary binds to.
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// How many times a publish is attempted before the message is dropped.
    /// Default: 3
    pub publish_attempts: u32,

    /// Pause between publish attempts, and between polls after a broker error.
    /// Default: 100 ms
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            methods_topic: "methods".to_string(),
            consumer_group: "methods-microservice-consumer".to_string(),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            publish_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `METHODS_TOPIC`, `METHODS_CONSUMER_GROUP`,
    /// `METHODS_HTTP_ADDR`, `METHODS_PUBLISH_ATTEMPTS`, `METHODS_RETRY_BACKOFF_MS`.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        Config {
            methods_topic: env::var("METHODS_TOPIC").unwrap_or(defaults.methods_topic),
            consumer_group: env::var("METHODS_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            http_addr: parse_env("METHODS_HTTP_ADDR")?.unwrap_or(defaults.http_addr),
            publish_attempts: parse_env("METHODS_PUBLISH_ATTEMPTS")?
                .unwrap_or(defaults.publish_attempts),
            retry_backoff: parse_env("METHODS_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
        }
        .validated()
    }

    pub fn with_methods_topic(mut self, topic: impl Into<String>) -> Self {
        self.methods_topic = topic.into();
        self
    }

    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    pub fn with_http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Set the number of publish attempts. Values below 1 are treated as 1.
    pub fn with_publish_attempts(mut self, attempts: u32) -> Self {
        self.publish_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn validated(self) -> Result<Self> {
        if self.methods_topic.trim().is_empty() {
            return Err(Error::Config("METHODS_TOPIC must not be empty".into()));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(Error::Config("METHODS_CONSUMER_GROUP must not be empty".into()));
        }
        if self.publish_attempts == 0 {
            return Err(Error::Config("METHODS_PUBLISH_ATTEMPTS must be at least 1".into()));
        }
        Ok(self)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        Err(_) => Ok(None),
    }
}
