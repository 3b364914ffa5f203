//! Broker boundary.
//!
//! The service talks to its message broker only through [`Broker`] and
//! [`Subscription`]. [`InMemoryBroker`] implements both in-process: one
//! append-only log per topic, consumer groups with committed positions, and
//! group membership. A networked broker client plugs in behind the same traits.

mod in_memory;

pub use in_memory::InMemoryBroker;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// A raw record pulled from a topic.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: Arc<str>,
    pub offset: u64,
    pub payload: Arc<[u8]>,
}

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Append a record to `topic` and return its offset.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<u64>;

    /// Join `group` on `topic`. Reading resumes from the group's committed
    /// position, or from the start of the topic for a new group.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>>;
}

/// One member's view of a topic within a consumer group.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next record.
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// record and leaves the subscription usable.
    async fn poll(&mut self) -> Result<Delivery>;

    /// Store the position after the last polled record for the group.
    async fn commit(&mut self) -> Result<()>;

    /// Commit and leave the group. Further calls fail.
    async fn close(&mut self) -> Result<()>;
}
