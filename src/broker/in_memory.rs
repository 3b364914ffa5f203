use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

use super::{Broker, Delivery, Subscription};
use crate::{Error, Result};

/// In-process broker with a single partition per topic.
///
/// Cloning is cheap and every clone shares the same topics, so a producer
/// and a consumer built from clones talk to each other.
///
/// Retention follows the slowest consumer group: once every group that ever
/// joined a topic has committed past a record, the record is dropped. Offsets
/// keep counting from where they were. A topic nobody subscribed to keeps
/// everything.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, Arc<TopicLog>>>>,
}

#[derive(Debug)]
struct TopicLog {
    name: Arc<str>,
    log: RwLock<Records>,
    appended: Notify,
    groups: Mutex<HashMap<String, Group>>,
}

/// Retained records. `base` is the offset of the first one.
#[derive(Debug, Default)]
struct Records {
    base: u64,
    retained: VecDeque<Arc<[u8]>>,
}

impl Records {
    fn end(&self) -> u64 {
        self.base + self.retained.len() as u64
    }

    fn get(&self, offset: u64) -> Option<Arc<[u8]>> {
        let index = offset.checked_sub(self.base)?;
        self.retained.get(index as usize).cloned()
    }

    fn trim_below(&mut self, offset: u64) {
        while self.base < offset && self.retained.pop_front().is_some() {
            self.base += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    committed: u64,
    members: HashSet<Uuid>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn topic(&self, name: &str) -> Arc<TopicLog> {
        self.topics
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(TopicLog {
                    name: Arc::from(name),
                    log: RwLock::new(Records::default()),
                    appended: Notify::new(),
                    groups: Mutex::new(HashMap::new()),
                })
            })
            .clone()
    }

    /// Records of `topic` still retained, oldest first.
    pub async fn records(&self, topic: &str) -> Vec<Arc<[u8]>> {
        let log = self.topic(topic).await;
        let records = log.log.read().await;
        records.retained.iter().cloned().collect()
    }

    /// Number of members currently in `group` on `topic`.
    pub async fn members(&self, topic: &str, group: &str) -> usize {
        let log = self.topic(topic).await;
        let groups = log.groups.lock().await;
        groups.get(group).map_or(0, |g| g.members.len())
    }

    /// Committed position of `group` on `topic`, if the group ever joined.
    pub async fn committed(&self, topic: &str, group: &str) -> Option<u64> {
        let log = self.topic(topic).await;
        let groups = log.groups.lock().await;
        groups.get(group).map(|g| g.committed)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<u64> {
        let log = self.topic(topic).await;
        let offset = {
            let mut records = log.log.write().await;
            records.retained.push_back(payload.into());
            records.end() - 1
        };
        log.appended.notify_waiters();
        Ok(offset)
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        let log = self.topic(topic).await;
        let member = Uuid::new_v4();
        let position = {
            let mut groups = log.groups.lock().await;
            // A new group starts at the oldest retained record.
            let base = log.log.read().await.base;
            let entry = groups.entry(group.to_string()).or_insert_with(|| Group {
                committed: base,
                members: HashSet::new(),
            });
            entry.members.insert(member);
            entry.committed.max(base)
        };
        Ok(Box::new(InMemorySubscription {
            log,
            group: group.to_string(),
            member,
            position,
            closed: false,
        }))
    }
}

struct InMemorySubscription {
    log: Arc<TopicLog>,
    group: String,
    member: Uuid,
    position: u64,
    closed: bool,
}

impl InMemorySubscription {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::SubscriptionClosed(self.log.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn poll(&mut self) -> Result<Delivery> {
        self.ensure_open()?;
        loop {
            // Register interest before looking, so an append between the
            // check and the await still wakes us.
            let appended = self.log.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let next = {
                let records = self.log.log.read().await;
                self.position = self.position.max(records.base);
                records.get(self.position)
            };
            if let Some(payload) = next {
                let offset = self.position;
                self.position += 1;
                return Ok(Delivery {
                    topic: self.log.name.clone(),
                    offset,
                    payload,
                });
            }
            appended.await;
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut groups = self.log.groups.lock().await;
        if let Some(group) = groups.get_mut(&self.group) {
            group.committed = group.committed.max(self.position);
        }
        if let Some(slowest) = groups.values().map(|g| g.committed).min() {
            self.log.log.write().await.trim_below(slowest);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.commit().await?;
        let mut groups = self.log.groups.lock().await;
        if let Some(group) = groups.get_mut(&self.group) {
            group.members.remove(&self.member);
        }
        self.closed = true;
        Ok(())
    }
}
