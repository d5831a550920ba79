//! In-process bus with broker-like offsets and consumer groups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use crate::bus::{BusRecord, EventPublisher, EventSubscriber};
use crate::{BusError, Result};

#[derive(Debug, Default, Clone, Copy)]
struct GroupCursor {
    /// Next offset to hand out.
    position: usize,
    /// First offset not yet committed.
    committed: usize,
}

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, Vec<BusRecord>>,
    cursors: HashMap<(String, String), GroupCursor>,
    fail_on_publish: bool,
    failing_polls: u32,
}

/// In-memory at-least-once bus.
///
/// Each topic is a single partition. Consumer groups track a delivery
/// position and a committed offset separately, so uncommitted records can
/// be redelivered with [`InMemoryEventBus::restart_group`], mimicking a
/// consumer that crashed before committing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<BusState>>,
    notify: Arc<Notify>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `group` as a subscriber of `topics`.
    pub fn subscriber(&self, group: &str, topics: &[&str]) -> InMemorySubscriber {
        InMemorySubscriber {
            bus: self.clone(),
            group: group.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Everything ever published on `topic`.
    pub async fn published(&self, topic: &str) -> Vec<BusRecord> {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Makes the next `n` polls (from any subscriber) fail with a broker error.
    pub async fn fail_next_polls(&self, n: u32) {
        self.state.write().await.failing_polls = n;
    }

    /// Rewinds every cursor of `group` to its last committed offset.
    pub async fn restart_group(&self, group: &str) {
        let mut state = self.state.write().await;
        for ((g, _), cursor) in state.cursors.iter_mut() {
            if g == group {
                cursor.position = cursor.committed;
            }
        }
    }

    /// Rewinds `group` on `topic` to offset zero, discarding commits.
    pub async fn reset_offsets(&self, group: &str, topic: &str) {
        let mut state = self.state.write().await;
        state
            .cursors
            .insert((group.to_string(), topic.to_string()), GroupCursor::default());
    }

    pub async fn committed_offset(&self, group: &str, topic: &str) -> usize {
        self.state
            .read()
            .await
            .cursors
            .get(&(group.to_string(), topic.to_string()))
            .map(|c| c.committed)
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.fail_on_publish {
                return Err(BusError::Publish("simulated publish failure".to_string()));
            }
            let log = state.topics.entry(topic.to_string()).or_default();
            let offset = log.len() as i64;
            log.push(BusRecord {
                topic: topic.to_string(),
                key: Some(key.to_string()),
                payload,
                partition: 0,
                offset,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

/// One consumer-group member of an [`InMemoryEventBus`].
#[derive(Debug, Clone)]
pub struct InMemorySubscriber {
    bus: InMemoryEventBus,
    group: String,
    topics: Vec<String>,
}

impl InMemorySubscriber {
    async fn take(&self, max: usize) -> Result<Vec<BusRecord>> {
        let mut state = self.bus.state.write().await;
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(BusError::Broker("simulated broker outage".to_string()));
        }

        let mut batch = Vec::new();
        for topic in &self.topics {
            if batch.len() >= max {
                break;
            }
            let log_len = state.topics.get(topic).map(Vec::len).unwrap_or(0);
            let cursor = *state
                .cursors
                .entry((self.group.clone(), topic.clone()))
                .or_default();
            let end = log_len.min(cursor.position + (max - batch.len()));
            if end > cursor.position {
                if let Some(log) = state.topics.get(topic) {
                    batch.extend_from_slice(&log[cursor.position..end]);
                }
                if let Some(c) = state.cursors.get_mut(&(self.group.clone(), topic.clone())) {
                    c.position = end;
                }
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl EventSubscriber for InMemorySubscriber {
    async fn poll(&self, max: usize, timeout: Duration) -> Result<Vec<BusRecord>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.bus.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.take(max).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&self, record: &BusRecord) -> Result<()> {
        let mut state = self.bus.state.write().await;
        let cursor = state
            .cursors
            .get_mut(&(self.group.clone(), record.topic.clone()))
            .ok_or_else(|| BusError::Commit(format!("no cursor for {}", record.topic)))?;
        let next = record.offset as usize + 1;
        if next > cursor.committed {
            cursor.committed = next;
        }
        Ok(())
    }
}
