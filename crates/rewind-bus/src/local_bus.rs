//! In-process, topic-based publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood, one per topic, so
//! every receiver gets every message without a slow one blocking the others.
//! Each [`PubSubClient::subscribe`] spawns a relay task that feeds the topic's
//! channel into the callback, one message at a time and in publish order.
//!
//! [`LocalBus`] is the live client used for hybrid sessions, where a
//! [`ReplayClient`][crate::replay::ReplayClient] replays recorded topics and
//! forwards outgoing traffic to a real bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{Callback, PubSubClient};
use crate::error::BusError;

/// Default channel capacity (number of buffered messages before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared in-process bus.  Clone it cheaply; all clones share the same
/// channels and subscriptions.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    started: AtomicBool,
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    relays: Mutex<HashMap<String, JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LocalBus {
    /// Create a bus whose topic channels buffer `capacity` messages.
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                started: AtomicBool::new(false),
                channels: Mutex::new(HashMap::new()),
                relays: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// A raw receiver for every message published on `topic` from now on.
    pub fn receiver(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender(topic).subscribe()
    }

    /// `true` once [`PubSubClient::begin`] has been called.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        lock(&self.inner.channels)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, relay) in lock(&self.relays).drain() {
            relay.abort();
        }
    }
}

async fn relay(topic: String, mut receiver: broadcast::Receiver<Vec<u8>>, callback: Callback) {
    loop {
        match receiver.recv().await {
            Ok(payload) => callback(payload).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(%topic, lagged_by = n, "local bus subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl PubSubClient for LocalBus {
    async fn subscribe(&self, topic: &str, callback: Callback) -> Result<(), BusError> {
        let receiver = self.receiver(topic);
        let handle = tokio::spawn(relay(topic.to_string(), receiver, callback));
        if let Some(previous) = lock(&self.inner.relays).insert(topic.to_string(), handle) {
            debug!(topic, "replacing local bus subscription");
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        if let Some(relay) = lock(&self.inner.relays).remove(topic) {
            relay.abort();
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if !self.is_started() {
            return Err(BusError::Channel(format!(
                "cannot publish on `{topic}` before begin()"
            )));
        }
        match self.sender(topic).send(payload) {
            Ok(receivers) => debug!(topic, receivers, "published"),
            // No receivers is a normal condition on a bus.
            Err(broadcast::error::SendError(_)) => debug!(topic, "published with no subscribers"),
        }
        Ok(())
    }

    async fn begin(&self) -> Result<(), BusError> {
        if !self.inner.started.swap(true, Ordering::AcqRel) {
            info!("local bus started");
        }
        Ok(())
    }
}
