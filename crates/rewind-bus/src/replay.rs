//! [`ReplayClient`] – a [`PubSubClient`] that plays a recorded log.
//!
//! The first `subscribe` lazily starts one dispatch loop on a dedicated OS
//! thread.  The loop walks the log with the global cursor, sleeps between
//! entries according to [`Pacing`], and pushes every entry with a subscriber
//! onto a channel.  A consumer task on the subscriber's Tokio runtime drains
//! that channel and spawns each callback, so the loop never waits on a
//! handler and handlers never run on the dispatch thread.
//!
//! ```text
//!  dispatch thread                      Tokio runtime
//!  ───────────────                      ─────────────
//!  next_replay() ─▶ sleep(pacing) ─▶ tx ──▶ consumer task ─▶ spawn(callback(payload))
//! ```
//!
//! `close()` is the only cancellation primitive: it raises a stop flag,
//! wakes the loop out of its pacing sleep, joins the thread, clears every
//! subscription and releases the source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rewind_log::ReplaySource;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{Callback, PubSubClient};
use crate::error::BusError;
use crate::pacing::Pacing;

type CallbackMap = Arc<Mutex<HashMap<String, Callback>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One due callback invocation, handed from the dispatch thread to the
/// consumer task.
struct Delivery {
    topic: String,
    payload: Vec<u8>,
    callback: Callback,
}

struct Worker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Replay shim substitutable for any live [`PubSubClient`].
pub struct ReplayClient {
    source: Mutex<Option<Arc<dyn ReplaySource>>>,
    callbacks: CallbackMap,
    live: Option<Arc<dyn PubSubClient>>,
    pacing: Pacing,
    worker: Mutex<Option<Worker>>,
}

impl ReplayClient {
    /// Replay from `source` with default pacing; `publish`/`begin` are no-ops.
    pub fn new(source: impl ReplaySource + 'static) -> Self {
        Self::from_shared(Arc::new(source))
    }

    /// Replay from a source that other code keeps reading too.
    pub fn from_shared(source: Arc<dyn ReplaySource>) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            live: None,
            pacing: Pacing::default(),
            worker: Mutex::new(None),
        }
    }

    /// Forward `publish` and `begin` to `live` (hybrid record-while-replaying).
    pub fn with_live(mut self, live: Arc<dyn PubSubClient>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// `true` while the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    /// Topics that currently have a callback.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = lock(&self.callbacks).keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Register several callbacks, then start the loop.
    ///
    /// Unlike repeated [`subscribe`][PubSubClient::subscribe] calls, no entry
    /// can be dispatched before every topic is registered.  Must be called
    /// from within a Tokio runtime.
    pub fn subscribe_all<I>(&self, subscriptions: I) -> Result<(), BusError>
    where
        I: IntoIterator<Item = (String, Callback)>,
    {
        if lock(&self.source).is_none() {
            return Err(BusError::Closed);
        }
        lock(&self.callbacks).extend(subscriptions);
        self.ensure_started()
    }

    /// Stop the dispatch loop, wait for it to exit, drop every subscription
    /// and release the source.
    ///
    /// No callback is handed off after this returns.  Idempotent.
    pub fn close(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Release);
            worker.thread.thread().unpark();
            if worker.thread.join().is_err() {
                error!("replay dispatch thread panicked");
            }
        }
        lock(&self.callbacks).clear();
        if lock(&self.source).take().is_some() {
            info!("replay client closed");
        }
    }

    /// Start the dispatch loop unless this session already started one.
    fn ensure_started(&self) -> Result<(), BusError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }
        let source = lock(&self.source).clone().ok_or(BusError::Closed)?;
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(consume(rx));

        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name("rewind-dispatch".into())
            .spawn({
                let callbacks = Arc::clone(&self.callbacks);
                let stop = Arc::clone(&stop);
                let pacing = self.pacing;
                move || dispatch_loop(source.as_ref(), &callbacks, &tx, &stop, pacing)
            })?;
        *worker = Some(Worker { stop, thread });
        Ok(())
    }
}

impl Drop for ReplayClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl PubSubClient for ReplayClient {
    async fn subscribe(&self, topic: &str, callback: Callback) -> Result<(), BusError> {
        if lock(&self.source).is_none() {
            return Err(BusError::Closed);
        }
        if lock(&self.callbacks)
            .insert(topic.to_string(), callback)
            .is_some()
        {
            debug!(topic, "replacing replay subscription");
        }
        self.ensure_started()
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        lock(&self.callbacks).remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        match &self.live {
            Some(live) => live.publish(topic, payload).await,
            None => Ok(()),
        }
    }

    async fn begin(&self) -> Result<(), BusError> {
        match &self.live {
            Some(live) => live.begin().await,
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch thread
// ─────────────────────────────────────────────────────────────────────────────

fn dispatch_loop(
    source: &dyn ReplaySource,
    callbacks: &Mutex<HashMap<String, Callback>>,
    tx: &mpsc::UnboundedSender<Delivery>,
    stop: &AtomicBool,
    pacing: Pacing,
) {
    info!("replay dispatch loop started");
    let mut previous = None;
    let mut delivered = 0u64;

    while !stop.load(Ordering::Acquire) {
        let entry = match source.next_replay() {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                info!(delivered, "replay log exhausted");
                return;
            }
            Err(e) if e.entry_id().is_some() => {
                warn!(error = %e, "skipping undecodable entry");
                continue;
            }
            Err(e) => {
                error!(error = %e, "replay source failed, stopping dispatch");
                return;
            }
        };

        let delay = pacing.delay(previous, entry.timestamp);
        previous = Some(entry.timestamp);
        if !sleep_unless_stopped(delay, stop) {
            break;
        }

        let Some(callback) = lock(callbacks).get(&entry.key).cloned() else {
            debug!(topic = %entry.key, id = entry.id, "no subscriber, skipping");
            continue;
        };
        let delivery = Delivery {
            topic: entry.key,
            payload: entry.payload,
            callback,
        };
        match hand_off(tx, delivery) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(error = %e, id = entry.id, "skipping entry"),
        }
    }
    info!(delivered, "replay dispatch loop stopped");
}

/// Submit `delivery` to the consumer task without waiting for it to run.
fn hand_off(tx: &mpsc::UnboundedSender<Delivery>, delivery: Delivery) -> Result<(), BusError> {
    tx.send(delivery)
        .map_err(|mpsc::error::SendError(rejected)| BusError::DispatchRejected {
            topic: rejected.topic,
        })
}

/// Sleep for `delay`, waking early if `stop` is raised.  Returns `false` when
/// stopped.
fn sleep_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::park_timeout(deadline - now);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumer task
// ─────────────────────────────────────────────────────────────────────────────

async fn consume(mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = rx.recv().await {
        debug!(topic = %delivery.topic, bytes = delivery.payload.len(), "delivering replayed message");
        tokio::spawn((delivery.callback)(delivery.payload));
    }
}
