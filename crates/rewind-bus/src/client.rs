//! The pub/sub client contract.
//!
//! Everything that delivers topic messages to asynchronous handlers, whether
//! a live bus or a recorded log, implements [`PubSubClient`].  Consumers hold
//! an `Arc<dyn PubSubClient>` and never learn which one they got.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::BusError;

/// An asynchronous message handler.
///
/// Handlers must return a future, so a synchronous function can never be
/// registered by mistake.
pub type Callback = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Box an `async` closure into a [`Callback`].
///
/// ```rust
/// let cb = rewind_bus::callback(|payload: Vec<u8>| async move {
///     println!("{} bytes", payload.len());
/// });
/// # let _ = cb;
/// ```
pub fn callback<F, Fut>(handler: F) -> Callback
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| handler(payload).boxed())
}

/// Topic-based publish/subscribe client.
///
/// # Contract
///
/// * `subscribe` – route every message on `topic` to `callback`.  A topic has
///   at most one callback; subscribing again replaces it.
/// * `unsubscribe` – stop routing `topic`.  Messages already handed to the
///   callback are not retracted.
/// * `publish` – send `payload` on `topic`.
/// * `begin` – start the client's I/O.  Must precede `publish` on live
///   clients.
#[async_trait]
pub trait PubSubClient: Send + Sync {
    async fn subscribe(&self, topic: &str, callback: Callback) -> Result<(), BusError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn begin(&self) -> Result<(), BusError>;
}
