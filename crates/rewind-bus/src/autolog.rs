//! Capture decorator for asynchronous message handlers.
//!
//! [`Autolog`] wraps a handler `f(payload) -> T` so every payload it sees is
//! also recorded, under each configured topic, after the handler returns.
//! The handler's signature and result are untouched, which lets production
//! handlers be instrumented for later replay.
//!
//! ```rust,no_run
//! # async fn demo(session: &'static rewind_log::SessionSlot) {
//! use rewind_bus::Autolog;
//!
//! let handler = Autolog::new(session, ["camera/front"])
//!     .wrap(|payload: Vec<u8>| async move { payload.len() });
//! let seen = handler.call(b"frame".to_vec()).await;
//! assert_eq!(seen, 5);
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use rewind_log::{RecordSink, ReplayError};
use rewind_types::RecordValue;
use tracing::warn;

use crate::client::Callback;
use crate::error::BusError;

/// Recording configuration shared by every handler it wraps.
pub struct Autolog<S> {
    sink: S,
    topics: Vec<String>,
    enabled: bool,
}

impl<S: RecordSink> Autolog<S> {
    /// Record into `sink` under every name in `topics`.  Enabled by default.
    pub fn new<I, T>(sink: S, topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            sink,
            topics: topics.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    /// Turn recording on or off without unwrapping handlers.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Decorate `handler`.
    pub fn wrap<F>(self, handler: F) -> Logged<S, F> {
        Logged {
            autolog: self,
            handler,
        }
    }

    fn record(&self, payload: &[u8]) -> Result<(), ReplayError> {
        if !self.enabled {
            return Ok(());
        }
        for topic in &self.topics {
            self.sink.record(topic, RecordValue::Bytes(payload.to_vec()))?;
        }
        Ok(())
    }
}

/// A handler decorated by [`Autolog::wrap`].
pub struct Logged<S, F> {
    autolog: Autolog<S>,
    handler: F,
}

impl<S, F, Fut> Logged<S, F>
where
    S: RecordSink,
    F: Fn(Vec<u8>) -> Fut,
    Fut: Future,
{
    /// Run the handler, then record the original payload.
    ///
    /// A recording failure is logged and does not affect the handler's
    /// result.
    pub async fn call(&self, payload: Vec<u8>) -> Fut::Output {
        let result = (self.handler)(payload.clone()).await;
        if let Err(e) = self.autolog.record(&payload) {
            warn!(error = %e, topics = ?self.autolog.topics, "autolog failed to record payload");
        }
        result
    }

    /// Like [`call`][Self::call], but a recording failure is returned.
    pub async fn try_call(&self, payload: Vec<u8>) -> Result<Fut::Output, BusError> {
        let result = (self.handler)(payload.clone()).await;
        self.autolog.record(&payload)?;
        Ok(result)
    }
}

impl<S, F, Fut> Logged<S, F>
where
    S: RecordSink + 'static,
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Turn the decorated handler into a subscription [`Callback`].
    pub fn into_callback(self) -> Callback {
        let this = Arc::new(self);
        Arc::new(move |payload| {
            let this = Arc::clone(&this);
            async move { this.call(payload).await }.boxed()
        })
    }
}
