//! [`ReplayCamera`] – a camera that plays back recorded frames.
//!
//! Stands in for a live camera during replay: every [`capture`][ReplayCamera::capture]
//! pulls the next entry recorded under the camera's topic and hands the
//! payload to an [`ImageDecoder`].

use rewind_types::{ImageDecoder, ImageFrame};
use tracing::{debug, warn};

use crate::error::ReplayError;
use crate::player::ReplaySource;

/// Replays one camera topic from a [`ReplaySource`].
pub struct ReplayCamera<S, D> {
    source: S,
    decoder: D,
    topic: String,
    follow_global: bool,
}

impl<S: ReplaySource, D: ImageDecoder> ReplayCamera<S, D> {
    /// Camera over `topic`, reading with an ungated keyed cursor.
    pub fn new(source: S, decoder: D, topic: impl Into<String>) -> Self {
        Self {
            source,
            decoder,
            topic: topic.into(),
            follow_global: false,
        }
    }

    /// Only serve frames the global cursor has not passed yet, keeping the
    /// camera in step with a concurrently running dispatch loop.
    pub fn follow_global(mut self, follow: bool) -> Self {
        self.follow_global = follow;
        self
    }

    /// Topic this camera replays.
    pub fn id(&self) -> &str {
        &self.topic
    }

    /// Next recorded frame, or `Ok(None)` once the topic is exhausted.
    pub fn capture(&self) -> Result<Option<ImageFrame>, ReplayError> {
        let Some(entry) = self.source.next_key_replay(&self.topic, self.follow_global)? else {
            warn!(topic = %self.topic, "no more recorded frames");
            return Ok(None);
        };
        let frame = self.decoder.decode(&entry.payload)?;
        debug!(
            topic = %self.topic,
            id = entry.id,
            width = frame.width,
            height = frame.height,
            "replayed frame"
        );
        Ok(Some(frame))
    }
}
