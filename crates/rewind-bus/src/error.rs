use rewind_log::ReplayError;
use thiserror::Error;

/// Errors raised on the pub/sub seam.
#[derive(Error, Debug)]
pub enum BusError {
    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("Channel error: {0}")]
    Channel(String),

    /// The consumer-side executor refused a callback hand-off.  The entry is
    /// skipped and dispatch continues.
    #[error("Dispatch rejected for topic `{topic}`: consumer task is gone")]
    DispatchRejected { topic: String },

    #[error("No Tokio runtime available to run subscriber callbacks")]
    NoRuntime,

    #[error("Replay client is closed")]
    Closed,

    #[error("Cannot start dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
}
