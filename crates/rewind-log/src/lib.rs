//! `rewind-log` – the replay log.
//!
//! Persists every recorded message into an ordered, typed SQLite log and
//! reads it back through two independent cursors.
//!
//! # Modules
//!
//! - [`store`] – [`EntryStore`][store::EntryStore]: file-backed ordered table
//!   of entries.  Pure storage, no policy.
//! - [`recorder`] – [`Recorder`][recorder::Recorder]: encodes a
//!   [`RecordValue`][rewind_types::RecordValue] and appends it with the
//!   current wall-clock time.
//! - [`player`] – [`Player`][player::Player]: a global cursor plus per-key
//!   cursors over the same log.
//! - [`naming`] – timestamped file names and `"latest"` resolution.
//! - [`session`] – [`Session`][session::Session] lifecycle and the guarded
//!   process-wide [`SessionSlot`][session::SessionSlot].
//! - [`camera`] – [`ReplayCamera`][camera::ReplayCamera]: serves recorded
//!   frames of one camera topic through an image decoder.

pub mod camera;
pub mod error;
pub mod naming;
pub mod player;
pub mod recorder;
pub mod session;
pub mod store;

pub use camera::ReplayCamera;
pub use error::ReplayError;
pub use naming::{find_latest_replay, list_replays, replay_file_name};
pub use player::{Player, ReplaySource};
pub use recorder::{RecordSink, Recorder};
pub use session::{
    ReplayTarget, Session, SessionSlot, close, get_next_key_replay, get_next_replay, global,
    init_replay_recorder, record_image, record_output,
};
pub use store::{EntryStore, Mode};
