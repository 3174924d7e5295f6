//! Session lifecycle and the process-wide convenience API.
//!
//! A [`Session`] owns exactly one log handle: a [`Recorder`] in write mode or
//! a [`Player`] in read mode.  Lifecycle is explicit: open → use → close.
//!
//! [`SessionSlot`] is a guarded optional holder for one session.  Any number
//! of independent slots can exist (tests create their own); one lives in a
//! `static` and backs the free functions [`init_replay_recorder`],
//! [`record_output`], [`record_image`], [`get_next_replay`],
//! [`get_next_key_replay`] and [`close`].  Calling a read or write operation
//! on an empty slot fails with [`ReplayError::SessionNotInitialized`].
//!
//! # Example
//!
//! ```rust
//! use rewind_log::{Mode, ReplayTarget, SessionSlot};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let slot = SessionSlot::new();
//!
//! slot.init(ReplayTarget::from("run"), Mode::Write, dir.path()).unwrap();
//! slot.record_output("topic1", "hello").unwrap();
//! slot.close().unwrap();
//!
//! slot.init(ReplayTarget::from("run"), Mode::Read, dir.path()).unwrap();
//! let entry = slot.get_next_replay().unwrap().unwrap();
//! assert_eq!(entry.payload, b"hello");
//! slot.close().unwrap();
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rewind_types::{Entry, ImageEncoder, ImageFrame, ImageOptions, RecordValue};
use tracing::{info, warn};

use crate::error::ReplayError;
use crate::naming::{find_latest_replay, replay_file_name, with_db_extension};
use crate::player::{Player, ReplaySource};
use crate::recorder::{RecordSink, Recorder};
use crate::store::Mode;

// ─────────────────────────────────────────────────────────────────────────────
// ReplayTarget
// ─────────────────────────────────────────────────────────────────────────────

/// Which log a session should open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplayTarget {
    /// The newest recording in the folder (read mode).  In write mode a
    /// fresh timestamped recording is created instead.
    Latest,
    /// A new `replay-<timestamp>.db` in the folder.
    #[default]
    Fresh,
    /// An explicit path, resolved against the folder unless absolute.
    Path(PathBuf),
}

impl From<&str> for ReplayTarget {
    fn from(s: &str) -> Self {
        if s == "latest" {
            ReplayTarget::Latest
        } else {
            ReplayTarget::Path(PathBuf::from(s))
        }
    }
}

impl From<PathBuf> for ReplayTarget {
    fn from(p: PathBuf) -> Self {
        ReplayTarget::Path(p)
    }
}

impl From<&Path> for ReplayTarget {
    fn from(p: &Path) -> Self {
        ReplayTarget::Path(p.to_path_buf())
    }
}

impl ReplayTarget {
    /// Resolve to the concrete log file for `mode` inside `folder`.
    pub fn resolve(&self, mode: Mode, folder: &Path) -> Result<PathBuf, ReplayError> {
        match (self, mode) {
            (ReplayTarget::Latest, Mode::Read) => find_latest_replay(folder),
            (ReplayTarget::Latest, Mode::Write) | (ReplayTarget::Fresh, _) => {
                Ok(folder.join(replay_file_name(&Utc::now())))
            }
            (ReplayTarget::Path(path), _) => Ok(with_db_extension(&folder.join(path))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// An open replay log in either direction.
pub enum Session {
    Recording(Recorder),
    Playing(Player),
}

impl Session {
    /// Open `path` as a recorder ([`Mode::Write`]) or player ([`Mode::Read`]).
    pub fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self, ReplayError> {
        Ok(match mode {
            Mode::Write => Session::Recording(Recorder::create(path)?),
            Mode::Read => Session::Playing(Player::open(path)?),
        })
    }

    /// Direction of this session.
    pub fn mode(&self) -> Mode {
        match self {
            Session::Recording(_) => Mode::Write,
            Session::Playing(_) => Mode::Read,
        }
    }

    /// File backing this session.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Session::Recording(rec) => rec.store().path(),
            Session::Playing(player) => player.path(),
        }
    }

    fn recorder(&self) -> Result<&Recorder, ReplayError> {
        match self {
            Session::Recording(rec) => Ok(rec),
            Session::Playing(_) => Err(ReplayError::WrongMode {
                expected: Mode::Write,
                actual: Mode::Read,
            }),
        }
    }

    fn player(&mut self) -> Result<&mut Player, ReplayError> {
        match self {
            Session::Playing(player) => Ok(player),
            Session::Recording(_) => Err(ReplayError::WrongMode {
                expected: Mode::Read,
                actual: Mode::Write,
            }),
        }
    }

    /// See [`Recorder::record_output`].
    pub fn record_output(&self, key: &str, value: impl Into<RecordValue>) -> Result<(), ReplayError> {
        self.recorder()?.record_output(key, value)
    }

    /// Encode `frame` with the camera collaborator and record the result as a
    /// serialized message.
    pub fn record_image(
        &self,
        key: &str,
        encoder: &dyn ImageEncoder,
        frame: &ImageFrame,
        options: ImageOptions,
    ) -> Result<(), ReplayError> {
        let recorder = self.recorder()?;
        let payload = encoder.encode(frame, options)?;
        recorder.record_output(key, RecordValue::Serialized(payload))
    }

    /// See [`Player::get_next_replay`].
    pub fn get_next_replay(&mut self) -> Result<Option<Entry>, ReplayError> {
        self.player()?.get_next_replay()
    }

    /// See [`Player::get_next_key_replay`].
    pub fn get_next_key_replay(
        &mut self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        self.player()?.get_next_key_replay(key, follow_global)
    }

    /// Release the log handle.
    pub fn close(self) -> Result<(), ReplayError> {
        match self {
            Session::Recording(rec) => rec.close(),
            Session::Playing(player) => player.close(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionSlot
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe holder for at most one [`Session`].
#[derive(Default)]
pub struct SessionSlot {
    inner: Mutex<Option<Session>>,
}

impl SessionSlot {
    /// An empty slot.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<R, ReplayError>,
    ) -> Result<R, ReplayError> {
        match self.lock().as_mut() {
            Some(session) => f(session),
            None => Err(ReplayError::SessionNotInitialized),
        }
    }

    /// Resolve `target` inside `folder`, open it in `mode`, and install the
    /// session, closing any session the slot already held.
    ///
    /// Returns the resolved log path.
    pub fn init(
        &self,
        target: impl Into<ReplayTarget>,
        mode: Mode,
        folder: impl AsRef<Path>,
    ) -> Result<PathBuf, ReplayError> {
        let target: ReplayTarget = target.into();
        let path = target.resolve(mode, folder.as_ref())?;
        let session = Session::open(&path, mode)?;
        self.install(session)?;
        let shown = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
        info!(path = %shown.display(), %mode, "initialized replay session");
        Ok(path)
    }

    /// Install an already opened session, closing the previous one.
    pub fn install(&self, session: Session) -> Result<(), ReplayError> {
        let previous = self.lock().replace(session);
        if let Some(previous) = previous {
            warn!("replacing an active replay session");
            previous.close()?;
        }
        Ok(())
    }

    /// `true` while a session is installed.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Mode of the installed session.
    pub fn mode(&self) -> Option<Mode> {
        self.lock().as_ref().map(Session::mode)
    }

    /// See [`Session::record_output`].
    pub fn record_output(&self, key: &str, value: impl Into<RecordValue>) -> Result<(), ReplayError> {
        let value = value.into();
        self.with_session(|s| s.record_output(key, value))
    }

    /// See [`Session::record_image`].
    pub fn record_image(
        &self,
        key: &str,
        encoder: &dyn ImageEncoder,
        frame: &ImageFrame,
        options: ImageOptions,
    ) -> Result<(), ReplayError> {
        self.with_session(|s| s.record_image(key, encoder, frame, options))
    }

    /// See [`Session::get_next_replay`].
    pub fn get_next_replay(&self) -> Result<Option<Entry>, ReplayError> {
        self.with_session(Session::get_next_replay)
    }

    /// See [`Session::get_next_key_replay`].
    pub fn get_next_key_replay(
        &self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        self.with_session(|s| s.get_next_key_replay(key, follow_global))
    }

    /// Close and remove the installed session.  No-op on an empty slot.
    pub fn close(&self) -> Result<(), ReplayError> {
        let session = self.lock().take();
        match session {
            Some(session) => {
                info!(mode = %session.mode(), "closing replay session");
                session.close()
            }
            None => Ok(()),
        }
    }
}

impl ReplaySource for SessionSlot {
    fn next_replay(&self) -> Result<Option<Entry>, ReplayError> {
        self.get_next_replay()
    }

    fn next_key_replay(
        &self,
        key: &str,
        follow_global: bool,
    ) -> Result<Option<Entry>, ReplayError> {
        self.get_next_key_replay(key, follow_global)
    }
}

impl RecordSink for SessionSlot {
    fn record(&self, key: &str, value: RecordValue) -> Result<(), ReplayError> {
        self.record_output(key, value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-wide slot
// ─────────────────────────────────────────────────────────────────────────────

static GLOBAL_SESSION: SessionSlot = SessionSlot::new();

/// The process-wide session slot behind the free functions below.
pub fn global() -> &'static SessionSlot {
    &GLOBAL_SESSION
}

/// Open the process-wide session.  See [`SessionSlot::init`].
pub fn init_replay_recorder(
    target: impl Into<ReplayTarget>,
    mode: Mode,
    folder: impl AsRef<Path>,
) -> Result<PathBuf, ReplayError> {
    global().init(target, mode, folder)
}

/// Record into the process-wide session.
pub fn record_output(key: &str, value: impl Into<RecordValue>) -> Result<(), ReplayError> {
    global().record_output(key, value)
}

/// Record an encoded camera frame into the process-wide session.
pub fn record_image(
    key: &str,
    encoder: &dyn ImageEncoder,
    frame: &ImageFrame,
    options: ImageOptions,
) -> Result<(), ReplayError> {
    global().record_image(key, encoder, frame, options)
}

/// Next entry in global order from the process-wide session.
pub fn get_next_replay() -> Result<Option<Entry>, ReplayError> {
    global().get_next_replay()
}

/// Next entry for `key` from the process-wide session (ungated).
pub fn get_next_key_replay(key: &str) -> Result<Option<Entry>, ReplayError> {
    global().get_next_key_replay(key, false)
}

/// Close the process-wide session.
pub fn close() -> Result<(), ReplayError> {
    global().close()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
