//! Error type shared by every replay log operation.

use std::path::PathBuf;

use rewind_types::CodecError;
use thiserror::Error;

use crate::store::Mode;

/// Errors that can arise while recording or replaying.
///
/// Storage and session-lifecycle errors are never retried; they surface to
/// the caller so a misconfigured session fails loudly instead of replaying
/// nothing.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Cannot open replay log at {}: {reason}", .path.display())]
    StorageOpenFailure { path: PathBuf, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported payload type: {0}")]
    UnsupportedPayloadType(String),

    #[error(transparent)]
    Codec(CodecError),

    /// One row of the log cannot be turned into an [`Entry`][rewind_types::Entry].
    /// The row is skipped; the rest of the log stays readable.
    #[error("Entry {id} under {key:?} has unsupported payload type {data_type:?}")]
    UndecodableEntry {
        id: i64,
        key: String,
        data_type: String,
    },

    #[error("Replay session not initialized")]
    SessionNotInitialized,

    #[error("Replay session is open in {actual} mode, this call needs {expected} mode")]
    WrongMode { expected: Mode, actual: Mode },

    #[error("No replay log found in {}", .0.display())]
    NoReplayFound(PathBuf),
}

impl ReplayError {
    /// Id of the single log row this error is confined to, if any.
    pub fn entry_id(&self) -> Option<i64> {
        match self {
            ReplayError::UndecodableEntry { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl From<CodecError> for ReplayError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnsupportedPayloadType(what) => ReplayError::UnsupportedPayloadType(what),
            other => ReplayError::Codec(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_types::TypeTag;

    #[test]
    fn unsupported_codec_error_keeps_its_class() {
        let err: ReplayError = CodecError::UnsupportedPayloadType("pickle".into()).into();
        assert!(matches!(err, ReplayError::UnsupportedPayloadType(ref s) if s == "pickle"));
    }

    #[test]
    fn other_codec_errors_are_wrapped() {
        let err: ReplayError = CodecError::Malformed {
            tag: TypeTag::Int,
            reason: "short".into(),
        }
        .into();
        assert!(matches!(err, ReplayError::Codec(_)));
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn only_row_errors_carry_an_entry_id() {
        let err = ReplayError::UndecodableEntry {
            id: 7,
            key: "k".into(),
            data_type: "pickle".into(),
        };
        assert_eq!(err.entry_id(), Some(7));
        assert!(err.to_string().contains("pickle"));
        assert_eq!(ReplayError::SessionNotInitialized.entry_id(), None);
    }

    #[test]
    fn display_names_the_path() {
        let err = ReplayError::StorageOpenFailure {
            path: PathBuf::from("/tmp/replays/replay-x.db"),
            reason: "no such file".into(),
        };
        assert!(err.to_string().contains("/tmp/replays/replay-x.db"));
        let err = ReplayError::WrongMode {
            expected: Mode::Read,
            actual: Mode::Write,
        };
        assert!(err.to_string().contains("write mode"));
    }
}
