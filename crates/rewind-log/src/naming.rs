//! Replay file naming and `"latest"` resolution.
//!
//! Recordings are named `replay-YYYY-MM-DD_HH-MM-SS.db`.  Every field is
//! zero-padded to a fixed width, so sorting names lexicographically sorts
//! them chronologically; [`find_latest_replay`] relies on that.

use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::error::ReplayError;

/// File-name prefix of every recording.
pub const REPLAY_PREFIX: &str = "replay-";
/// File extension of every recording.
pub const REPLAY_EXTENSION: &str = "db";
/// Fixed-width timestamp layout embedded in recording names.
///
/// Fresh recordings are stamped in UTC; local wall-clock time repeats when
/// DST ends and would break the name ordering.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Name of a recording started at `at`.
pub fn replay_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!(
        "{REPLAY_PREFIX}{}.{REPLAY_EXTENSION}",
        at.format(TIMESTAMP_FORMAT)
    )
}

/// `true` if `name` follows the recording naming convention.
pub fn is_replay_file_name(name: &str) -> bool {
    name.starts_with(REPLAY_PREFIX) && name.ends_with(&format!(".{REPLAY_EXTENSION}"))
}

/// Append `.db` unless `path` already ends in it.
pub fn with_db_extension(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == REPLAY_EXTENSION) {
        return path.to_path_buf();
    }
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(REPLAY_EXTENSION);
    PathBuf::from(raw)
}

/// All recordings in `dir`, oldest first.
pub fn list_replays(dir: &Path) -> Result<Vec<PathBuf>, ReplayError> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_replay_file_name(name))
        .collect();
    names.sort();
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// The most recent recording in `dir`.
///
/// Fails with [`ReplayError::NoReplayFound`] when the directory is missing or
/// holds no recording.
pub fn find_latest_replay(dir: &Path) -> Result<PathBuf, ReplayError> {
    list_replays(dir)
        .ok()
        .and_then(|mut replays| replays.pop())
        .ok_or_else(|| ReplayError::NoReplayFound(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn name_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().unwrap();
        assert_eq!(replay_file_name(&at), "replay-2026-01-02_03-04-05.db");
    }

    #[test]
    fn lexicographic_order_matches_chronological_order() {
        let times = [
            Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).single().unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).single().unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 1, 9, 5, 1).single().unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 1, 10, 0, 0).single().unwrap(),
        ];
        let mut names: Vec<String> = times.iter().map(replay_file_name).collect();
        let chronological = names.clone();
        names.sort();
        assert_eq!(names, chronological);
    }

    #[test]
    fn recognises_replay_names() {
        assert!(is_replay_file_name("replay-2026-01-02_03-04-05.db"));
        assert!(!is_replay_file_name("replay-2026-01-02_03-04-05.db-journal"));
        assert!(!is_replay_file_name("notes.db"));
    }

    #[test]
    fn db_extension_is_added_once() {
        assert_eq!(with_db_extension(Path::new("logs/run")), PathBuf::from("logs/run.db"));
        assert_eq!(with_db_extension(Path::new("logs/run.db")), PathBuf::from("logs/run.db"));
        assert_eq!(with_db_extension(Path::new("run.v2")), PathBuf::from("run.v2.db"));
    }

    #[test]
    fn latest_picks_the_newest_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "replay-2026-03-01_10-00-00.db");
        touch(dir.path(), "replay-2026-10-19_08-30-00.db");
        touch(dir.path(), "replay-2025-12-31_23-59-59.db");
        touch(dir.path(), "scratch.db");
        touch(dir.path(), "replay-zzz.txt");

        let latest = find_latest_replay(dir.path()).unwrap();
        assert_eq!(latest, dir.path().join("replay-2026-10-19_08-30-00.db"));
        assert_eq!(list_replays(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn latest_without_candidates_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "other.db");
        assert!(matches!(
            find_latest_replay(dir.path()),
            Err(ReplayError::NoReplayFound(_))
        ));
        assert!(matches!(
            find_latest_replay(&dir.path().join("missing")),
            Err(ReplayError::NoReplayFound(_))
        ));
    }
}
