//! Reads/writes `~/.rewind/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rewind_bus::Pacing;
use rewind_bus::pacing::DEFAULT_MAX_GAP;

/// Persisted user configuration stored in `~/.rewind/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `replay-*.db` recordings.
    #[serde(default = "default_replay_folder")]
    pub replay_folder: PathBuf,

    /// Recorded gaps at or above this many seconds are not reproduced.
    #[serde(default = "default_max_gap_secs")]
    pub max_gap_secs: f64,

    /// Delay used in place of an implausible recorded gap.
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
}

fn default_replay_folder() -> PathBuf {
    PathBuf::from("replays")
}
fn default_max_gap_secs() -> f64 {
    10.0
}
fn default_fallback_interval_ms() -> u64 {
    25
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replay_folder: default_replay_folder(),
            max_gap_secs: default_max_gap_secs(),
            fallback_interval_ms: default_fallback_interval_ms(),
        }
    }
}

impl Config {
    /// Dispatch-loop pacing described by this config.
    ///
    /// A `max_gap_secs` that is not a positive, representable duration falls
    /// back to the default.
    pub fn pacing(&self) -> Pacing {
        let max_gap = gap_duration(self.max_gap_secs).unwrap_or(DEFAULT_MAX_GAP);
        Pacing::new(max_gap, Duration::from_millis(self.fallback_interval_ms))
    }
}

/// `secs` as a non-zero [`Duration`], or `None` for NaN, infinite, negative,
/// zero and overflowing values.
fn gap_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

/// Return the path to `~/.rewind/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rewind").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// The on-disk config, or defaults when there is none, with environment
/// overrides applied either way.
pub fn load_or_default() -> Result<Config, String> {
    let mut cfg = load()?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `REWIND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REWIND_REPLAY_FOLDER` | `replay_folder` |
/// | `REWIND_MAX_GAP_SECS` | `max_gap_secs` |
/// | `REWIND_FALLBACK_MS` | `fallback_interval_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("REWIND_REPLAY_FOLDER") {
        cfg.replay_folder = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("REWIND_MAX_GAP_SECS")
        && let Ok(secs) = v.parse::<f64>()
        && gap_duration(secs).is_some()
    {
        cfg.max_gap_secs = secs;
    }
    if let Ok(v) = std::env::var("REWIND_FALLBACK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.fallback_interval_ms = ms;
    }
}

/// Save the config to disk, creating `~/.rewind/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
