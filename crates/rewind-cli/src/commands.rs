//! Implementations of the `rewind` subcommands.
//!
//! Each command writes to the given writer instead of stdout so it can be
//! exercised from tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use colored::Colorize;
use rewind_bus::{Pacing, PubSubClient, ReplayClient, callback};
use rewind_log::{Mode, Player, ReplayError, ReplayTarget, list_replays};
use rewind_types::{Entry, TypeTag};
use serde_json::{Value, json};
use tracing::{info, warn};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

const PREVIEW_CHARS: usize = 60;
const PREVIEW_BYTES: usize = 16;

/// Resolve a command-line log argument.
///
/// `latest` picks the newest recording in `folder`; an existing file is used
/// as given; anything else is looked up inside `folder`.
pub fn resolve_log(target: &str, folder: &Path) -> Result<PathBuf, ReplayError> {
    let direct = Path::new(target);
    if target != "latest" && direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    ReplayTarget::from(target).resolve(Mode::Read, folder)
}

// ─────────────────────────────────────────────────────────────────────────────
// list
// ─────────────────────────────────────────────────────────────────────────────

pub fn list(folder: &Path, out: &mut impl Write) -> CliResult {
    if !folder.is_dir() {
        writeln!(out, "No replay folder at {}", folder.display())?;
        return Ok(());
    }
    let replays = list_replays(folder)?;
    if replays.is_empty() {
        writeln!(out, "No recordings in {}", folder.display())?;
        return Ok(());
    }
    writeln!(out, "{}", format!("Recordings in {}", folder.display()).bold())?;
    for path in replays {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match Player::open(&path).and_then(|p| p.len()) {
            Ok(entries) => writeln!(out, "  {name}  {entries} entries")?,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable recording");
                writeln!(out, "  {name}  {}", "unreadable".red())?
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// inspect
// ─────────────────────────────────────────────────────────────────────────────

pub fn inspect(path: &Path, out: &mut impl Write) -> CliResult {
    let player = Player::open(path)?;
    writeln!(out, "{}", path.display().to_string().bold())?;
    writeln!(out, "  entries: {}", player.len()?)?;
    if let Some((first, last)) = player.time_span()? {
        writeln!(out, "  from:    {}", format_time(first))?;
        writeln!(out, "  to:      {}", format_time(last))?;
        writeln!(out, "  span:    {:.3}s", last - first)?;
    }
    let keys = player.key_counts()?;
    if !keys.is_empty() {
        writeln!(out, "  keys:")?;
        let width = keys.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, count) in keys {
            writeln!(out, "    {key:<width$}  {count}")?;
        }
    }
    player.close()?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// dump
// ─────────────────────────────────────────────────────────────────────────────

/// Print every entry (or every entry of `key`) in recording order; with
/// `json`, one JSON object per line.
pub fn dump(path: &Path, key: Option<&str>, json: bool, out: &mut impl Write) -> CliResult {
    let mut player = Player::open(path)?;
    loop {
        let next = match key {
            Some(key) => player.get_next_key_replay(key, false),
            None => player.get_next_replay(),
        };
        let entry = match next {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) if e.entry_id().is_some() => {
                warn!(error = %e, "skipping undecodable entry");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if json {
            writeln!(out, "{}", json_row(&entry))?;
        } else {
            writeln!(
                out,
                "{:>6}  {}  {:<8} {}  {}",
                entry.id,
                format_time(entry.timestamp),
                entry.type_tag.as_str(),
                entry.key.cyan(),
                describe(&entry)
            )?;
        }
    }
    player.close()?;
    Ok(())
}

/// Human-readable rendering of an entry's payload.
pub fn describe(entry: &Entry) -> String {
    let rendered = match entry.type_tag {
        TypeTag::Float => entry.as_float().map(|v| v.to_string()),
        TypeTag::Int => entry.as_int().map(|v| v.to_string()),
        TypeTag::Str => entry.as_text().map(|s| format!("{:?}", truncate(s))),
        TypeTag::Bytes | TypeTag::Protobuf | TypeTag::NdArray => Ok(preview_bytes(&entry.payload)),
    };
    rendered.unwrap_or_else(|e| format!("<undecodable: {e}>"))
}

fn json_row(entry: &Entry) -> Value {
    let value = match entry.type_tag {
        TypeTag::Float => entry
            .as_float()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number),
        TypeTag::Int => entry.as_int().map_or(Value::Null, Value::from),
        TypeTag::Str => entry.as_text().map_or(Value::Null, Value::from),
        TypeTag::Bytes | TypeTag::Protobuf | TypeTag::NdArray => {
            json!({ "bytes": entry.payload.len() })
        }
    };
    json!({
        "id": entry.id,
        "key": entry.key,
        "timestamp": entry.timestamp,
        "type": entry.type_tag.as_str(),
        "value": value,
    })
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

fn preview_bytes(payload: &[u8]) -> String {
    let hex: Vec<String> = payload
        .iter()
        .take(PREVIEW_BYTES)
        .map(|b| format!("{b:02x}"))
        .collect();
    let more = if payload.len() > PREVIEW_BYTES { " …" } else { "" };
    format!("<{} bytes> {}{more}", payload.len(), hex.join(" "))
}

fn format_time(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string()
        })
        .unwrap_or_else(|| format!("{timestamp}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// play
// ─────────────────────────────────────────────────────────────────────────────

/// Replay `path` through a [`ReplayClient`] and print each delivery as it
/// arrives, with the recorded timing.  Stops when the log is exhausted or
/// `shutdown` is raised.
///
/// With no `topics`, every key in the log is subscribed.  Returns the number
/// of messages delivered.
pub fn play(
    path: &Path,
    topics: Vec<String>,
    pacing: Pacing,
    shutdown: Arc<AtomicBool>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let player = Player::open(path)?;
    let topics = if topics.is_empty() {
        player.key_counts()?.into_iter().map(|(key, _)| key).collect()
    } else {
        topics
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let client = ReplayClient::new(Mutex::new(player)).with_pacing(pacing);
        let delivered = Arc::new(AtomicUsize::new(0));
        info!(path = %path.display(), topics = topics.len(), "starting playback");

        let subscriptions = topics.into_iter().map(|topic| {
            let name = topic.clone();
            let delivered = Arc::clone(&delivered);
            let printer = callback(move |payload: Vec<u8>| {
                let name = name.clone();
                delivered.fetch_add(1, Ordering::SeqCst);
                async move {
                    println!("{}  {}", name.cyan(), preview_payload(&payload));
                }
            });
            (topic, printer)
        });
        client.subscribe_all(subscriptions)?;
        // Pass-through for hybrid setups; a no-op without a live client.
        client.begin().await?;

        while client.is_running() && !shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        client.close();
        // Let callbacks already handed off finish printing.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<usize, Box<dyn std::error::Error>>(delivered.load(Ordering::SeqCst))
    })
}

fn preview_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => format!("{:?}", truncate(text)),
        _ => preview_bytes(payload),
    }
}
