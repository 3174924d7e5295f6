//! `rewind` – inspect and replay recorded sessions.
//!
//! 1. Loads `~/.rewind/config.toml` (defaults when absent) plus `REWIND_*`
//!    environment overrides.
//! 2. Runs one subcommand: `list`, `inspect`, `dump`, `play` or `config`.
//! 3. Intercepts **Ctrl-C** during `play` to stop the dispatch loop cleanly.

mod args;
mod commands;
mod config;
mod telemetry;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use args::{Cli, Command, ConfigAction};
use commands::CliResult;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = telemetry::init_tracing("rewind");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult {
    let cfg = config::load_or_default()?;
    let folder: PathBuf = cli.folder.unwrap_or_else(|| cfg.replay_folder.clone());
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::List => commands::list(&folder, &mut stdout)?,
        Command::Inspect { target } => {
            let path = commands::resolve_log(&target, &folder)?;
            commands::inspect(&path, &mut stdout)?;
        }
        Command::Dump { target, key, json } => {
            let path = commands::resolve_log(&target, &folder)?;
            commands::dump(&path, key.as_deref(), json, &mut stdout)?;
        }
        Command::Play { target, topics } => {
            let path = commands::resolve_log(&target, &folder)?;
            // Callbacks print from the runtime's threads.
            drop(stdout);
            let shutdown = install_ctrlc_handler();
            println!("  Replaying {}", path.display().to_string().bold());
            let delivered = commands::play(&path, topics, cfg.pacing(), shutdown)?;
            println!("  {} {} message(s) replayed.", "✓".green().bold(), delivered);
        }
        Command::Config { action: None } => {
            println!(
                "  Config file: {}",
                config::config_path().display().to_string().bold()
            );
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        Command::Config {
            action: Some(ConfigAction::Init),
        } => {
            config::save(&cfg)?;
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            );
        }
    }
    Ok(())
}

fn install_ctrlc_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping playback …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; playback can only end with the log");
    }
    shutdown
}
