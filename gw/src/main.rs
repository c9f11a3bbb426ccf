//! genwatch - Generation Progress Client
//!
//! CLI entry point for starting generation runs and following their progress.

use std::fs;
use std::path::Path;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use genwatch::cli::{Cli, Command, OutputFormat, RecordTarget, get_log_path};
use genwatch::config::Config;
use genwatch::events::{Recorder, default_recording_path, read_recording};
use genwatch::progress::ProgressTracker;
use genwatch::render;
use genwatch::stream::{ProgressSubscription, ProgressWatcher, StreamUpdate};
use genwatch::{ClientError, create_client};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can be traced
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if !config.display.color {
        colored::control::set_override(false);
    }

    let recording = cli.command.recording();

    debug!(command = ?cli.command, "main: dispatching command");
    let succeeded = match cli.command {
        Command::Generate { session, .. } => cmd_generate(&config, &session, recording).await?,
        Command::Watch { session, .. } => cmd_watch(&config, &session, recording).await?,
        Command::Replay { file, format, verbose } => cmd_replay(&config, &file, format, verbose)?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn open_recorder(session_id: &str, target: Option<RecordTarget>) -> Result<Option<Recorder>> {
    let path = match target {
        Some(RecordTarget::File(path)) => path,
        Some(RecordTarget::Auto) => default_recording_path(session_id),
        None => return Ok(None),
    };
    let recorder = Recorder::create(&path)?;
    println!("Recording stream to {}", path.display());
    Ok(Some(recorder))
}

/// Start generation for a session and follow it
async fn cmd_generate(config: &Config, session_id: &str, recording: Option<RecordTarget>) -> Result<bool> {
    debug!(%session_id, "cmd_generate: called");
    let api = create_client(config)?;
    let mut watcher = ProgressWatcher::new(api, config.stream.clone());

    let subscription = match watcher.start(session_id).await {
        Ok(subscription) => subscription,
        Err(ClientError::Api { status, code, message }) => {
            eprintln!(
                "{}",
                render::render_error_banner(&format!(
                    "backend refused to start ({}{}): {}",
                    status,
                    code.map(|c| format!(", {}", c)).unwrap_or_default(),
                    message
                ))
            );
            return Ok(false);
        }
        Err(e) => return Err(e).context("Failed to start generation"),
    };

    match subscription.generation_id() {
        Some(id) => println!("Started generation {} for session {}", id, session_id),
        None => println!("Started generation for session {}", session_id),
    }

    if let Some(recorder) = open_recorder(session_id, recording)? {
        subscription.set_recorder(recorder);
    }
    follow(subscription, config).await
}

/// Attach to a running generation and follow it
async fn cmd_watch(config: &Config, session_id: &str, recording: Option<RecordTarget>) -> Result<bool> {
    debug!(%session_id, "cmd_watch: called");
    let api = create_client(config)?;
    let mut watcher = ProgressWatcher::new(api, config.stream.clone());

    let subscription = watcher.attach(session_id).context("Failed to open progress stream")?;
    if let Some(recorder) = open_recorder(session_id, recording)? {
        subscription.set_recorder(recorder);
    }
    println!("Watching session {}", session_id);
    follow(subscription, config).await
}

/// Print updates until the run settles or the stream ends
///
/// Returns whether the run completed without a run-level failure.
async fn follow(subscription: &mut ProgressSubscription, config: &Config) -> Result<bool> {
    let max_attempts = config.display.max_attempts;

    loop {
        let before = subscription.run().cloned();
        let update = tokio::select! {
            update = subscription.next_update() => Some(update),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(update) = update else {
            info!("Interrupted, closing stream");
            subscription.close();
            println!();
            break;
        };

        match update {
            None => break,
            Some(Ok(StreamUpdate::Progress { effect })) => {
                if effect.changed()
                    && let Some(after) = subscription.run()
                {
                    for line in render::render_changes(before.as_ref(), after, max_attempts) {
                        println!("{}", line);
                    }
                }
                if subscription.is_settled() {
                    subscription.close();
                    break;
                }
            }
            Some(Ok(StreamUpdate::Stalled { silent_for })) => {
                println!("{}", render::render_stalled(silent_for));
            }
            Some(Ok(StreamUpdate::Reconnecting { error })) => {
                println!("{}", render::render_reconnecting(&error));
            }
            Some(Ok(StreamUpdate::Reconnected)) => {
                println!("{}", render::render_reconnected());
            }
            Some(Err(e)) => {
                subscription.close();
                return Err(e).context("Progress stream failed");
            }
        }
    }

    info!(stats = ?subscription.stats(), "Progress stream finished");
    if let Some(recorder) = subscription.recorder() {
        info!(path = %recorder.path().display(), written = recorder.written(), "Recording complete");
    }

    println!();
    match subscription.run() {
        Some(run) => {
            println!("{}", render::render_run(run, max_attempts));
            Ok(!run.is_failed())
        }
        None => {
            warn!("Stream ended before the run initialized");
            println!("Stream ended before any run started");
            Ok(false)
        }
    }
}

/// Fold a recording offline
fn cmd_replay(config: &Config, file: &Path, format: OutputFormat, verbose: bool) -> Result<bool> {
    debug!(?file, ?format, "cmd_replay: called");
    let messages = read_recording(file)?;
    let max_attempts = config.display.max_attempts;

    let mut tracker = ProgressTracker::new();
    for message in &messages {
        let before = tracker.run().cloned();
        let effect = tracker.handle_message(&message.event, &message.data);
        if verbose
            && format == OutputFormat::Text
            && effect.changed()
            && let Some(after) = tracker.run()
        {
            for line in render::render_changes(before.as_ref(), after, max_attempts) {
                println!("{}", line);
            }
        }
    }
    info!(count = messages.len(), stats = ?tracker.stats(), "Replayed recording");

    match format {
        OutputFormat::Json => {
            println!("{}", render::render_json(tracker.run(), tracker.stats())?);
        }
        OutputFormat::Text => {
            match tracker.run() {
                Some(run) => println!("{}", render::render_run(run, max_attempts)),
                None => println!("No run found in {}", file.display()),
            }
            let stats = tracker.stats();
            println!(
                "{} messages: {} applied, {} unchanged, {} ignored",
                messages.len(),
                stats.applied,
                stats.unchanged,
                stats.total_ignored()
            );
        }
    }

    Ok(tracker.run().is_some_and(|run| !run.is_failed()))
}
