//! Recorder - captures raw progress messages to JSONL files
//!
//! Every message received on a progress stream can be written verbatim
//! (before decoding) so a misbehaving stream can be inspected and replayed
//! through the reducer later with `gw replay`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One raw message as received on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedMessage {
    /// Receipt time
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// SSE `event:` name
    pub event: String,
    /// SSE `data:` payload, undecoded
    pub data: String,
}

impl RecordedMessage {
    /// Create a new record stamped with the current time
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Appends raw messages to a JSONL file
pub struct Recorder {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl Recorder {
    /// Open (append) a recording file, creating parent directories
    pub fn create(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "Recorder::create: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create recording directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open recording file {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Path being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Write one message as a JSON line
    pub fn record(&mut self, message: &RecordedMessage) -> eyre::Result<()> {
        let json = serde_json::to_string(message)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        debug!(path = ?self.path, written = self.written, "Recorder::drop: flushing");
        let _ = self.writer.flush();
    }
}

/// Default location for a session's recording
///
/// `~/.local/share/genwatch/recordings/{session}-{uuid}.jsonl` on Linux
pub fn default_recording_path(session_id: &str) -> PathBuf {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genwatch")
        .join("recordings");
    dir.join(format!("{}-{}.jsonl", session_id, uuid::Uuid::now_v7()))
}

/// Read every parsable message from a recording
///
/// Unparsable lines are skipped with a warning; a missing file is an error.
pub fn read_recording(path: impl AsRef<Path>) -> eyre::Result<Vec<RecordedMessage>> {
    let path = path.as_ref();
    debug!(?path, "read_recording: reading file");

    let content =
        fs::read_to_string(path).context(format!("Failed to read recording {}", path.display()))?;
    let mut messages = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RecordedMessage>(line) {
            Ok(message) => messages.push(message),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "read_recording: failed to parse line");
            }
        }
    }

    debug!(count = messages.len(), "read_recording: loaded messages");
    Ok(messages)
}
