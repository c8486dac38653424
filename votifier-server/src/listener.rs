//! Built-in vote listeners.

use crate::dispatch::{ListenerError, VoteListener};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use votifier_protocol::Vote;

/// Logs every vote at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl VoteListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
        tracing::info!("Vote received: {}", vote);
        Ok(())
    }
}

/// File name used by [`JsonlFileListener`].
pub const VOTES_FILE: &str = "votes.jsonl";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteRecord<'a> {
    #[serde(flatten)]
    vote: &'a Vote,
    received_at: String,
}

/// Appends every vote as one JSON object per line to `votes.jsonl`.
pub struct JsonlFileListener {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlFileListener {
    /// Opens (creating if needed) `<dir>/votes.jsonl` for appending.
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(VOTES_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VoteListener for JsonlFileListener {
    fn name(&self) -> &str {
        "jsonl-file"
    }

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
        let record = VoteRecord {
            vote,
            received_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        // One write per record keeps lines whole under concurrent dispatch.
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonlFileListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlFileListener")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
