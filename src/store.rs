//! Append-only JSON Lines store of clock-in/clock-out records.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::Synchronization;

/// What a user did.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum Action {
    #[serde(rename = "上班")]
    #[strum(serialize = "上班")]
    ClockIn,
    #[serde(rename = "下班")]
    #[strum(serialize = "下班")]
    ClockOut,
}

impl Action {
    /// Recognise a command in message text. Surrounding whitespace is ignored.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim() {
            "上班" => Some(Self::ClockIn),
            "下班" => Some(Self::ClockOut),
            _ => None,
        }
    }
}

/// One line of the store.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub user_id: String,
    pub action: Action,
    pub time: DateTime<Local>,
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileStore {
    /// Open `path` for appending, creating it and any missing parent
    /// directories. New files are readable by the owner only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            options.mode(0o600);
        }
        let file = options.open(path)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "Opened event store");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk before returning.
    pub fn append(&self, user_id: &str, action: Action, time: DateTime<Local>) -> Result<()> {
        let record = Record {
            user_id: user_id.to_owned(),
            action,
            time,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().map_err(|_e| Synchronization)?;
        file.write_all(&line)?;
        file.sync_all()?;

        Ok(())
    }
}

/// Read back every record in a store file.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path)?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}
