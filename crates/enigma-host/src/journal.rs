//! Result journal.
//!
//! Every processed input and the result the guest produced for it is recorded
//! as a [`JournalEntry`]. Entries are:
//! 1. Kept in memory for later inspection
//! 2. Emitted via the `tracing` crate
//! 3. Optionally appended to a JSON lines file

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use enigma_common::{HostError, JournalConfig};

/// One recorded processing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonically increasing entry id, starting at 1.
    pub id: u64,

    /// The input that was processed.
    pub message: String,

    /// The value the guest returned.
    pub result: i32,

    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

/// Records processing results.
#[derive(Debug)]
pub struct ResultJournal {
    entries: Vec<JournalEntry>,
    next_id: u64,
    file: Option<JournalFile>,
}

#[derive(Debug)]
struct JournalFile {
    path: PathBuf,
    handle: File,
}

impl ResultJournal {
    /// Create a journal that only keeps entries in memory.
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            file: None,
        }
    }

    /// Open (or create) a JSON lines journal file.
    ///
    /// Ids continue after the highest id already present in the file.
    /// Lines that do not parse as entries are skipped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        let io_error = |source| HostError::JournalIo {
            path: path.display().to_string(),
            source,
        };

        let last_id = if path.exists() {
            let reader = BufReader::new(File::open(path).map_err(io_error)?);
            let mut last_id = 0;
            for line in reader.lines() {
                let line = line.map_err(io_error)?;
                match serde_json::from_str::<JournalEntry>(&line) {
                    Ok(entry) => last_id = last_id.max(entry.id),
                    Err(e) if !line.trim().is_empty() => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable journal line");
                    }
                    Err(_) => {}
                }
            }
            last_id
        } else {
            0
        };

        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;

        debug!(path = %path.display(), last_id, "Journal file opened");

        Ok(Self {
            entries: Vec::new(),
            next_id: last_id + 1,
            file: Some(JournalFile {
                path: path.to_path_buf(),
                handle,
            }),
        })
    }

    /// Build a journal from configuration.
    pub fn from_config(config: &JournalConfig) -> Result<Self, HostError> {
        if config.enabled {
            Self::open(&config.path)
        } else {
            Ok(Self::in_memory())
        }
    }

    /// Record a processing result.
    ///
    /// The entry is kept in memory even if appending it to the file fails.
    pub fn record(&mut self, message: &str, result: i32) -> Result<&JournalEntry, HostError> {
        let entry = JournalEntry {
            id: self.next_id,
            message: message.to_string(),
            result,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        self.next_id += 1;

        info!(id = entry.id, result, journal = true, "{}", message);

        let persisted = match &mut self.file {
            Some(file) => Self::append(file, &entry),
            None => Ok(()),
        };

        self.entries.push(entry);
        persisted?;

        Ok(&self.entries[self.entries.len() - 1])
    }

    fn append(file: &mut JournalFile, entry: &JournalEntry) -> Result<(), HostError> {
        let line = serde_json::to_string(entry)?;
        writeln!(file.handle, "{line}")
            .and_then(|()| file.handle.flush())
            .map_err(|source| HostError::JournalIo {
                path: file.path.display().to_string(),
                source,
            })
    }

    /// Entries recorded by this journal instance, oldest first.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Number of entries recorded by this instance.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }
}
